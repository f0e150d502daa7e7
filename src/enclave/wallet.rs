// Sealvault — Wallet items
//
// SECURITY: wallet items only ever exist inside the trusted compartment.
// `Debug` never shows the password and every field is wiped on drop.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Maximum length in bytes of each item field.
pub const WALLET_MAX_ITEM_SIZE: usize = 100;

/// Maximum number of items a wallet holds.
pub const WALLET_MAX_ITEMS: usize = 100;

/// Outcome of `add_item`. The discriminants are the wire codes, and the
/// status crosses the boundary as that bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
#[repr(i32)]
pub enum ItemAddStatus {
    Success = 0,
    TitleTooLong = 1,
    UsernameTooLong = 2,
    PasswordTooLong = 3,
    UnknownFailure = 4,
}

impl ItemAddStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Every unrecognised code collapses into `UnknownFailure`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::TitleTooLong,
            2 => Self::UsernameTooLong,
            3 => Self::PasswordTooLong,
            _ => Self::UnknownFailure,
        }
    }
}

impl From<ItemAddStatus> for i32 {
    fn from(status: ItemAddStatus) -> Self {
        status.code()
    }
}

impl From<i32> for ItemAddStatus {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for ItemAddStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "Item successfully added to the wallet.",
            Self::TitleTooLong => "Item title too long.",
            Self::UsernameTooLong => "Username too long.",
            Self::PasswordTooLong => "Password too long.",
            Self::UnknownFailure => "Fail to add item.",
        };
        f.write_str(text)
    }
}

/// Check field bounds in fixed order: title, username, password.
/// Only the first violation is reported.
pub fn validate_fields(title: &str, username: &str, password: &str) -> ItemAddStatus {
    if title.len() > WALLET_MAX_ITEM_SIZE {
        ItemAddStatus::TitleTooLong
    } else if username.len() > WALLET_MAX_ITEM_SIZE {
        ItemAddStatus::UsernameTooLong
    } else if password.len() > WALLET_MAX_ITEM_SIZE {
        ItemAddStatus::PasswordTooLong
    } else {
        ItemAddStatus::Success
    }
}

/// One stored credential.
#[derive(Serialize, Deserialize)]
pub struct WalletItem {
    pub title: String,
    pub username: String,
    password: String,
}

impl WalletItem {
    /// Build an item, or return the first bound it violates.
    pub fn new(title: &str, username: &str, password: &str) -> Result<Self, ItemAddStatus> {
        match validate_fields(title, username, password) {
            ItemAddStatus::Success => Ok(Self {
                title: title.to_string(),
                username: username.to_string(),
                password: password.to_string(),
            }),
            violation => Err(violation),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    fn validate(&self) -> ItemAddStatus {
        validate_fields(&self.title, &self.username, &self.password)
    }
}

impl Drop for WalletItem {
    fn drop(&mut self) {
        self.title.zeroize();
        self.username.zeroize();
        self.password.zeroize();
    }
}

impl fmt::Debug for WalletItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletItem")
            .field("title", &self.title)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// The item list held by a running compartment.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Wallet {
    items: Vec<WalletItem>,
}

impl Wallet {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= WALLET_MAX_ITEMS
    }

    pub fn items(&self) -> &[WalletItem] {
        &self.items
    }

    pub fn push(&mut self, item: WalletItem) {
        self.items.push(item);
    }

    /// Undo the most recent `push`.
    pub fn pop(&mut self) -> Option<WalletItem> {
        self.items.pop()
    }

    /// Whether a decoded wallet respects the same bounds `add_item` enforces.
    pub fn is_well_formed(&self) -> bool {
        self.items.len() <= WALLET_MAX_ITEMS
            && self
                .items
                .iter()
                .all(|item| item.validate() == ItemAddStatus::Success)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
