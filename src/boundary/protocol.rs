// Sealvault — Entry call protocol
//
// Every call into the trusted compartment is an `EntryCall` marshaled to
// bytes on the host side and unmarshaled again inside the compartment, so no
// host reference ever crosses the boundary. The reply travels the same way as
// a marshaled `EntryResponse`. Results come back as two independent layers:
// `TransitError` (the call did not complete) wrapping the compartment's own
// `Result`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::enclave::{EnclaveError, ItemAddStatus};

/// Transit status: the call could not be completed across the boundary.
/// The compartment state is unknown after any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitError {
    #[error("enclave is not running")]
    NotRunning,

    #[error("handle does not refer to the running enclave")]
    InvalidHandle,

    #[error("marshaling failed: {0}")]
    Marshal(String),

    #[error("enclave lock poisoned by an earlier panic")]
    Poisoned,

    #[error("entry point `{0}` returned a value of the wrong kind")]
    UnexpectedReply(&'static str),
}

/// Outer layer: transit status. Inner layer: application status.
pub type EntryResult<T, E = EnclaveError> = Result<Result<T, E>, TransitError>;

/// Application status of a completed call, before it is narrowed to a typed result.
pub type EnclaveStatus = Result<EntryValue, EnclaveError>;

/// A marshalable request for one entry point.
#[derive(Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum EntryCall {
    GenerateRandomNumber,
    Seal {
        plaintext: Vec<u8>,
        out_capacity: usize,
    },
    Unseal {
        blob: Vec<u8>,
        out_capacity: usize,
    },
    AddItem {
        title: String,
        username: String,
        password: String,
    },
    SealedWalletSize,
    ExportWallet {
        out_capacity: usize,
    },
    ImportWallet {
        blob: Vec<u8>,
    },
}

impl EntryCall {
    /// Entry point name, safe for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateRandomNumber => "generate_random_number",
            Self::Seal { .. } => "seal",
            Self::Unseal { .. } => "unseal",
            Self::AddItem { .. } => "add_item",
            Self::SealedWalletSize => "sealed_wallet_size",
            Self::ExportWallet { .. } => "export_wallet",
            Self::ImportWallet { .. } => "import_wallet",
        }
    }

    /// Capacity of the caller's output buffer, if the entry writes one.
    pub fn out_capacity(&self) -> usize {
        match self {
            Self::Seal { out_capacity, .. }
            | Self::Unseal { out_capacity, .. }
            | Self::ExportWallet { out_capacity } => *out_capacity,
            _ => 0,
        }
    }

    /// Copy the call into a self-contained byte buffer.
    pub fn marshal(&self) -> Result<Zeroizing<Vec<u8>>, TransitError> {
        serde_json::to_vec(self)
            .map(Zeroizing::new)
            .map_err(|e| TransitError::Marshal(e.to_string()))
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, TransitError> {
        serde_json::from_slice(bytes).map_err(|e| TransitError::Marshal(e.to_string()))
    }
}

impl Drop for EntryCall {
    fn drop(&mut self) {
        match self {
            Self::Seal { plaintext, .. } => plaintext.zeroize(),
            Self::Unseal { blob, .. } | Self::ImportWallet { blob } => blob.zeroize(),
            Self::AddItem {
                title,
                username,
                password,
            } => {
                title.zeroize();
                username.zeroize();
                password.zeroize();
            }
            Self::GenerateRandomNumber | Self::SealedWalletSize | Self::ExportWallet { .. } => {}
        }
    }
}

/// Custom Debug that never shows buffer contents.
impl fmt::Debug for EntryCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryCall({}, out_capacity={})", self.name(), self.out_capacity())
    }
}

/// Scalar result of a completed entry call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "value", content = "of", rename_all = "snake_case")]
pub enum EntryValue {
    Number(i32),
    Written(usize),
    Size(usize),
    Item(ItemAddStatus),
    Count(usize),
}

/// What the compartment hands back: the application status plus the bytes
/// destined for the caller's output buffer.
#[derive(Serialize, Deserialize)]
pub struct EntryResponse {
    pub status: EnclaveStatus,
    pub output: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for EntryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryResponse")
            .field("status", &self.status)
            .field("output_len", &self.output.len())
            .finish()
    }
}

impl EntryResponse {
    pub fn value(value: EntryValue) -> Self {
        Self {
            status: Ok(value),
            output: Zeroizing::new(Vec::new()),
        }
    }

    pub fn written(output: Vec<u8>) -> Self {
        Self {
            status: Ok(EntryValue::Written(output.len())),
            output: Zeroizing::new(output),
        }
    }

    pub fn error(error: EnclaveError) -> Self {
        Self {
            status: Err(error),
            output: Zeroizing::new(Vec::new()),
        }
    }

    /// Copy the reply into a self-contained byte buffer.
    pub fn marshal(&self) -> Result<Zeroizing<Vec<u8>>, TransitError> {
        serde_json::to_vec(self)
            .map(Zeroizing::new)
            .map_err(|e| TransitError::Marshal(e.to_string()))
    }

    /// A reply that does not decode is a transit failure, never an
    /// application status.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self, TransitError> {
        serde_json::from_slice(bytes).map_err(|e| TransitError::Marshal(e.to_string()))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
