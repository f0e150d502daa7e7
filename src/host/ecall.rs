// Sealvault — Typed entry points
//
// Thin wrappers over `EnclaveManager::enter`. Each one builds the call,
// lends the caller's output buffer for the duration of the call and narrows
// the generic `EntryValue` to the type the entry point promises.

use crate::boundary::{EnclaveStatus, EntryCall, EntryResult, EntryValue, TransitError};
use crate::enclave::ItemAddStatus;

use super::lifecycle::{CompartmentHandle, EnclaveManager};

fn narrow<T>(
    entry: &'static str,
    status: EnclaveStatus,
    pick: impl FnOnce(EntryValue) -> Option<T>,
) -> EntryResult<T> {
    match status {
        Ok(value) => pick(value)
            .map(Ok)
            .ok_or(TransitError::UnexpectedReply(entry)),
        Err(e) => Ok(Err(e)),
    }
}

impl EnclaveManager {
    /// A random `i32` drawn from the hardware entropy source.
    pub fn generate_random_number(&self, handle: &CompartmentHandle) -> EntryResult<i32> {
        let status = self.enter(handle, EntryCall::GenerateRandomNumber, &mut [])?;
        narrow("generate_random_number", status, |v| match v {
            EntryValue::Number(n) => Some(n),
            _ => None,
        })
    }

    /// Seal `plaintext` into `out`. Returns the number of bytes written,
    /// always `sealed_size(plaintext.len())`.
    pub fn seal(
        &self,
        handle: &CompartmentHandle,
        plaintext: &[u8],
        out: &mut [u8],
    ) -> EntryResult<usize> {
        let call = EntryCall::Seal {
            plaintext: plaintext.to_vec(),
            out_capacity: out.len(),
        };
        let status = self.enter(handle, call, out)?;
        narrow("seal", status, written)
    }

    /// Verify and decrypt `blob` into `out`. Returns the plaintext length.
    pub fn unseal(
        &self,
        handle: &CompartmentHandle,
        blob: &[u8],
        out: &mut [u8],
    ) -> EntryResult<usize> {
        let call = EntryCall::Unseal {
            blob: blob.to_vec(),
            out_capacity: out.len(),
        };
        let status = self.enter(handle, call, out)?;
        narrow("unseal", status, written)
    }

    /// Hand one item to the compartment. The fields are copied into the
    /// marshaled call, which is wiped as soon as it has crossed.
    pub fn add_item(
        &self,
        handle: &CompartmentHandle,
        title: &str,
        username: &str,
        password: &str,
    ) -> Result<ItemAddStatus, TransitError> {
        let call = EntryCall::AddItem {
            title: title.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.enter(handle, call, &mut [])? {
            Ok(EntryValue::Item(status)) => Ok(status),
            Ok(_) => Err(TransitError::UnexpectedReply("add_item")),
            Err(_) => Ok(ItemAddStatus::UnknownFailure),
        }
    }

    /// Size of the pending sealed wallet snapshot, zero if nothing was added yet.
    pub fn sealed_wallet_size(&self, handle: &CompartmentHandle) -> Result<usize, TransitError> {
        match self.enter(handle, EntryCall::SealedWalletSize, &mut [])? {
            Ok(EntryValue::Size(size)) => Ok(size),
            _ => Err(TransitError::UnexpectedReply("sealed_wallet_size")),
        }
    }

    /// Copy the pending sealed wallet snapshot into `out`.
    pub fn export_wallet(&self, handle: &CompartmentHandle, out: &mut [u8]) -> EntryResult<usize> {
        let call = EntryCall::ExportWallet {
            out_capacity: out.len(),
        };
        let status = self.enter(handle, call, out)?;
        narrow("export_wallet", status, written)
    }

    /// Replace the compartment's wallet with a previously exported blob.
    /// Returns the number of items loaded.
    pub fn import_wallet(&self, handle: &CompartmentHandle, blob: &[u8]) -> EntryResult<usize> {
        let call = EntryCall::ImportWallet {
            blob: blob.to_vec(),
        };
        let status = self.enter(handle, call, &mut [])?;
        narrow("import_wallet", status, |v| match v {
            EntryValue::Count(n) => Some(n),
            _ => None,
        })
    }
}

fn written(value: EntryValue) -> Option<usize> {
    match value {
        EntryValue::Written(n) => Some(n),
        _ => None,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
