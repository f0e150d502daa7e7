// Sealvault — Top-level error types
//
// Every failure that reaches the host controller ends up here, one variant
// per user-visible cause. All of them terminate the process with exit code 1.

use thiserror::Error;

use crate::boundary::TransitError;
use crate::enclave::{EnclaveError, ItemAddStatus, PlatformError};
use crate::host::LifecycleError;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Fail to initialize enclave: {0}")]
    Initialization(LifecycleError),

    #[error("Fail to destroy enclave: {0}")]
    Teardown(LifecycleError),

    #[error("Enclave call `{entry}` did not complete: {source}")]
    Transit {
        entry: &'static str,
        source: TransitError,
    },

    #[error("Fail to generate random number: {0}")]
    Entropy(EnclaveError),

    #[error("Sealing failed: {0}")]
    Sealing(EnclaveError),

    #[error("Unsealing failed: {0}")]
    Unsealing(EnclaveError),

    #[error("Seal round trip returned a different value")]
    RoundTripMismatch,

    #[error("{0}")]
    ItemRejected(ItemAddStatus),

    #[error("Fail to load sealed wallet: {0}")]
    WalletImport(EnclaveError),

    #[error("Fail to export sealed wallet: {0}")]
    WalletExport(EnclaveError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WalletError {
    pub fn transit(entry: &'static str) -> impl FnOnce(TransitError) -> Self {
        move |source| Self::Transit { entry, source }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
