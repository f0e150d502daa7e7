// Sealvault — Trusted compartment error types
//
// `EnclaveError` is the application status of an entry call that ran to
// completion. `PlatformError` covers the injected hardware capabilities.
// Neither ever carries plaintext.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain error reported by the trusted compartment after an entry call completed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum EnclaveError {
    #[error("hardware entropy source unavailable")]
    EntropyUnavailable,

    #[error("output buffer too small: {required} bytes required, {capacity} available")]
    BufferTooSmall { required: usize, capacity: usize },

    #[error("sealing failed")]
    SealingFailed,

    /// Deliberately carries no cause: wrong identity, tampering and truncation
    /// are indistinguishable to the caller.
    #[error("unsealing failed")]
    UnsealingFailed,

    #[error("sealed wallet does not contain a valid item list")]
    InvalidWallet,
}

/// Failure of a hardware-backed capability (seal key, entropy, resumability token).
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Key derivation error: {0}")]
    Derivation(String),

    #[error("Entropy source error: {0}")]
    Entropy(String),

    #[error("Resumability token is corrupt")]
    CorruptToken,

    #[error("Resumability token was issued for a different compartment image")]
    TokenMeasurementMismatch,
}
