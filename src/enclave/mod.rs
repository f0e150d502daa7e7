// Sealvault — Enclave Module
//
// The trusted compartment: identity, seal key derivation, sealed blob format
// and the wallet. Nothing in here talks to the host except through
// `TrustedCompartment::dispatch` and the debug sink.

mod compartment;
mod error;
mod identity;
mod platform;
mod sealing;
mod wallet;

pub use compartment::TrustedCompartment;
pub use error::{EnclaveError, PlatformError};
pub use identity::{CompartmentIdentity, Measurement};
pub use platform::{
    EntropySource, KdfParams, KeyringPlatform, MemoryPlatform, OsEntropy, SealKey, SealPrimitive,
};
pub use sealing::{declared_plaintext_len, sealed_size, MAX_SEAL_PLAINTEXT, SEAL_OVERHEAD};
pub use wallet::{ItemAddStatus, WALLET_MAX_ITEMS, WALLET_MAX_ITEM_SIZE};

#[cfg(test)]
pub(crate) use platform::mock;
