// Sealvault — Compartment identity
//
// A compartment identity is the pair (measurement, instance). The measurement
// is the SHA-256 of the compartment image; the instance is minted from the
// entropy source on every fresh start and restored from the resumability
// token otherwise. Both feed the seal key derivation, so a restart without a
// token makes every previously sealed blob unreadable.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::PlatformError;
use super::platform::EntropySource;

/// Length of both identity components in bytes.
pub const IDENTITY_LEN: usize = 32;

/// Length of the public key identifier embedded in sealed blobs.
pub const KEY_ID_LEN: usize = 16;

/// SHA-256 digest of the compartment image.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Measurement([u8; IDENTITY_LEN]);

impl Measurement {
    pub fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    /// Measure an image already loaded in memory.
    pub fn of_image(image: &[u8]) -> Self {
        Self(Sha256::digest(image).into())
    }

    /// Read the compartment image from disk and measure it.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let image = fs::read(path)?;
        Ok(Self::of_image(&image))
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Short hex form for log lines.
    pub fn short_hex(&self) -> String {
        self.0[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Measurement({}…)", self.short_hex())
    }
}

/// The identity a running compartment seals under.
#[derive(Clone, PartialEq, Eq)]
pub struct CompartmentIdentity {
    measurement: Measurement,
    instance: [u8; IDENTITY_LEN],
}

impl CompartmentIdentity {
    pub fn new(measurement: Measurement, instance: [u8; IDENTITY_LEN]) -> Self {
        Self {
            measurement,
            instance,
        }
    }

    /// Mint a fresh identity for `measurement` from the entropy source.
    pub fn mint(
        measurement: Measurement,
        entropy: &dyn EntropySource,
    ) -> Result<Self, PlatformError> {
        let mut instance = [0u8; IDENTITY_LEN];
        entropy.fill(&mut instance)?;
        Ok(Self::new(measurement, instance))
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn instance(&self) -> &[u8; IDENTITY_LEN] {
        &self.instance
    }

    /// Salt for the seal key derivation: SHA-256(measurement || instance).
    pub fn derivation_salt(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.measurement.as_bytes());
        hasher.update(self.instance);
        hasher.finalize().into()
    }

    /// Public identifier written into sealed blob headers.
    pub fn key_id(&self) -> [u8; KEY_ID_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(b"sealvault-key-id");
        hasher.update(self.measurement.as_bytes());
        hasher.update(self.instance);
        let digest = hasher.finalize();

        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&digest[..KEY_ID_LEN]);
        id
    }
}

impl fmt::Debug for CompartmentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompartmentIdentity")
            .field("measurement", &self.measurement)
            .field("instance", &"[REDACTED]")
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::platform::OsEntropy;

    #[test]
    fn test_measurement_is_stable_for_same_image() {
        let a = Measurement::of_image(b"enclave image v1");
        let b = Measurement::of_image(b"enclave image v1");
        let c = Measurement::of_image(b"enclave image v2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_measurement_of_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Measurement::of_file(&dir.path().join("missing.so")).is_err());
    }

    #[test]
    fn test_minted_identities_differ() {
        let m = Measurement::of_image(b"image");
        let a = CompartmentIdentity::mint(m, &OsEntropy).unwrap();
        let b = CompartmentIdentity::mint(m, &OsEntropy).unwrap();
        assert_ne!(a, b, "Fresh starts must produce distinct identities");
        assert_ne!(a.key_id(), b.key_id());
        assert_ne!(a.derivation_salt(), b.derivation_salt());
    }

    #[test]
    fn test_debug_redacts_instance() {
        let identity = CompartmentIdentity::new(Measurement::of_image(b"x"), [0xAB; IDENTITY_LEN]);
        let debug = format!("{:?}", identity);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("abab"));
    }
}
