// Sealvault — Hardware capabilities
//
// The trusted compartment never owns key material directly. It asks the
// platform for a seal key bound to its identity and reads randomness from an
// entropy source. Both are injected as trait objects so the compartment logic
// can run against in-memory doubles.
//
// Seal key derivation:
//   1. The platform root secret (the "fuse key") lives in the OS keyring, or in
//      memory for ephemeral runs.
//   2. seal_key = Argon2id(root_secret, salt = SHA-256(measurement || instance))
//   3. The compartment caches the derived key for its lifetime; it is zeroized on drop.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::error::PlatformError;
use super::identity::{CompartmentIdentity, Measurement, IDENTITY_LEN};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Service name used to identify the platform root secret in the keyring.
const KEYRING_SERVICE: &str = "sealvault-platform";

/// Username for the keyring entry holding the root secret.
const KEYRING_USER: &str = "root-secret";

/// Length of the platform root secret in bytes.
const ROOT_SECRET_LEN: usize = 32;

/// Length of a derived seal key (AES-256).
pub const SEAL_KEY_LEN: usize = 32;

const TOKEN_MAGIC: &[u8; 4] = b"SVTK";
const TOKEN_VERSION: u16 = 1;
const TOKEN_LEN: usize = 4 + 2 + IDENTITY_LEN + IDENTITY_LEN + 32;

/// A derived seal key. Zeroized when dropped.
pub type SealKey = Zeroizing<[u8; SEAL_KEY_LEN]>;

// ─── Key derivation parameters ───────────────────────────────────────────────

/// Argon2id cost parameters for seal key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    // m=65536 (64 MiB), t=3, p=4
    fn default() -> Self {
        Self {
            m_cost: 65536,
            t_cost: 3,
            p_cost: 4,
        }
    }
}

fn derive_seal_key(
    root_secret: &[u8],
    identity: &CompartmentIdentity,
    kdf: KdfParams,
) -> Result<SealKey, PlatformError> {
    let params = Params::new(kdf.m_cost, kdf.t_cost, kdf.p_cost, Some(SEAL_KEY_LEN))
        .map_err(|e| PlatformError::Derivation(format!("invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; SEAL_KEY_LEN]);
    argon2
        .hash_password_into(root_secret, &identity.derivation_salt(), &mut key[..])
        .map_err(|e| PlatformError::Derivation(format!("Argon2id hash failed: {}", e)))?;

    Ok(key)
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Source of hardware randomness.
pub trait EntropySource: Send + Sync {
    /// Fill `buf` entirely with random bytes, or fail without partial use.
    fn fill(&self, buf: &mut [u8]) -> Result<(), PlatformError>;
}

/// The identity-bound sealing capability.
pub trait SealPrimitive: Send + Sync {
    /// Derive the seal key for `identity`. Same identity and platform, same key.
    fn request_seal_key(&self, identity: &CompartmentIdentity) -> Result<SealKey, PlatformError>;

    /// Serialize `identity` into a resumability token.
    ///
    /// Layout: magic `SVTK` | version u16 LE | measurement | instance | SHA-256 of the preceding bytes.
    fn issue_token(&self, identity: &CompartmentIdentity) -> Vec<u8> {
        let mut token = Vec::with_capacity(TOKEN_LEN);
        token.extend_from_slice(TOKEN_MAGIC);
        token.extend_from_slice(&TOKEN_VERSION.to_le_bytes());
        token.extend_from_slice(identity.measurement().as_bytes());
        token.extend_from_slice(identity.instance());
        let checksum = Sha256::digest(&token);
        token.extend_from_slice(&checksum);
        token
    }

    /// Restore the identity recorded in `token` for the image measured as `expected`.
    fn redeem_token(
        &self,
        token: &[u8],
        expected: &Measurement,
    ) -> Result<CompartmentIdentity, PlatformError> {
        if token.len() != TOKEN_LEN || &token[..4] != TOKEN_MAGIC {
            return Err(PlatformError::CorruptToken);
        }
        if u16::from_le_bytes([token[4], token[5]]) != TOKEN_VERSION {
            return Err(PlatformError::CorruptToken);
        }

        let (body, checksum) = token.split_at(TOKEN_LEN - 32);
        if Sha256::digest(body).as_slice() != checksum {
            return Err(PlatformError::CorruptToken);
        }

        let mut measurement = [0u8; IDENTITY_LEN];
        measurement.copy_from_slice(&body[6..6 + IDENTITY_LEN]);
        let mut instance = [0u8; IDENTITY_LEN];
        instance.copy_from_slice(&body[6 + IDENTITY_LEN..]);

        let measurement = Measurement::from_bytes(measurement);
        if &measurement != expected {
            return Err(PlatformError::TokenMeasurementMismatch);
        }

        Ok(CompartmentIdentity::new(measurement, instance))
    }
}

// ─── Operating-system entropy ────────────────────────────────────────────────

/// Entropy read from the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), PlatformError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| PlatformError::Entropy(e.to_string()))
    }
}

// ─── Keyring-backed platform ─────────────────────────────────────────────────

/// Production platform: the root secret lives in the OS keyring.
/// Dispatches to:
///   - Linux: kernel keyutils
///   - macOS: Security.framework Keychain
///   - Windows: Windows Credential Manager
pub struct KeyringPlatform {
    service: String,
    user: String,
    kdf: KdfParams,
}

impl KeyringPlatform {
    pub fn new(kdf: KdfParams) -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            user: KEYRING_USER.to_string(),
            kdf,
        }
    }

    fn entry(&self) -> Result<keyring::Entry, PlatformError> {
        keyring::Entry::new(&self.service, &self.user)
            .map_err(|e| PlatformError::Keyring(format!("failed to create keyring entry: {}", e)))
    }

    fn root_secret(&self) -> Result<Zeroizing<Vec<u8>>, PlatformError> {
        let entry = self.entry()?;

        match entry.get_secret() {
            Ok(secret) => {
                tracing::debug!("Retrieved platform root secret from keyring");
                Ok(Zeroizing::new(secret))
            }
            Err(keyring::Error::NoEntry) => {
                tracing::info!("No platform root secret found, generating a new one");
                let mut secret = Zeroizing::new(vec![0u8; ROOT_SECRET_LEN]);
                OsEntropy.fill(&mut secret)?;
                entry.set_secret(&secret).map_err(|e| {
                    PlatformError::Keyring(format!("failed to store root secret: {}", e))
                })?;
                Ok(secret)
            }
            Err(e) => Err(PlatformError::Keyring(format!(
                "failed to retrieve root secret: {}",
                e
            ))),
        }
    }
}

impl SealPrimitive for KeyringPlatform {
    fn request_seal_key(&self, identity: &CompartmentIdentity) -> Result<SealKey, PlatformError> {
        let root = self.root_secret()?;
        derive_seal_key(&root, identity, self.kdf)
    }
}

// ─── In-memory platform ──────────────────────────────────────────────────────

/// Platform whose root secret only lives for the lifetime of this value.
/// Sealed data cannot survive the process.
pub struct MemoryPlatform {
    root_secret: Zeroizing<Vec<u8>>,
    kdf: KdfParams,
}

impl MemoryPlatform {
    pub fn generate(kdf: KdfParams, entropy: &dyn EntropySource) -> Result<Self, PlatformError> {
        let mut root_secret = Zeroizing::new(vec![0u8; ROOT_SECRET_LEN]);
        entropy.fill(&mut root_secret)?;
        Ok(Self { root_secret, kdf })
    }

    pub fn with_root_secret(root_secret: Vec<u8>, kdf: KdfParams) -> Self {
        Self {
            root_secret: Zeroizing::new(root_secret),
            kdf,
        }
    }
}

impl SealPrimitive for MemoryPlatform {
    fn request_seal_key(&self, identity: &CompartmentIdentity) -> Result<SealKey, PlatformError> {
        derive_seal_key(&self.root_secret, identity, self.kdf)
    }
}

// ─── Test doubles ────────────────────────────────────────────────────────────


// ─── Tests ───────────────────────────────────────────────────────────────────
