// Sealvault — Seal / unseal
//
// Sealed blob layout (all integers little-endian):
//
//   offset  len  field
//   0       4    magic "SVSL"
//   4       2    format version
//   6       2    reserved, zero
//   8       4    plaintext length
//   12      16   key id (identity binding)
//   28      12   AES-GCM nonce
//   40      n    ciphertext
//   40+n    16   GCM tag
//
// The whole header is authenticated as associated data, so the key id and the
// declared length cannot be altered without failing the tag check. The size of
// a blob is a pure function of the plaintext length, see `sealed_size`.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use zeroize::Zeroizing;

use super::error::EnclaveError;
use super::identity::KEY_ID_LEN;
use super::platform::{EntropySource, SealKey};

const SEAL_MAGIC: &[u8; 4] = b"SVSL";
const SEAL_VERSION: u16 = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Length of the authenticated header.
pub const HEADER_LEN: usize = 4 + 2 + 2 + 4 + KEY_ID_LEN + NONCE_LEN;

/// Fixed number of bytes a sealed blob adds to its plaintext.
pub const SEAL_OVERHEAD: usize = HEADER_LEN + TAG_LEN;

/// Largest plaintext accepted by `seal`.
pub const MAX_SEAL_PLAINTEXT: usize = 1 << 20;

/// Exact size of the blob produced by sealing `plaintext_len` bytes.
pub const fn sealed_size(plaintext_len: usize) -> usize {
    plaintext_len + SEAL_OVERHEAD
}

/// Plaintext length a blob declares, if it is structurally a sealed blob.
/// The value is not authenticated until the blob is unsealed.
pub fn declared_plaintext_len(blob: &[u8]) -> Option<usize> {
    if blob.len() < SEAL_OVERHEAD || &blob[..4] != SEAL_MAGIC {
        return None;
    }
    let len = usize::try_from(u32::from_le_bytes([blob[8], blob[9], blob[10], blob[11]])).ok()?;
    (SEAL_OVERHEAD.checked_add(len) == Some(blob.len())).then_some(len)
}

fn cipher(key: &SealKey) -> Option<Aes256Gcm> {
    Aes256Gcm::new_from_slice(&key[..]).ok()
}

/// Seal `plaintext` under `key`. Fails with `BufferTooSmall` before doing any
/// work if the result would not fit in `out_capacity` bytes.
pub fn seal(
    key: &SealKey,
    key_id: &[u8; KEY_ID_LEN],
    entropy: &dyn EntropySource,
    plaintext: &[u8],
    out_capacity: usize,
) -> Result<Vec<u8>, EnclaveError> {
    if plaintext.len() > MAX_SEAL_PLAINTEXT {
        return Err(EnclaveError::SealingFailed);
    }

    let required = sealed_size(plaintext.len());
    if required > out_capacity {
        return Err(EnclaveError::BufferTooSmall {
            required,
            capacity: out_capacity,
        });
    }

    let mut nonce = [0u8; NONCE_LEN];
    entropy.fill(&mut nonce).map_err(|e| {
        tracing::debug!(error = %e, "Nonce generation failed");
        EnclaveError::SealingFailed
    })?;

    let mut blob = Vec::with_capacity(required);
    blob.extend_from_slice(SEAL_MAGIC);
    blob.extend_from_slice(&SEAL_VERSION.to_le_bytes());
    blob.extend_from_slice(&[0u8; 2]);
    blob.extend_from_slice(&(plaintext.len() as u32).to_le_bytes());
    blob.extend_from_slice(key_id);
    blob.extend_from_slice(&nonce);

    let cipher = cipher(key).ok_or(EnclaveError::SealingFailed)?;
    let sealed = cipher
        .encrypt(
            (&nonce).into(),
            Payload {
                msg: plaintext,
                aad: &blob,
            },
        )
        .map_err(|_| EnclaveError::SealingFailed)?;

    blob.extend_from_slice(&sealed);
    debug_assert_eq!(blob.len(), required);
    Ok(blob)
}

/// Verify and decrypt `blob` under `key`.
///
/// Every integrity failure maps to the same `UnsealingFailed`. `BufferTooSmall`
/// is only reported once the blob has been authenticated, so nothing about an
/// unverified header reaches the caller.
pub fn unseal(
    key: &SealKey,
    blob: &[u8],
    out_capacity: usize,
) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
    declared_plaintext_len(blob).ok_or(EnclaveError::UnsealingFailed)?;
    if u16::from_le_bytes([blob[4], blob[5]]) != SEAL_VERSION {
        return Err(EnclaveError::UnsealingFailed);
    }

    let (header, sealed) = blob.split_at(HEADER_LEN);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&header[HEADER_LEN - NONCE_LEN..]);

    let cipher = cipher(key).ok_or(EnclaveError::UnsealingFailed)?;
    let plaintext = cipher
        .decrypt(
            (&nonce).into(),
            Payload {
                msg: sealed,
                aad: header,
            },
        )
        .map_err(|_| EnclaveError::UnsealingFailed)?;
    let plaintext = Zeroizing::new(plaintext);

    if plaintext.len() > out_capacity {
        return Err(EnclaveError::BufferTooSmall {
            required: plaintext.len(),
            capacity: out_capacity,
        });
    }
    Ok(plaintext)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
