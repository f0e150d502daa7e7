// Sealvault — Trusted compartment
//
// Holds everything that must never leave the trust boundary: the seal key,
// the wallet and the pending sealed snapshot. The host reaches it only
// through `dispatch`, which takes a marshaled `EntryCall` and returns a
// marshaled `EntryResponse`. Entry points are not reentrant; the lifecycle manager
// serialises access.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::boundary::{DebugSink, EntryCall, EntryResponse, EntryValue, TransitError};

use super::error::{EnclaveError, PlatformError};
use super::identity::{CompartmentIdentity, KEY_ID_LEN};
use super::platform::{EntropySource, SealKey, SealPrimitive};
use super::sealing::{self, MAX_SEAL_PLAINTEXT};
use super::wallet::{ItemAddStatus, Wallet, WalletItem};

/// A running trusted compartment instance.
pub struct TrustedCompartment {
    seal_key: SealKey,
    key_id: [u8; KEY_ID_LEN],
    entropy: Arc<dyn EntropySource>,
    sink: Arc<dyn DebugSink>,
    wallet: Wallet,
    /// Wallet sealed after the last successful change, waiting for export.
    pending_snapshot: Option<Vec<u8>>,
}

impl TrustedCompartment {
    /// Bring up a compartment for `identity`, requesting its seal key once.
    pub fn launch(
        identity: &CompartmentIdentity,
        platform: &dyn SealPrimitive,
        entropy: Arc<dyn EntropySource>,
        sink: Arc<dyn DebugSink>,
    ) -> Result<Self, PlatformError> {
        let seal_key = platform.request_seal_key(identity)?;

        let compartment = Self {
            seal_key,
            key_id: identity.key_id(),
            entropy,
            sink,
            wallet: Wallet::default(),
            pending_snapshot: None,
        };
        compartment.notify("compartment launched");
        Ok(compartment)
    }

    /// Unmarshal one entry call, run it to completion and marshal the reply.
    pub fn dispatch(&mut self, request: &[u8]) -> Result<Zeroizing<Vec<u8>>, TransitError> {
        let call = EntryCall::unmarshal(request)?;
        tracing::debug!(entry = call.name(), "Entering compartment");

        let response = match &call {
            EntryCall::GenerateRandomNumber => match self.generate_random_number() {
                Ok(n) => EntryResponse::value(EntryValue::Number(n)),
                Err(e) => EntryResponse::error(e),
            },
            EntryCall::Seal {
                plaintext,
                out_capacity,
            } => match self.seal(plaintext, *out_capacity) {
                Ok(blob) => EntryResponse::written(blob),
                Err(e) => EntryResponse::error(e),
            },
            EntryCall::Unseal { blob, out_capacity } => {
                match sealing::unseal(&self.seal_key, blob, *out_capacity) {
                    Ok(plaintext) => EntryResponse {
                        status: Ok(EntryValue::Written(plaintext.len())),
                        output: plaintext,
                    },
                    Err(e) => EntryResponse::error(e),
                }
            }
            EntryCall::AddItem {
                title,
                username,
                password,
            } => EntryResponse::value(EntryValue::Item(self.add_item(title, username, password))),
            EntryCall::SealedWalletSize => {
                EntryResponse::value(EntryValue::Size(self.sealed_wallet_size()))
            }
            EntryCall::ExportWallet { out_capacity } => match self.export_wallet(*out_capacity) {
                Ok(blob) => EntryResponse::written(blob),
                Err(e) => EntryResponse::error(e),
            },
            EntryCall::ImportWallet { blob } => match self.import_wallet(blob) {
                Ok(count) => EntryResponse::value(EntryValue::Count(count)),
                Err(e) => EntryResponse::error(e),
            },
        };

        response.marshal()
    }

    /// Emit a debug notification. Only compile-time strings are accepted.
    fn notify(&self, message: &'static str) {
        self.sink.notify(message);
    }

    fn generate_random_number(&self) -> Result<i32, EnclaveError> {
        let mut bytes = [0u8; 4];
        self.entropy.fill(&mut bytes).map_err(|e| {
            tracing::debug!(error = %e, "Entropy read failed");
            EnclaveError::EntropyUnavailable
        })?;
        self.notify("random number generated");
        Ok(i32::from_le_bytes(bytes))
    }

    fn seal(&self, plaintext: &[u8], out_capacity: usize) -> Result<Vec<u8>, EnclaveError> {
        sealing::seal(
            &self.seal_key,
            &self.key_id,
            self.entropy.as_ref(),
            plaintext,
            out_capacity,
        )
    }

    fn add_item(&mut self, title: &str, username: &str, password: &str) -> ItemAddStatus {
        let item = match WalletItem::new(title, username, password) {
            Ok(item) => item,
            Err(violation) => {
                self.notify("item rejected by field validation");
                return violation;
            }
        };

        if self.wallet.is_full() {
            self.notify("wallet is full");
            return ItemAddStatus::UnknownFailure;
        }

        self.wallet.push(item);
        match self.reseal_wallet() {
            Ok(()) => {
                self.notify("item added to wallet");
                ItemAddStatus::Success
            }
            Err(_) => {
                self.wallet.pop();
                self.notify("wallet could not be resealed, item discarded");
                ItemAddStatus::UnknownFailure
            }
        }
    }

    /// Seal the current wallet into the pending snapshot.
    fn reseal_wallet(&mut self) -> Result<(), EnclaveError> {
        let json = Zeroizing::new(
            serde_json::to_vec(&self.wallet).map_err(|_| EnclaveError::SealingFailed)?,
        );
        if json.len() > MAX_SEAL_PLAINTEXT {
            return Err(EnclaveError::SealingFailed);
        }
        let blob = self.seal(&json, sealing::sealed_size(json.len()))?;
        self.pending_snapshot = Some(blob);
        Ok(())
    }

    fn sealed_wallet_size(&self) -> usize {
        self.pending_snapshot.as_ref().map_or(0, Vec::len)
    }

    fn export_wallet(&self, out_capacity: usize) -> Result<Vec<u8>, EnclaveError> {
        let snapshot = match &self.pending_snapshot {
            Some(snapshot) => snapshot,
            None => return Ok(Vec::new()),
        };
        if snapshot.len() > out_capacity {
            return Err(EnclaveError::BufferTooSmall {
                required: snapshot.len(),
                capacity: out_capacity,
            });
        }
        Ok(snapshot.clone())
    }

    /// Replace the wallet with the contents of a previously exported blob.
    fn import_wallet(&mut self, blob: &[u8]) -> Result<usize, EnclaveError> {
        let json = sealing::unseal(&self.seal_key, blob, MAX_SEAL_PLAINTEXT)?;
        let wallet: Wallet =
            serde_json::from_slice(&json).map_err(|_| EnclaveError::InvalidWallet)?;
        if !wallet.is_well_formed() {
            return Err(EnclaveError::InvalidWallet);
        }

        self.wallet = wallet;
        self.pending_snapshot = Some(blob.to_vec());
        self.notify("wallet imported");
        Ok(self.wallet.len())
    }

    #[cfg(test)]
    pub(crate) fn wallet(&self) -> &Wallet {
        &self.wallet
    }
}

impl Drop for TrustedCompartment {
    fn drop(&mut self) {
        self.notify("compartment destroyed");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
