// Sealvault — Compartment lifecycle
//
// `EnclaveManager` owns at most one running compartment. `start` measures the
// compartment image, restores the identity from the resumability token when
// one exists (or mints a fresh one) and launches the compartment. `stop`
// destroys it; every entry call afterwards fails with `NotRunning`.
//
// A single mutex guards the slot, so start, stop and entry calls are
// serialised even when the manager is shared between threads.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::boundary::{DebugSink, EnclaveStatus, EntryCall, EntryResponse, TransitError};
use crate::enclave::{
    CompartmentIdentity, EntropySource, Measurement, SealPrimitive, TrustedCompartment,
};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("enclave is already running")]
    AlreadyRunning,

    #[error("enclave is not running")]
    NotRunning,

    #[error("handle does not refer to the running enclave")]
    InvalidHandle,

    #[error("{0}")]
    Initialization(String),
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a running compartment, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompartmentHandle(u64);

/// Where the compartment comes from and where its identity is persisted.
#[derive(Debug, Clone)]
pub struct EnclaveConfig {
    /// Compartment image; its SHA-256 is the measurement.
    pub image_path: PathBuf,
    /// Resumability token. `None` mints a fresh identity on every start.
    pub token_path: Option<PathBuf>,
}

struct Running {
    handle: CompartmentHandle,
    compartment: TrustedCompartment,
}

pub struct EnclaveManager {
    config: EnclaveConfig,
    platform: Arc<dyn SealPrimitive>,
    entropy: Arc<dyn EntropySource>,
    sink: Arc<dyn DebugSink>,
    slot: Mutex<Option<Running>>,
}

impl EnclaveManager {
    pub fn new(
        config: EnclaveConfig,
        platform: Arc<dyn SealPrimitive>,
        entropy: Arc<dyn EntropySource>,
        sink: Arc<dyn DebugSink>,
    ) -> Self {
        Self {
            config,
            platform,
            entropy,
            sink,
            slot: Mutex::new(None),
        }
    }

    /// Launch the compartment. Any failure other than `AlreadyRunning` is an
    /// `Initialization` error and must be treated as fatal by the caller.
    pub fn start(&self) -> Result<CompartmentHandle, LifecycleError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| LifecycleError::Initialization("enclave lock poisoned".into()))?;
        if slot.is_some() {
            return Err(LifecycleError::AlreadyRunning);
        }

        let measurement = Measurement::of_file(&self.config.image_path).map_err(|e| {
            LifecycleError::Initialization(format!(
                "cannot read enclave image {}: {}",
                self.config.image_path.display(),
                e
            ))
        })?;

        let (identity, resumed) = self.resolve_identity(&measurement)?;

        let compartment = TrustedCompartment::launch(
            &identity,
            self.platform.as_ref(),
            self.entropy.clone(),
            self.sink.clone(),
        )
        .map_err(|e| LifecycleError::Initialization(format!("cannot launch enclave: {}", e)))?;

        if !resumed {
            if let Some(token_path) = &self.config.token_path {
                self.save_token(token_path, &identity);
            }
        }

        let handle = CompartmentHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
        *slot = Some(Running {
            handle,
            compartment,
        });

        tracing::info!(
            measurement = %measurement.short_hex(),
            resumed,
            "Enclave started"
        );
        Ok(handle)
    }

    /// Destroy the compartment identified by `handle`.
    pub fn stop(&self, handle: &CompartmentHandle) -> Result<(), LifecycleError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| LifecycleError::Initialization("enclave lock poisoned".into()))?;

        match slot.as_ref() {
            None => Err(LifecycleError::NotRunning),
            Some(running) if running.handle != *handle => Err(LifecycleError::InvalidHandle),
            Some(_) => {
                // Dropping the compartment zeroizes its seal key.
                *slot = None;
                tracing::info!("Enclave destroyed");
                Ok(())
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Marshal `call`, run it inside the compartment and copy the output of its
    /// reply into `out`. Transit is checked before any application status is
    /// produced.
    pub(crate) fn enter(
        &self,
        handle: &CompartmentHandle,
        call: EntryCall,
        out: &mut [u8],
    ) -> Result<EnclaveStatus, TransitError> {
        let entry = call.name();
        let request = call.marshal()?;
        drop(call);

        let mut slot = self.slot.lock().map_err(|_| TransitError::Poisoned)?;
        let running = match slot.as_mut() {
            None => return Err(TransitError::NotRunning),
            Some(running) if running.handle != *handle => return Err(TransitError::InvalidHandle),
            Some(running) => running,
        };

        let reply = running.compartment.dispatch(&request)?;
        drop(slot);

        deliver(entry, &reply, out)
    }

    /// Restore the identity from the token, or mint a fresh one.
    /// Returns the identity and whether it was resumed.
    fn resolve_identity(
        &self,
        measurement: &Measurement,
    ) -> Result<(CompartmentIdentity, bool), LifecycleError> {
        if let Some(token_path) = &self.config.token_path {
            match fs::read(token_path) {
                Ok(token) => {
                    let identity = self
                        .platform
                        .redeem_token(&token, measurement)
                        .map_err(|e| {
                            LifecycleError::Initialization(format!(
                                "resumability token {} rejected: {}",
                                token_path.display(),
                                e
                            ))
                        })?;
                    tracing::debug!("Restored enclave identity from token");
                    return Ok((identity, true));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!("No resumability token, minting a fresh identity");
                }
                Err(e) => {
                    return Err(LifecycleError::Initialization(format!(
                        "cannot read resumability token {}: {}",
                        token_path.display(),
                        e
                    )))
                }
            }
        }

        let identity = CompartmentIdentity::mint(*measurement, self.entropy.as_ref())
            .map_err(|e| {
                LifecycleError::Initialization(format!("cannot mint enclave identity: {}", e))
            })?;
        Ok((identity, false))
    }

    fn save_token(&self, path: &Path, identity: &CompartmentIdentity) {
        let token = self.platform.issue_token(identity);
        if let Err(e) = fs::write(path, token) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to save resumability token, identity will not survive a restart"
            );
        }
    }
}

/// Unmarshal a compartment reply and copy its output into the caller's buffer.
/// `out` is left untouched unless the whole reply is usable.
fn deliver(
    entry: &'static str,
    reply: &[u8],
    out: &mut [u8],
) -> Result<EnclaveStatus, TransitError> {
    let response = EntryResponse::unmarshal(reply)?;

    if response.output.len() > out.len() {
        return Err(TransitError::Marshal(format!(
            "`{}` produced {} bytes for a {}-byte buffer",
            entry,
            response.output.len(),
            out.len()
        )));
    }
    out[..response.output.len()].copy_from_slice(&response.output);

    Ok(response.status)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::boundary::RecordingSink;
    use crate::enclave::mock::{memory_platform, SwitchableEntropy, UnsupportedPlatform};
    use crate::enclave::{sealed_size, EnclaveError};
    use tempfile::TempDir;

    pub(crate) struct Harness {
        pub dir: TempDir,
        pub entropy: Arc<SwitchableEntropy>,
        pub sink: Arc<RecordingSink>,
        platform: Arc<dyn SealPrimitive>,
    }

    impl Harness {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("enclave.signed.so"), b"trusted image v1").unwrap();
            Self {
                dir,
                entropy: Arc::new(SwitchableEntropy::default()),
                sink: Arc::new(RecordingSink::default()),
                platform: Arc::new(memory_platform()),
            }
        }

        pub fn token_path(&self) -> PathBuf {
            self.dir.path().join("enclave.token")
        }

        pub fn manager(&self, token: bool) -> EnclaveManager {
            self.manager_with(self.platform.clone(), token)
        }

        pub fn manager_with(&self, platform: Arc<dyn SealPrimitive>, token: bool) -> EnclaveManager {
            let config = EnclaveConfig {
                image_path: self.dir.path().join("enclave.signed.so"),
                token_path: token.then(|| self.token_path()),
            };
            EnclaveManager::new(config, platform, self.entropy.clone(), self.sink.clone())
        }
    }

    fn seal_number(manager: &EnclaveManager, handle: &CompartmentHandle, n: i32) -> Vec<u8> {
        let mut blob = vec![0u8; sealed_size(4)];
        let written = manager
            .seal(handle, &n.to_le_bytes(), &mut blob)
            .unwrap()
            .unwrap();
        blob.truncate(written);
        blob
    }

    #[test]
    fn test_double_start_is_rejected() {
        let h = Harness::new();
        let manager = h.manager(false);
        let _handle = manager.start().unwrap();
        assert!(matches!(manager.start(), Err(LifecycleError::AlreadyRunning)));
        assert!(manager.is_running());
    }

    #[test]
    fn test_missing_image_fails_initialization() {
        let h = Harness::new();
        fs::remove_file(h.dir.path().join("enclave.signed.so")).unwrap();
        let manager = h.manager(false);
        assert!(matches!(manager.start(), Err(LifecycleError::Initialization(_))));
        assert!(!manager.is_running());
    }

    #[test]
    fn test_unsupported_platform_fails_initialization() {
        let h = Harness::new();
        let manager = h.manager_with(Arc::new(UnsupportedPlatform), false);
        assert!(matches!(manager.start(), Err(LifecycleError::Initialization(_))));
    }

    #[test]
    fn test_broken_entropy_fails_fresh_start() {
        let h = Harness::new();
        h.entropy.set_broken(true);
        let manager = h.manager(false);
        assert!(matches!(manager.start(), Err(LifecycleError::Initialization(_))));
    }

    #[test]
    fn test_corrupt_token_fails_initialization() {
        let h = Harness::new();
        fs::write(h.token_path(), b"definitely not a token").unwrap();
        let manager = h.manager(true);
        assert!(matches!(manager.start(), Err(LifecycleError::Initialization(_))));
    }

    #[test]
    fn test_token_for_modified_image_fails_initialization() {
        let h = Harness::new();
        let manager = h.manager(true);
        let handle = manager.start().unwrap();
        manager.stop(&handle).unwrap();

        fs::write(h.dir.path().join("enclave.signed.so"), b"trusted image v2").unwrap();
        assert!(matches!(manager.start(), Err(LifecycleError::Initialization(_))));
    }

    #[test]
    fn test_fresh_start_writes_token() {
        let h = Harness::new();
        let manager = h.manager(true);
        assert!(!h.token_path().exists());
        let _handle = manager.start().unwrap();
        assert!(h.token_path().exists());
    }

    #[test]
    fn test_stop_then_entry_is_not_running() {
        let h = Harness::new();
        let manager = h.manager(false);
        let handle = manager.start().unwrap();
        manager.stop(&handle).unwrap();
        assert!(!manager.is_running());

        let notifications = h.sink.messages().len();
        assert_eq!(
            manager.generate_random_number(&handle),
            Err(TransitError::NotRunning)
        );
        assert_eq!(
            manager.add_item(&handle, "t", "u", "p"),
            Err(TransitError::NotRunning)
        );
        let mut out = [0u8; 64];
        assert_eq!(
            manager.seal(&handle, b"data", &mut out),
            Err(TransitError::NotRunning)
        );
        assert_eq!(out, [0u8; 64], "A refused call must not touch the output buffer");
        assert_eq!(h.sink.messages().len(), notifications, "No compartment code may run");
        assert!(matches!(manager.stop(&handle), Err(LifecycleError::NotRunning)));
    }

    #[test]
    fn test_stale_handle_after_restart_is_invalid() {
        let h = Harness::new();
        let manager = h.manager(false);
        let first = manager.start().unwrap();
        manager.stop(&first).unwrap();
        let second = manager.start().unwrap();

        assert_ne!(first, second);
        assert_eq!(
            manager.generate_random_number(&first),
            Err(TransitError::InvalidHandle)
        );
        assert!(matches!(manager.stop(&first), Err(LifecycleError::InvalidHandle)));
        assert!(manager.generate_random_number(&second).unwrap().is_ok());
    }

    #[test]
    fn test_resumed_identity_can_unseal() {
        let h = Harness::new();
        let manager = h.manager(true);
        let handle = manager.start().unwrap();
        let blob = seal_number(&manager, &handle, 1234);
        manager.stop(&handle).unwrap();

        let handle = manager.start().unwrap();
        let mut out = [0u8; 4];
        assert_eq!(manager.unseal(&handle, &blob, &mut out), Ok(Ok(4)));
        assert_eq!(i32::from_le_bytes(out), 1234);
    }

    #[test]
    fn test_fresh_identity_cannot_unseal() {
        let h = Harness::new();
        let manager = h.manager(false);
        let handle = manager.start().unwrap();
        let blob = seal_number(&manager, &handle, 1234);
        manager.stop(&handle).unwrap();

        let handle = manager.start().unwrap();
        let mut out = [0u8; 4];
        assert_eq!(
            manager.unseal(&handle, &blob, &mut out),
            Ok(Err(EnclaveError::UnsealingFailed))
        );
        assert_eq!(out, [0u8; 4]);
    }

    #[test]
    fn test_deleted_token_means_fresh_identity() {
        let h = Harness::new();
        let manager = h.manager(true);
        let handle = manager.start().unwrap();
        let blob = seal_number(&manager, &handle, 99);
        manager.stop(&handle).unwrap();

        fs::remove_file(h.token_path()).unwrap();
        let handle = manager.start().unwrap();
        let mut out = [0u8; 4];
        assert_eq!(
            manager.unseal(&handle, &blob, &mut out),
            Ok(Err(EnclaveError::UnsealingFailed))
        );
    }

    #[test]
    fn test_garbled_reply_is_transit_not_application_error() {
        let mut out = [0u8; 8];
        let garbled = deliver("unseal", b"{\"status\":", &mut out);
        assert!(matches!(garbled, Err(TransitError::Marshal(_))));

        let wrong_shape = deliver(
            "unseal",
            br#"{"status":{"Err":"no_such_error"},"output":[]}"#,
            &mut out,
        );
        assert!(matches!(wrong_shape, Err(TransitError::Marshal(_))));
        assert_eq!(out, [0u8; 8]);
    }

    #[test]
    fn test_oversized_reply_output_is_transit_error() {
        let reply = EntryResponse::written(vec![9u8; 16]).marshal().unwrap();
        let mut out = [0u8; 8];
        assert!(matches!(
            deliver("seal", &reply, &mut out),
            Err(TransitError::Marshal(_))
        ));
        assert_eq!(out, [0u8; 8]);
    }

    #[test]
    fn test_well_formed_reply_fills_buffer() {
        let reply = EntryResponse::written(vec![3u8; 4]).marshal().unwrap();
        let mut out = [0u8; 8];
        assert_eq!(
            deliver("unseal", &reply, &mut out),
            Ok(Ok(crate::boundary::EntryValue::Written(4)))
        );
        assert_eq!(out, [3, 3, 3, 3, 0, 0, 0, 0]);
    }

    #[test]
    fn test_concurrent_entry_calls_are_serialised() {
        let h = Harness::new();
        let manager = h.manager(false);
        let handle = manager.start().unwrap();

        std::thread::scope(|scope| {
            for t in 0..4 {
                let manager = &manager;
                scope.spawn(move || {
                    for i in 0..5 {
                        let title = format!("thread-{}-item-{}", t, i);
                        assert_eq!(
                            manager.add_item(&handle, &title, "user", "pw"),
                            Ok(crate::enclave::ItemAddStatus::Success)
                        );
                    }
                });
            }
        });

        let size = manager.sealed_wallet_size(&handle).unwrap();
        let mut blob = vec![0u8; size];
        manager.export_wallet(&handle, &mut blob).unwrap().unwrap();
        assert_eq!(manager.import_wallet(&handle, &blob), Ok(Ok(20)));
    }
}
