// Sealvault — Host controller
//
// Drives one session against the trusted compartment:
//   start → load sealed wallet → random number → seal/unseal round trip
//   → add item → export sealed wallet → stop
// The enclave is always stopped before returning, also when a step failed.
// Transit status is checked before any application status.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::boundary::TracingSink;
use crate::config::WalletConfig;
use crate::enclave::{
    sealed_size, EntropySource, ItemAddStatus, KeyringPlatform, MemoryPlatform, OsEntropy,
    SealPrimitive,
};
use crate::error::WalletError;
use crate::host::{CompartmentHandle, EnclaveConfig, EnclaveManager};

use super::Cli;

/// Plaintext item fields, wiped when the session ends.
struct ItemInput {
    title: Zeroizing<String>,
    username: Zeroizing<String>,
    password: Zeroizing<String>,
}

/// Execute one wallet session.
pub fn execute(cli: Cli) -> Result<(), WalletError> {
    let item = ItemInput {
        title: Zeroizing::new(cli.title),
        username: Zeroizing::new(cli.username),
        password: Zeroizing::new(cli.password),
    };
    let config = WalletConfig::resolve(cli.data_dir, cli.image, cli.ephemeral)?;
    if !config.ephemeral {
        fs::create_dir_all(&config.data_dir)?;
    }

    let platform: Arc<dyn SealPrimitive> = if config.ephemeral {
        Arc::new(MemoryPlatform::generate(config.kdf, &OsEntropy)?)
    } else {
        Arc::new(KeyringPlatform::new(config.kdf))
    };

    run_session(config.enclave_config(), platform, Arc::new(OsEntropy), &config, item)
}

fn run_session(
    enclave: EnclaveConfig,
    platform: Arc<dyn SealPrimitive>,
    entropy: Arc<dyn EntropySource>,
    config: &WalletConfig,
    item: ItemInput,
) -> Result<(), WalletError> {
    let manager = EnclaveManager::new(enclave, platform, entropy, Arc::new(TracingSink));

    let handle = manager.start().map_err(WalletError::Initialization)?;
    println!("✓ Enclave successfully initialised");

    let outcome = run_entry_points(&manager, &handle, config, item);
    let stopped = manager.stop(&handle).map_err(WalletError::Teardown);

    outcome?;
    stopped?;
    println!("✓ Enclave successfully destroyed");
    Ok(())
}

fn run_entry_points(
    manager: &EnclaveManager,
    handle: &CompartmentHandle,
    config: &WalletConfig,
    item: ItemInput,
) -> Result<(), WalletError> {
    if let Some(path) = config.wallet_path() {
        load_wallet(manager, handle, &path)?;
    }

    let number = manager
        .generate_random_number(handle)
        .map_err(WalletError::transit("generate_random_number"))?
        .map_err(WalletError::Entropy)?;
    println!("Random number generated: {}", number);

    let unsealed = seal_round_trip(manager, handle, number)?;
    println!("✓ Seal round trip success, received back: {}", unsealed);

    let status = manager
        .add_item(handle, &item.title, &item.username, &item.password)
        .map_err(WalletError::transit("add_item"))?;
    drop(item);
    match status {
        ItemAddStatus::Success => println!("✓ {}", status),
        rejected => return Err(WalletError::ItemRejected(rejected)),
    }

    if let Some(path) = config.wallet_path() {
        save_wallet(manager, handle, &path)?;
    }

    Ok(())
}

/// Seal `number`, unseal the blob again and check that it survived.
fn seal_round_trip(
    manager: &EnclaveManager,
    handle: &CompartmentHandle,
    number: i32,
) -> Result<i32, WalletError> {
    let plaintext = number.to_le_bytes();
    let mut blob = vec![0u8; sealed_size(plaintext.len())];
    manager
        .seal(handle, &plaintext, &mut blob)
        .map_err(WalletError::transit("seal"))?
        .map_err(WalletError::Sealing)?;

    let mut recovered = [0u8; 4];
    manager
        .unseal(handle, &blob, &mut recovered)
        .map_err(WalletError::transit("unseal"))?
        .map_err(WalletError::Unsealing)?;

    let unsealed = i32::from_le_bytes(recovered);
    if unsealed != number {
        return Err(WalletError::RoundTripMismatch);
    }
    Ok(unsealed)
}

fn load_wallet(
    manager: &EnclaveManager,
    handle: &CompartmentHandle,
    path: &Path,
) -> Result<(), WalletError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No sealed wallet yet");
        return Ok(());
    }

    let blob = fs::read(path)?;
    let count = manager
        .import_wallet(handle, &blob)
        .map_err(WalletError::transit("import_wallet"))?
        .map_err(WalletError::WalletImport)?;
    println!("✓ Loaded sealed wallet ({} items)", count);
    Ok(())
}

/// Export the pending snapshot and replace the wallet file with it.
fn save_wallet(
    manager: &EnclaveManager,
    handle: &CompartmentHandle,
    path: &Path,
) -> Result<(), WalletError> {
    let size = manager
        .sealed_wallet_size(handle)
        .map_err(WalletError::transit("sealed_wallet_size"))?;
    if size == 0 {
        return Ok(());
    }

    let mut blob = vec![0u8; size];
    let written = manager
        .export_wallet(handle, &mut blob)
        .map_err(WalletError::transit("export_wallet"))?
        .map_err(WalletError::WalletExport)?;
    blob.truncate(written);

    let staging = path.with_extension("seal.tmp");
    fs::write(&staging, &blob)?;
    fs::rename(&staging, path)?;

    println!("✓ Sealed wallet written to {}", path.display());
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::mock::{memory_platform, SwitchableEntropy};
    use crate::enclave::WALLET_MAX_ITEM_SIZE;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Setup {
        dir: TempDir,
        config: WalletConfig,
        platform: Arc<dyn SealPrimitive>,
    }

    fn setup(ephemeral: bool) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("enclave.signed.so");
        fs::write(&image, b"trusted image").unwrap();
        let mut config =
            WalletConfig::resolve(Some(dir.path().to_path_buf()), Some(image), ephemeral).unwrap();
        config.kdf = crate::enclave::mock::cheap_kdf();
        Setup {
            dir,
            config,
            platform: Arc::new(memory_platform()),
        }
    }

    fn item(title: &str, username: &str, password: &str) -> ItemInput {
        ItemInput {
            title: Zeroizing::new(title.to_string()),
            username: Zeroizing::new(username.to_string()),
            password: Zeroizing::new(password.to_string()),
        }
    }

    fn run(s: &Setup, entropy: Arc<dyn EntropySource>, input: ItemInput) -> Result<(), WalletError> {
        run_session(
            s.config.enclave_config(),
            s.platform.clone(),
            entropy,
            &s.config,
            input,
        )
    }

    fn wallet_file(s: &Setup) -> PathBuf {
        s.dir.path().join("wallet.seal")
    }

    #[test]
    fn test_happy_path_persists_wallet() {
        let s = setup(false);
        run(&s, Arc::new(OsEntropy), item("title item", "asonnino", "test1234")).unwrap();

        let blob = fs::read(wallet_file(&s)).unwrap();
        assert!(!blob.windows(8).any(|w| w == b"test1234"));
        assert!(s.dir.path().join("enclave.token").exists());
    }

    #[test]
    fn test_second_session_appends_to_wallet() {
        let s = setup(false);
        run(&s, Arc::new(OsEntropy), item("mail", "alice", "pw1")).unwrap();
        let first = fs::read(wallet_file(&s)).unwrap().len();

        run(&s, Arc::new(OsEntropy), item("bank", "bob", "pw2")).unwrap();
        let second = fs::read(wallet_file(&s)).unwrap().len();
        assert!(second > first, "The resumed session must load and extend the wallet");
    }

    #[test]
    fn test_rejected_item_is_reported() {
        let s = setup(false);
        let long = "X".repeat(WALLET_MAX_ITEM_SIZE + 1);
        let err = run(&s, Arc::new(OsEntropy), item("t", &long, "p")).unwrap_err();
        assert!(matches!(
            err,
            WalletError::ItemRejected(ItemAddStatus::UsernameTooLong)
        ));
        assert!(!wallet_file(&s).exists());
    }

    #[test]
    fn test_missing_image_is_initialization_error() {
        let mut s = setup(false);
        s.config.image_path = s.dir.path().join("missing.so");
        let err = run(&s, Arc::new(OsEntropy), item("t", "u", "p")).unwrap_err();
        assert!(matches!(err, WalletError::Initialization(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_wallet_from_other_identity_is_rejected() {
        let s = setup(false);
        run(&s, Arc::new(OsEntropy), item("t", "u", "p")).unwrap();
        fs::remove_file(s.dir.path().join("enclave.token")).unwrap();

        let err = run(&s, Arc::new(OsEntropy), item("t2", "u2", "p2")).unwrap_err();
        assert!(matches!(
            err,
            WalletError::WalletImport(crate::enclave::EnclaveError::UnsealingFailed)
        ));
    }

    #[test]
    fn test_ephemeral_session_writes_nothing() {
        let s = setup(true);
        run(&s, Arc::new(OsEntropy), item("t", "u", "p")).unwrap();
        assert!(!wallet_file(&s).exists());
        assert!(!s.dir.path().join("enclave.token").exists());
    }

    #[test]
    fn test_entropy_failure_aborts_before_sealing() {
        let s = setup(true);
        let entropy = Arc::new(SwitchableEntropy::default());
        let manager = EnclaveManager::new(
            s.config.enclave_config(),
            s.platform.clone(),
            entropy.clone(),
            Arc::new(TracingSink),
        );
        let handle = manager.start().unwrap();
        entropy.set_broken(true);

        let err = run_entry_points(&manager, &handle, &s.config, item("t", "u", "p")).unwrap_err();
        assert!(matches!(err, WalletError::Entropy(_)));
        manager.stop(&handle).unwrap();
    }
}
