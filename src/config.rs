// Sealvault — Configuration
//
// Resolves where the compartment image, the resumability token and the sealed
// wallet live. Command-line flags win over `SEALVAULT_HOME`, which wins over
// the platform data directory.

use std::path::PathBuf;

use crate::enclave::KdfParams;
use crate::host::EnclaveConfig;

/// File name of the resumability token inside the data directory.
pub const TOKEN_FILE: &str = "enclave.token";

/// File name of the sealed wallet inside the data directory.
pub const WALLET_FILE: &str = "wallet.seal";

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub data_dir: PathBuf,
    pub image_path: PathBuf,
    /// In-memory root secret, no token, nothing written to disk.
    pub ephemeral: bool,
    pub kdf: KdfParams,
}

impl WalletConfig {
    /// Build the configuration from optional overrides. The compartment image
    /// defaults to the running executable.
    pub fn resolve(
        data_dir: Option<PathBuf>,
        image_path: Option<PathBuf>,
        ephemeral: bool,
    ) -> std::io::Result<Self> {
        let image_path = match image_path {
            Some(path) => path,
            None => std::env::current_exe()?,
        };

        Ok(Self {
            data_dir: data_dir.unwrap_or_else(default_data_dir),
            image_path,
            ephemeral,
            kdf: KdfParams::default(),
        })
    }

    pub fn token_path(&self) -> Option<PathBuf> {
        (!self.ephemeral).then(|| self.data_dir.join(TOKEN_FILE))
    }

    pub fn wallet_path(&self) -> Option<PathBuf> {
        (!self.ephemeral).then(|| self.data_dir.join(WALLET_FILE))
    }

    pub fn enclave_config(&self) -> EnclaveConfig {
        EnclaveConfig {
            image_path: self.image_path.clone(),
            token_path: self.token_path(),
        }
    }
}

/// Default directory for Sealvault data files.
fn default_data_dir() -> PathBuf {
    let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("sealvault")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_live_under_data_dir() {
        let config = WalletConfig::resolve(
            Some(PathBuf::from("/var/lib/sealvault")),
            Some(PathBuf::from("/opt/enclave.signed.so")),
            false,
        )
        .unwrap();

        assert_eq!(
            config.token_path(),
            Some(PathBuf::from("/var/lib/sealvault/enclave.token"))
        );
        assert_eq!(
            config.wallet_path(),
            Some(PathBuf::from("/var/lib/sealvault/wallet.seal"))
        );
        assert_eq!(
            config.enclave_config().image_path,
            PathBuf::from("/opt/enclave.signed.so")
        );
    }

    #[test]
    fn test_ephemeral_persists_nothing() {
        let config = WalletConfig::resolve(None, None, true).unwrap();
        assert!(config.token_path().is_none());
        assert!(config.wallet_path().is_none());
        assert!(config.enclave_config().token_path.is_none());
    }

    #[test]
    fn test_image_defaults_to_current_executable() {
        let config = WalletConfig::resolve(None, None, false).unwrap();
        assert_eq!(config.image_path, std::env::current_exe().unwrap());
        assert!(config.data_dir.ends_with("sealvault"));
    }

    #[test]
    fn test_default_kdf_is_argon2id_strong_profile() {
        let config = WalletConfig::resolve(None, None, false).unwrap();
        assert_eq!(config.kdf, KdfParams::default());
        assert_eq!(config.kdf.m_cost, 65536);
    }
}
