// Sealvault — CLI Module
//
// Command-line interface using clap derive macros. A run starts the enclave,
// exercises the entropy and seal entry points, stores one wallet item and
// shuts the enclave down again.

mod commands;

use std::path::PathBuf;

use clap::Parser;

pub use commands::execute;

/// Sealvault — password wallet backed by a sealed trusted compartment.
#[derive(Parser)]
#[command(name = "sealvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Title of the item to store.
    #[arg(long, default_value = "title item")]
    pub title: String,

    /// Username of the item to store.
    #[arg(long, default_value = "asonnino")]
    pub username: String,

    /// Password of the item to store.
    /// For real use, prefer an environment variable to avoid shell history exposure.
    #[arg(long, env = "SEALVAULT_PASSWORD", default_value = "test1234", hide_env_values = true)]
    pub password: String,

    /// Directory holding the resumability token and the sealed wallet.
    #[arg(long, env = "SEALVAULT_HOME")]
    pub data_dir: Option<PathBuf>,

    /// Compartment image to measure (defaults to this executable).
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Keep the platform secret in memory and persist nothing.
    #[arg(long, default_value = "false")]
    pub ephemeral: bool,
}
