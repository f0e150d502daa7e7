// Sealvault — Library root
//
// Re-exports the trusted compartment, its boundary, the host side and the CLI.

pub mod boundary;
pub mod cli;
pub mod config;
pub mod enclave;
pub mod error;
pub mod host;

pub use error::{Result, WalletError};
