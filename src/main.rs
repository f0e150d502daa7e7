// Sealvault — Application Entry Point
//
// Parses CLI arguments, initializes structured logging (with a filter that
// never emits secret values), and runs one wallet session.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sealvault::cli::{execute, Cli};

fn main() {
    // RUST_LOG=sealvault=debug also shows the compartment's debug notifications.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sealvault=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
