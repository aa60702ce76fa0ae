//! NebenChat - chat history store operator tool
//!
#![doc = "NebenChat - chat history store operator tool"]
#![doc = "Main entry point for the nebenchat binary."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nebenchat::cli::{Cli, Commands};
use nebenchat::commands;
use nebenchat::config::Config;

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(&config, command)?;
            Ok(())
        }
        Commands::Storage { command } => {
            tracing::info!("Starting storage command");
            commands::storage::handle_storage(&config, command)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins; otherwise `--verbose` switches the crate to debug.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "nebenchat=debug"
    } else {
        "nebenchat=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
