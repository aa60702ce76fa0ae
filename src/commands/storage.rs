use crate::cli::StorageCommand;
use crate::config::Config;
use crate::error::Result;
use crate::storage::{select_backend, FileStorage};
use colored::Colorize;

/// Handle storage commands
pub fn handle_storage(config: &Config, command: StorageCommand) -> Result<()> {
    if let StorageCommand::Check = command {
        let selection = select_backend(&config.storage)?;
        println!("Selected backend: {}", selection.to_string().cyan());
        return Ok(());
    }

    let storage = super::open_storage(config)?;
    run_storage(storage.as_ref(), command)
}

/// Run a storage command against an already constructed backend
pub fn run_storage(storage: &dyn FileStorage, command: StorageCommand) -> Result<()> {
    match command {
        StorageCommand::Ls { path } => {
            let entries = storage.list_dir(&path)?;
            if entries.is_empty() {
                println!("{}", format!("{} is empty", path).yellow());
            }
            for entry in entries {
                println!("{}", entry);
            }
        }
        StorageCommand::Cat { path } => {
            println!("{}", storage.read(&path)?);
        }
        StorageCommand::Rm { path } => {
            storage.remove(&path)?;
            println!("{}", format!("Removed {}", path).green());
        }
        StorageCommand::Check => {
            println!(
                "Storage backend: {}",
                storage.backend_name().to_string().cyan()
            );
        }
    }

    Ok(())
}
