//! CLI command definitions and dispatch.

mod create;
mod destroy;
mod list;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use jmanager_core::{JManagerConfig, DEFAULT_CONFIG_PATH};
use jmanager_runtime::JailManager;

/// jmanager - declarative FreeBSD jails on ZFS.
#[derive(Parser)]
#[command(name = "jmanager", version, about)]
pub struct Cli {
    /// Configuration file [default: /usr/local/etc/jmanager.yml if present]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Create the jails described in a jmanagerfile
    Create(create::CreateArgs),
    /// Destroy jails and their records
    Destroy(destroy::DestroyArgs),
    /// List jails or base images
    List(list::ListArgs),
}

/// Load the configuration.
///
/// An explicit path must exist. Without one the default location is used
/// when present, built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<JManagerConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => JManagerConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
            JManagerConfig::load(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => JManagerConfig::default(),
    };
    Ok(config)
}

/// Open a manager on the host's ZFS.
pub(crate) fn open_manager(
    config: &JManagerConfig,
) -> Result<JailManager, Box<dyn std::error::Error>> {
    Ok(JailManager::from_config(config)?)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub fn dispatch(cli: Cli, config: &JManagerConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Create(args) => create::execute(args, config),
        Command::Destroy(args) => destroy::execute(args, config),
        Command::List(args) => list::execute(args, config),
    }
}
