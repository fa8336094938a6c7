//! `jmanager destroy` command.

use clap::Args;
use jmanager_core::JManagerConfig;

#[derive(Args)]
pub struct DestroyArgs {
    /// Jail names
    #[arg(required = true)]
    pub names: Vec<String>,
}

pub fn execute(args: DestroyArgs, config: &JManagerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let manager = super::open_manager(config)?;

    let mut errors: Vec<String> = Vec::new();
    for name in &args.names {
        match manager.destroy_jail(name) {
            Ok(()) => println!("{name}"),
            Err(e) => {
                tracing::warn!(jail = %name, error = %e, "Failed to destroy jail");
                errors.push(format!("{name}: {e}"));
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors.join("\n").into());
    }
    Ok(())
}
