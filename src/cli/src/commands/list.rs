//! `jmanager list` command.

use clap::{Args, ValueEnum};
use jmanager_core::JManagerConfig;

use crate::output;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    /// Jails cloned from a base image
    Jails,
    /// Base image checkpoints
    Base,
}

#[derive(Args)]
pub struct ListArgs {
    /// What to list
    #[arg(value_enum, default_value_t = ListKind::Jails)]
    pub kind: ListKind,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: ListArgs, config: &JManagerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let manager = super::open_manager(config)?;

    match args.kind {
        ListKind::Jails => {
            let jails = manager.list_jails()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&jails)?);
                return Ok(());
            }

            let mut table =
                output::new_table(&["NAME", "VERSION", "ARCH", "COMPONENTS", "USED", "MOUNTPOINT"]);
            for jail in &jails {
                table.add_row(&[
                    jail.name.clone(),
                    jail.distribution.version.to_string(),
                    jail.distribution.architecture.to_string(),
                    output::format_components(&jail.distribution),
                    output::format_bytes(jail.used),
                    jail.mountpoint.clone(),
                ]);
            }
            println!("{table}");
        }
        ListKind::Base => {
            let images = manager.list_base_images()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&images)?);
                return Ok(());
            }

            let mut table = output::new_table(&["VERSION", "ARCH", "COMPONENTS", "SNAPSHOT"]);
            for image in &images {
                table.add_row(&[
                    image.version.to_string(),
                    image.architecture.to_string(),
                    output::format_components(image),
                    image.snapshot_name(),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
