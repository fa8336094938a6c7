//! `jmanager create` command.

use std::path::PathBuf;

use clap::Args;
use jmanager_core::{load_jmanagerfile, JManagerConfig};

use crate::output::ProgressPrinter;

#[derive(Args)]
pub struct CreateArgs {
    /// Path to the jmanagerfile (YAML list of jails)
    pub jmanagerfile: PathBuf,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Skip running setup tasks after creation
    #[arg(long)]
    pub no_provision: bool,
}

pub fn execute(args: CreateArgs, config: &JManagerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let requests = load_jmanagerfile(&args.jmanagerfile)?;
    tracing::debug!(
        path = %args.jmanagerfile.display(),
        jails = requests.len(),
        "Loaded jmanagerfile"
    );
    let manager = super::open_manager(config)?;

    let mut printer = ProgressPrinter::new(args.quiet);
    let jails = manager.create_jails(&requests, &mut |p| printer.report(p))?;

    if !args.no_provision {
        let provisioned = manager.provision(&requests)?;
        if provisioned > 0 && !args.quiet {
            println!("Provisioned {provisioned} jail(s)");
        }
    }

    for jail in &jails {
        println!("{}", jail.name);
    }
    Ok(())
}
