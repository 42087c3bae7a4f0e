//! # Remove Command Implementation
//!
//! Captures the prefabs that become unreachable when packages are removed.
//! Run before the package manager removes them.

use anyhow::{Context, Result};
use clap::Args;

use prefab::output::{marker, Marker};
use prefab::remove::remove;

use super::ProjectArgs;

/// Capture prefabs of packages about to be removed into patches
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Packages being removed
    #[arg(required = true, value_name = "PACKAGE")]
    pub packages: Vec<String>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Execute the `remove` command.
pub fn execute(args: RemoveArgs) -> Result<()> {
    let config = args.project.config()?;
    let captured = remove(&config, &args.packages)
        .with_context(|| format!("Failed to capture prefabs of {}", args.packages.join(", ")))?;

    if captured.is_empty() {
        println!("No prefabs affected");
        return Ok(());
    }

    for prefab in &captured {
        match &prefab.patch_file {
            Some(path) => println!(
                "{} {}@{} captured into {}",
                marker(Marker::Ok),
                prefab.name,
                prefab.version,
                path.display()
            ),
            None => println!(
                "{} {}@{} removed (no local changes)",
                marker(Marker::Ok),
                prefab.name,
                prefab.version
            ),
        }
    }
    Ok(())
}
