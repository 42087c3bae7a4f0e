//! # Install Command Implementation
//!
//! Materializes every prefab of the project. Run after the package manager
//! installed or updated dependencies.

use anyhow::{bail, Context, Result};
use clap::Args;

use prefab::install::{install, InstallAction};
use prefab::output::{marker, Marker};

use super::ProjectArgs;

/// Materialize prefabs into their override directories
#[derive(Args, Debug)]
pub struct InstallArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Execute the `install` command.
pub fn execute(args: InstallArgs) -> Result<()> {
    let config = args.project.config()?;
    let report = install(&config).context("Failed to install prefabs")?;

    if report.installed.is_empty() && report.failed.is_empty() {
        println!("No prefabs found in {}", config.project_root.display());
        return Ok(());
    }

    for prefab in &report.installed {
        let what = match &prefab.action {
            InstallAction::AlreadyLinked => "already linked",
            InstallAction::Moved => "materialized",
            InstallAction::Kept => "kept",
            InstallAction::Merged(_) => "merged",
            InstallAction::Restored => "restored from patch",
            InstallAction::RestoredAndMerged(_) => "restored from patch and merged",
        };
        println!(
            "{} {} {} -> {}",
            marker(Marker::Ok),
            prefab.name,
            what,
            prefab.override_dir.display()
        );
    }

    for (name, file) in report.conflicts() {
        println!("{} {} has conflicts in {}", marker(Marker::Warn), name, file);
    }

    for failure in &report.failed {
        eprintln!("{} {}: {}", marker(Marker::Fail), failure.name, failure.error);
    }

    if !report.is_success() {
        bail!("{} prefab(s) could not be materialized", report.failed.len());
    }
    Ok(())
}
