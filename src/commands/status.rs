//! # Status Command Implementation
//!
//! Lists every prefab reachable from the project manifest and the state of
//! its override directory.

use anyhow::{Context, Result};
use clap::Args;

use prefab::prefab::{status, PrefabState};

use super::ProjectArgs;

/// Show the state of every prefab in the project
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Execute the `status` command.
pub fn execute(args: StatusArgs) -> Result<()> {
    let config = args.project.config()?;
    let prefabs = status(&config).context("Failed to inspect prefabs")?;

    if args.json {
        let entries: Vec<serde_json::Value> = prefabs
            .iter()
            .map(|p| {
                let state = match p.state {
                    PrefabState::Absent => "absent",
                    PrefabState::Materialized { .. } => "materialized",
                    PrefabState::Captured { .. } => "captured",
                };
                serde_json::json!({
                    "name": p.name,
                    "override": p.override_dir,
                    "state": state,
                    "version": p.state.version(),
                    "linked": p.linked,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if prefabs.is_empty() {
        println!("No prefabs found in {}", config.project_root.display());
        return Ok(());
    }

    for prefab in &prefabs {
        let relative = prefab
            .override_dir
            .strip_prefix(&config.project_root)
            .unwrap_or(&prefab.override_dir);
        println!(
            "{:<30} {:<30} {}{}",
            prefab.name,
            relative.display(),
            prefab.state,
            if prefab.linked { "" } else { " (not linked)" }
        );
    }
    Ok(())
}
