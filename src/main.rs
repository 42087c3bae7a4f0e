//! # Prefab CLI
//!
//! This is the binary entry point for the `prefab` command-line tool. It is
//! meant to be run by package manager hooks: `prefab install` after
//! dependencies were installed, `prefab remove <pkg>...` before packages are
//! removed.
//!
//! The core logic lives in the `prefab` library crate; the binary only parses
//! arguments and reports results.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
