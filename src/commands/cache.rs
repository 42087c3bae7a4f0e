//! # Cache Command Implementation
//!
//! This module implements the `cache` subcommand, which inspects and prunes
//! the local package cache.
//!
//! ## Subcommands
//!
//! - **`list`**: Display every cached package version
//! - **`clean`**: Remove cached package versions (--all, --older-than)

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use prefab::cache::{list_entries, remove_entry, CacheEntryInfo};
use prefab::defaults::default_cache_root;
use prefab::output::{format_size, marker, Marker};

/// Manage the package cache
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// The root directory for the package cache.
    ///
    /// Defaults to the system's cache directory (e.g. `~/.cache/prefab`
    /// on Linux).
    #[arg(long, value_name = "DIR", env = "PREFAB_CACHE")]
    pub cache_root: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheSubcommand {
    /// List all cached package versions
    List(ListArgs),
    /// Remove cached package versions
    Clean(CleanArgs),
}

/// Arguments for the cache list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the cache clean command
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Show what would be deleted without deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Delete every cache entry
    #[arg(long)]
    pub all: bool,

    /// Delete entries older than the given duration
    ///
    /// Duration format: number followed by unit (s, m, h, d, w)
    /// Examples: "30d", "7d", "1h", "30m", "2w"
    #[arg(long, value_name = "DURATION")]
    pub older_than: Option<String>,

    /// Skip confirmation prompt and delete immediately
    #[arg(long)]
    pub yes: bool,
}

/// Execute the `cache` command.
pub fn execute(args: CacheArgs) -> Result<()> {
    let cache_root = args.cache_root.unwrap_or_else(default_cache_root);
    match args.command {
        CacheSubcommand::List(list_args) => execute_list(&cache_root, list_args),
        CacheSubcommand::Clean(clean_args) => execute_clean(&cache_root, clean_args),
    }
}

fn execute_list(cache_root: &std::path::Path, args: ListArgs) -> Result<()> {
    let entries = list_entries(cache_root)
        .with_context(|| format!("Failed to read cache {}", cache_root.display()))?;

    if args.json {
        let json: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "entry": e.dir_name,
                    "path": e.path,
                    "files": e.file_count,
                    "size": e.size,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No cached packages found in: {}", cache_root.display());
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{:<50} {:>6} files {:>10}",
            entry.dir_name,
            entry.file_count,
            format_size(entry.size)
        );
    }
    let total: u64 = entries.iter().map(|e| e.size).sum();
    println!("\nTotal: {} entries ({})", entries.len(), format_size(total));
    Ok(())
}

fn execute_clean(cache_root: &std::path::Path, args: CleanArgs) -> Result<()> {
    if !args.all && args.older_than.is_none() {
        bail!("Specify what to clean: --all or --older-than <DURATION>");
    }
    let older_than = args
        .older_than
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    let entries = list_entries(cache_root)
        .with_context(|| format!("Failed to read cache {}", cache_root.display()))?;
    let now = SystemTime::now();
    let selected: Vec<&CacheEntryInfo> = entries
        .iter()
        .filter(|entry| match older_than {
            _ if args.all => true,
            Some(threshold) => entry
                .last_modified
                .and_then(|modified| now.duration_since(modified).ok())
                .is_none_or(|age| age >= threshold),
            None => false,
        })
        .collect();

    if selected.is_empty() {
        println!("No cache entries match the specified criteria.");
        return Ok(());
    }

    println!("Cache entries to be deleted:\n");
    for entry in &selected {
        println!("  {} ({})", entry.dir_name, format_size(entry.size));
    }

    if args.dry_run {
        println!("\nDry run mode - no changes were made.");
        return Ok(());
    }

    if !args.yes {
        print!("\nDo you want to delete these cache entries? (y/N): ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();
        if input != "y" && input != "yes" {
            println!("Clean cancelled.");
            return Ok(());
        }
    }

    let mut failed = 0;
    for entry in &selected {
        match remove_entry(entry) {
            Ok(()) => println!("{} Deleted {}", marker(Marker::Ok), entry.dir_name),
            Err(e) => {
                failed += 1;
                eprintln!("{} {}", marker(Marker::Fail), e);
            }
        }
    }
    if failed > 0 {
        bail!("Failed to delete {} cache entries", failed);
    }
    Ok(())
}

/// Parse a duration string such as "30d" into a Duration
fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_str = duration_str.trim().to_lowercase();
    let split_idx = duration_str
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(duration_str.len());
    if split_idx == 0 {
        bail!("Duration must start with a number: '{}'", duration_str);
    }

    let (number_str, unit_str) = duration_str.split_at(split_idx);
    let number: f64 = number_str
        .parse()
        .with_context(|| format!("Invalid number in duration: '{}'", number_str))?;

    let seconds = match unit_str {
        "s" | "sec" | "second" | "seconds" => number,
        "m" | "min" | "minute" | "minutes" => number * 60.0,
        "h" | "hr" | "hour" | "hours" => number * 3600.0,
        "d" | "day" | "days" => number * 86400.0,
        "w" | "week" | "weeks" => number * 604800.0,
        _ => bail!(
            "Invalid duration unit: '{}'. Valid units: s, m, h, d, w",
            unit_str
        ),
    };
    Ok(Duration::from_secs(seconds as u64))
}
