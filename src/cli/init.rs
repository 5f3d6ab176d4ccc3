//! `teamfacts init` command
//!
//! Creates `.teamfacts/` with a config file, the fact database and the
//! pending confirmations database.
//!
//! # Usage
//! ```bash
//! teamfacts init                    # Initialize in current directory
//! teamfacts init /path/to/project   # Initialize in specific path
//! teamfacts init --global           # Initialize ~/.teamfacts
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use super::CliContext;
use crate::config::{pending_path_for, Config, DIR_NAME};
use crate::core::pending::PendingStore;
use crate::core::storage::Storage;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path to initialize (default: current directory)
    pub path: Option<PathBuf>,

    /// Initialize global config (~/.teamfacts)
    #[arg(long)]
    pub global: bool,

    /// Force re-initialization
    #[arg(short, long)]
    pub force: bool,

    /// Team used when --team is not given
    #[arg(long)]
    pub default_team: Option<String>,
}

pub fn run(args: InitArgs, ctx: &CliContext) -> Result<()> {
    // 1. Determine target directory
    let dir = if args.global {
        Config::global_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
    } else {
        args.path.unwrap_or_else(|| PathBuf::from(".")).join(DIR_NAME)
    };

    // 2. Check if already initialized
    if is_initialized(&dir) && !args.force {
        bail!(
            "{} already exists. Use --force to reinitialize.",
            dir.display()
        );
    }

    fs::create_dir_all(&dir)?;

    // 3. Write config, keeping an existing one on --force
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        let mut config = Config::default();
        if let Some(team) = args.default_team.clone() {
            config.user.team = team;
        }
        config.save_to(&config_path)?;
    }

    // 4. Create both databases with their schema
    let db_path = dir.join("data.db");
    Storage::open(&db_path)?;
    PendingStore::open(&pending_path_for(&db_path))?;

    tracing::info!(dir = %dir.display(), "initialized");

    if ctx.json() {
        return super::utils::print_json(&serde_json::json!({
            "config": config_path,
            "database": db_path,
        }));
    }

    println!("{} Initialized {}", "✓".green(), dir.display());
    println!("   Config:   {}", config_path.display());
    println!("   Database: {}", db_path.display());
    println!("\nNext steps:");
    println!("  teamfacts add \"We ship from Leeds\" --category manufacturing");
    println!("  teamfacts propose \"We ship from York\"");
    println!("  teamfacts search \"ship\"");

    Ok(())
}

fn is_initialized(dir: &Path) -> bool {
    dir.join("data.db").exists()
}
