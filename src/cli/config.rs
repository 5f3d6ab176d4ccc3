//! `teamfacts config` command
//!
//! Get or set configuration values.
//!
//! # Usage
//! ```bash
//! teamfacts config                      # Show config file
//! teamfacts config ai.provider          # Get specific value
//! teamfacts config ai.provider local    # Set value
//! teamfacts config --path               # Show config file locations
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::CliContext;
use crate::config::{Config, DIR_NAME};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config key (e.g., user.name, ai.provider)
    pub key: Option<String>,

    /// Value to set
    pub value: Option<String>,

    /// Show config file path
    #[arg(long)]
    pub path: bool,

    /// Use global config (~/.teamfacts/config.toml) instead of local
    #[arg(short, long)]
    pub global: bool,
}

fn get_config_path(ctx: &CliContext, global: bool) -> PathBuf {
    if global {
        return Config::global_config_path().unwrap_or_else(|| PathBuf::from(DIR_NAME).join("config.toml"));
    }
    if let Some(explicit) = &ctx.config_path {
        return explicit.clone();
    }
    Config::find_local_dir()
        .unwrap_or_else(|| PathBuf::from(DIR_NAME))
        .join("config.toml")
}

pub fn run(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let config_path = get_config_path(ctx, args.global);

    if args.path {
        println!("Global: {}", get_config_path(ctx, true).display());
        println!("Local:  {}", get_config_path(ctx, false).display());
        println!();
        if config_path.exists() {
            println!("✓ Active: {}", config_path.display());
        } else {
            println!("⚠ No config file found at {}", config_path.display());
        }
        return Ok(());
    }

    let Some(key) = &args.key else {
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            println!("📋 Configuration ({}):\n", config_path.display());
            println!("{}", content);
        } else {
            println!("📋 No config file at {}", config_path.display());
            println!("\nDefaults in effect:\n");
            println!("{}", toml::to_string_pretty(&ctx.config)?);
        }
        return Ok(());
    };

    if let Some(value) = &args.value {
        set_config_value(&config_path, key, value)?;
        println!("✓ Set {} = {} (in {})", key, value, config_path.display());
    } else {
        match get_config_value(&config_path, key)? {
            Some(v) => println!("{}", v),
            None => println!("(not set)"),
        }
    }

    Ok(())
}

/// Set a nested config value using dot notation (e.g., "ai.provider").
///
/// The file is only written when the edited document still loads as a
/// `Config`.
fn set_config_value(path: &Path, key: &str, val: &str) -> Result<()> {
    let content = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };

    let updated = edit_config(&content, key, val)?;
    toml::from_str::<Config>(&updated)
        .with_context(|| format!("{} = {} is not a valid setting", key, val))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, updated)?;
    Ok(())
}

fn edit_config(content: &str, key: &str, val: &str) -> Result<String> {
    use toml_edit::{value, DocumentMut};

    let mut doc: DocumentMut = content.parse().context("Failed to parse config.toml")?;

    let parts: Vec<&str> = key.split('.').collect();
    match parts.as_slice() {
        [section, field] => {
            if doc.get(*section).is_none() {
                doc[*section] = toml_edit::table();
            }
            doc[*section][*field] = value(parse_toml_value(val));
        }
        _ => anyhow::bail!("Key must look like section.key, got: {}", key),
    }

    Ok(doc.to_string())
}

/// Get a config value by dot notation key
fn get_config_value(path: &Path, key: &str) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let doc: toml::Table = toml::from_str(&content).context("Failed to parse config.toml")?;

    let val = match key.split('.').collect::<Vec<_>>().as_slice() {
        [section, field] => doc.get(*section).and_then(|t| t.get(*field)),
        [top] => doc.get(*top),
        _ => None,
    };

    Ok(val.map(|v| match v {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }))
}

/// Parse string value to appropriate TOML type
fn parse_toml_value(s: &str) -> toml_edit::Value {
    if let Ok(b) = s.parse::<bool>() {
        return b.into();
    }
    if let Ok(i) = s.parse::<i64>() {
        return i.into();
    }
    if let Ok(f) = s.parse::<f64>() {
        return f.into();
    }
    s.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");

        set_config_value(&path, "ai.provider", "local")?;
        set_config_value(&path, "search.min_similarity", "0.25")?;
        set_config_value(&path, "store.reembed_on_update", "true")?;

        assert_eq!(get_config_value(&path, "ai.provider")?.as_deref(), Some("local"));
        assert_eq!(get_config_value(&path, "missing.key")?, None);

        let config = Config::load_from(&path)?;
        assert!(config.store.reembed_on_update);
        assert!((config.search.min_similarity - 0.25).abs() < 1e-6);

        assert!(set_config_value(&path, "too.deep.key", "x").is_err());
        Ok(())
    }

    #[test]
    fn test_invalid_value_leaves_file_untouched() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        set_config_value(&path, "ai.provider", "local")?;
        let before = fs::read_to_string(&path)?;

        assert!(set_config_value(&path, "ai.provider", "bogus").is_err());
        assert!(set_config_value(&path, "search.default_limit", "many").is_err());

        assert_eq!(fs::read_to_string(&path)?, before);
        assert!(Config::load_from(&path).is_ok());
        Ok(())
    }
}
