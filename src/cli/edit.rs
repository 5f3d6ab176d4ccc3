//! `teamfacts update` and `teamfacts invalidate` commands
//!
//! # Usage
//! ```bash
//! teamfacts update 01HQ3K2JN5... --content "We ship from Leeds and York"
//! teamfacts update 01HQ3K2JN5... --category manufacturing
//! teamfacts invalidate 01HQ3K2JN5...
//! teamfacts invalidate 01HQ3K2JN5... --superseded-by 01HQ4...
//! ```
//!
//! `update` edits in place and keeps the fact active. To replace a fact
//! and keep the old version in history, use `propose` instead.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use super::utils::{parse_fact_id, print_fact, print_json};
use super::CliContext;
use crate::core::fact::{Category, FactUpdate};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Fact ID
    pub id: String,

    /// New content
    #[arg(long)]
    pub content: Option<String>,

    /// New category
    #[arg(short = 'C', long)]
    pub category: Option<Category>,
}

pub async fn run_update(args: UpdateArgs, ctx: &CliContext) -> Result<()> {
    let id = parse_fact_id(&args.id)?;
    let update = FactUpdate {
        content: args.content,
        category: args.category,
    };
    if update.is_empty() {
        bail!("Nothing to update. Pass --content and/or --category.");
    }

    let service = ctx.service()?;
    let fact = service.update_fact(&id, update).await?;

    if ctx.json() {
        return print_json(&fact);
    }

    println!("{} Updated", "✓".green());
    print_fact(&fact);
    Ok(())
}

#[derive(Args, Debug)]
pub struct InvalidateArgs {
    /// Fact ID
    pub id: String,

    /// ID of the fact that replaces this one
    #[arg(long)]
    pub superseded_by: Option<String>,
}

pub fn run_invalidate(args: InvalidateArgs, ctx: &CliContext) -> Result<()> {
    let id = parse_fact_id(&args.id)?;
    let superseded_by = args.superseded_by.as_deref().map(parse_fact_id).transpose()?;

    let service = ctx.service()?;
    let fact = service.invalidate_fact(&id, superseded_by.as_ref())?;

    if ctx.json() {
        return print_json(&fact);
    }

    println!("{} Invalidated", "✓".green());
    print_fact(&fact);
    Ok(())
}
