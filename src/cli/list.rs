//! `teamfacts list` command
//!
//! # Usage
//! ```bash
//! teamfacts list
//! teamfacts list --category finance --limit 20
//! teamfacts list --all          # include invalidated facts
//! ```

use anyhow::Result;
use clap::Args;

use super::utils::{fact_table, print_json};
use super::CliContext;
use crate::core::fact::Category;
use crate::core::storage::FactFilter;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only this category
    #[arg(short = 'C', long)]
    pub category: Option<Category>,

    /// Include invalidated and superseded facts
    #[arg(short, long)]
    pub all: bool,

    /// Maximum results
    #[arg(short, long, default_value = "50")]
    pub limit: usize,
}

pub fn run(args: ListArgs, ctx: &CliContext) -> Result<()> {
    let mut filter = FactFilter::default().with_limit(args.limit);
    if let Some(category) = args.category {
        filter = filter.with_category(category);
    }
    if args.all {
        filter = filter.include_invalid();
    }

    let service = ctx.service()?;
    let facts = service.get_facts(&ctx.team, &filter)?;

    if ctx.json() {
        return print_json(&facts);
    }

    if facts.is_empty() {
        println!("No facts for team '{}'.", ctx.team);
        return Ok(());
    }

    println!("{}", fact_table(&facts));
    println!("{} fact(s)", facts.len());
    Ok(())
}
