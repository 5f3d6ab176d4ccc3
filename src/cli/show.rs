//! `teamfacts show` command
//!
//! Shows a fact by ID, optionally with its supersession chain.
//!
//! # Usage
//! ```bash
//! teamfacts show 01HQ3K2JN5...
//! teamfacts show 01HQ3K2JN5... --with-history
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;

use super::utils::{parse_fact_id, print_fact, print_json};
use super::CliContext;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Fact ID
    pub id: String,

    /// Show every version, oldest first
    #[arg(long)]
    pub with_history: bool,
}

pub fn run(args: ShowArgs, ctx: &CliContext) -> Result<()> {
    let id = parse_fact_id(&args.id)?;
    let service = ctx.service()?;

    let fact = service.get_fact(&id)?;
    let history = if args.with_history {
        service.get_history(&id)?
    } else {
        Vec::new()
    };

    if ctx.json() {
        if args.with_history {
            return print_json(&json!({ "fact": fact, "history": history }));
        }
        return print_json(&fact);
    }

    print_fact(&fact);

    if args.with_history && history.len() > 1 {
        println!("\n{}", "History (oldest first):".bold());
        for (i, version) in history.iter().enumerate() {
            let marker = if version.id == fact.id { "→" } else { " " };
            let state = if version.is_active() {
                "active".green()
            } else {
                "retired".dimmed()
            };
            println!(
                "  {} {}. {} [{}] {}",
                marker,
                i + 1,
                version.valid_from.format("%Y-%m-%d"),
                state,
                version.content
            );
        }
    }

    Ok(())
}
