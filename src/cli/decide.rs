//! `teamfacts decide` command
//!
//! # Usage
//! ```bash
//! teamfacts decide "Use Slack for chat" --why "cheaper than Teams" --alternative Teams
//! teamfacts decide --list
//! ```

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use super::utils::{parse_fact_id, print_json};
use super::CliContext;
use crate::core::decision::NewDecision;

#[derive(Args, Debug)]
pub struct DecideArgs {
    /// What was decided
    pub what: Option<String>,

    /// Why
    #[arg(short, long, default_value = "")]
    pub why: String,

    /// Rejected alternative (repeatable)
    #[arg(short, long = "alternative")]
    pub alternatives: Vec<String>,

    /// Related fact ID (repeatable)
    #[arg(short, long = "fact")]
    pub facts: Vec<String>,

    /// List recent decisions instead
    #[arg(long)]
    pub list: bool,

    /// Maximum decisions to list
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

pub fn run(args: DecideArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service()?;

    if args.list {
        let decisions = service.get_decisions(&ctx.team, args.limit)?;
        if ctx.json() {
            return print_json(&decisions);
        }
        if decisions.is_empty() {
            println!("No decisions for team '{}'.", ctx.team);
        }
        for d in &decisions {
            println!("{} {}", d.created_at.format("%Y-%m-%d").to_string().dimmed(), d);
            if !d.alternatives.is_empty() {
                println!("    rejected: {}", d.alternatives.join(", "));
            }
        }
        return Ok(());
    }

    let Some(what) = args.what else {
        bail!("Say what was decided, or use --list.");
    };

    let mut new = NewDecision::new(what, args.why);
    new.alternatives = args.alternatives;
    new.made_by = ctx.user();
    new.related_facts = args
        .facts
        .iter()
        .map(|f| parse_fact_id(f))
        .collect::<Result<Vec<_>>>()?;

    let decision = service.create_decision(&ctx.team, new)?;

    if ctx.json() {
        return print_json(&decision);
    }

    println!("{} Decision recorded: {}", "✓".green(), decision.id);
    println!("   {}", decision);
    Ok(())
}
