//! `teamfacts propose` command
//!
//! Checks a fact against the team's relevant facts before storing it. A
//! contradiction or near-duplicate is parked until someone answers, either
//! right away with `--interactive` or later with `teamfacts pending`.
//!
//! # Usage
//! ```bash
//! teamfacts propose "There are 6 dwarfs"
//! teamfacts propose "Actually the launch date is March 25, not March 22"
//! teamfacts propose "We ship from York" --key conv-42 --interactive
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use dialoguer::Select;

use super::add::FactInput;
use super::utils::{print_fact, print_json};
use super::CliContext;
use crate::core::pending::PendingConfirmation;
use crate::core::service::{FactService, ProposalOutcome, Resolution};

#[derive(Args, Debug)]
pub struct ProposeArgs {
    #[command(flatten)]
    pub fact: FactInput,

    /// Key to park the fact under if confirmation is needed
    /// (conversation or question id; generated when omitted)
    #[arg(short, long)]
    pub key: Option<String>,

    /// Ask for a decision right away instead of leaving it pending
    #[arg(short, long)]
    pub interactive: bool,
}

pub async fn run(args: ProposeArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service()?;
    let new = args.fact.to_new_fact(ctx.user())?;

    let proposal = service.propose_fact(&ctx.team, new, args.key.as_deref()).await?;

    if ctx.json() {
        return print_json(&proposal);
    }

    println!(
        "Conflict check: {} ({}) - {}",
        proposal.check.action.to_string().bold(),
        proposal.check.conflict_type,
        proposal.check.reason
    );

    match proposal.outcome {
        ProposalOutcome::AwaitingUser { pending } if args.interactive => {
            let outcome = ask(&service, &pending).await?;
            print_outcome(&outcome);
        }
        outcome => print_outcome(&outcome),
    }

    Ok(())
}

/// Let the user pick a resolution for `pending`
async fn ask(service: &FactService, pending: &PendingConfirmation) -> Result<ProposalOutcome> {
    print_pending(service, pending);

    let mut choices = Vec::new();
    if pending.related_fact_id.is_some() {
        choices.push((Resolution::ConfirmUpdate, "Replace the existing fact"));
    }
    choices.push((Resolution::SaveAnyway, "Keep both facts"));
    choices.push((Resolution::Cancel, "Discard the new fact"));

    let labels: Vec<&str> = choices.iter().map(|(_, label)| *label).collect();
    let picked = Select::new()
        .with_prompt("What should happen?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(service.resolve_pending(&pending.team_id, &pending.key, choices[picked].0).await?)
}

/// Show a pending confirmation next to the fact it conflicts with
pub fn print_pending(service: &FactService, pending: &PendingConfirmation) {
    println!("\n{} {}", "Pending".yellow().bold(), pending.key);
    println!("  Proposed: {}", pending.proposed.content);
    println!("  Conflict: {} - {}", pending.conflict_type, pending.reason);
    if let Some(id) = pending.related_fact_id {
        match service.get_fact(&id) {
            Ok(existing) => println!("  Existing: {} ({})", existing.content, existing.id),
            Err(_) => println!("  Existing: {} (no longer found)", id),
        }
    }
    println!(
        "  Expires:  {}",
        pending.expires_at.format("%Y-%m-%d %H:%M")
    );
}

pub fn print_outcome(outcome: &ProposalOutcome) {
    match outcome {
        ProposalOutcome::Saved { fact } => {
            println!("{} Saved", "✓".green());
            print_fact(fact);
        }
        ProposalOutcome::Updated { fact, superseded } => {
            println!("{} Updated: {} replaces {}", "✓".green(), fact.id, superseded.id);
            println!("  was: {}", superseded.content.dimmed());
            println!("  now: {}", fact.content);
        }
        ProposalOutcome::AwaitingUser { pending } => {
            println!("{} Waiting for confirmation under key {}", "?".yellow(), pending.key.bold());
            println!("  teamfacts pending confirm {}", pending.key);
            println!("  teamfacts pending save-anyway {}", pending.key);
            println!("  teamfacts pending cancel {}", pending.key);
        }
        ProposalOutcome::Discarded { pending } => {
            println!("{} Discarded: {}", "✗".red(), pending.proposed.content);
        }
    }
}
