//! Pending confirmation CLI commands
//!
//! Facts parked by `propose` wait here until someone answers.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::propose::{print_outcome, print_pending};
use super::utils::print_json;
use super::CliContext;
use crate::core::service::Resolution;

#[derive(Args, Debug)]
pub struct PendingArgs {
    #[command(subcommand)]
    pub command: PendingCommands,
}

#[derive(Subcommand, Debug)]
pub enum PendingCommands {
    /// List unexpired pending facts for the team
    List,

    /// Replace the conflicting fact with the proposed one
    Confirm {
        /// Pending key
        key: String,
    },

    /// Store the proposed fact next to the existing one
    SaveAnyway {
        /// Pending key
        key: String,
    },

    /// Drop the proposed fact
    Cancel {
        /// Pending key
        key: String,
    },
}

pub async fn execute(args: PendingArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service()?;

    let (key, resolution) = match args.command {
        PendingCommands::List => {
            let pending = service.list_pending(&ctx.team)?;
            if ctx.json() {
                return print_json(&pending);
            }
            if pending.is_empty() {
                println!("✨ No pending facts.");
                return Ok(());
            }
            println!("📋 {} pending fact(s):", pending.len());
            for item in &pending {
                print_pending(&service, item);
            }
            return Ok(());
        }
        PendingCommands::Confirm { key } => (key, Resolution::ConfirmUpdate),
        PendingCommands::SaveAnyway { key } => (key, Resolution::SaveAnyway),
        PendingCommands::Cancel { key } => (key, Resolution::Cancel),
    };

    let outcome = service.resolve_pending(&ctx.team, &key, resolution).await?;

    if ctx.json() {
        return print_json(&outcome);
    }
    print_outcome(&outcome);

    Ok(())
}
