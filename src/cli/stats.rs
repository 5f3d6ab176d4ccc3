//! `teamfacts stats` and `teamfacts backfill` commands

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::utils::print_json;
use super::CliContext;

/// Stats command arguments
#[derive(Args, Debug)]
pub struct StatsArgs {}

/// Execute stats command
pub fn execute(_args: StatsArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service()?;
    let stats = service.stats(&ctx.team)?;

    if ctx.json() {
        return print_json(&stats);
    }

    let s = &stats.storage;
    let pct = |n: usize| if s.total_facts > 0 { n * 100 / s.total_facts } else { 0 };

    println!("📊 Knowledge for team '{}'\n", ctx.team.bold());
    println!("  Total facts:      {}", s.total_facts);
    println!("  ├── Active:       {} ({}%)", s.active_facts, pct(s.active_facts));
    println!("  └── Retired:      {} ({}%)", s.inactive_facts, pct(s.inactive_facts));
    println!("  Embedded:         {} of {} active", s.embedded_facts, s.active_facts);
    println!("  Decisions:        {}", s.decisions);
    println!("  Pending:          {}", stats.pending_confirmations);
    println!();
    println!("  Embedder:  {}", stats.embedder);
    println!("  Extractor: {}", stats.extractor);
    println!("  Judge:     {}", stats.judge);
    println!("\n📁 Database: {}", ctx.config.database_path().display());

    Ok(())
}

#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Maximum facts to embed in this run
    #[arg(short, long, default_value = "500")]
    pub limit: usize,
}

pub async fn run_backfill(args: BackfillArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service()?;
    let report = service.backfill_embeddings(&ctx.team, args.limit).await?;

    if ctx.json() {
        return print_json(&report);
    }

    println!("{} Embedded {} fact(s)", "✓".green(), report.embedded);
    if report.failed > 0 {
        println!(
            "   {} fact(s) could not be embedded; check the [ai] settings and run again",
            report.failed
        );
    }
    Ok(())
}
