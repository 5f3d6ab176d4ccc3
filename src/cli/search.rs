//! `teamfacts search`, `knowledge` and `context` commands
//!
//! # Usage
//! ```bash
//! teamfacts search "launch date"
//! teamfacts knowledge "slack"              # facts and decisions side by side
//! teamfacts context "slack" --token-budget 500
//! ```
//!
//! Retrieval prefers embeddings, falls back to keywords, and then to the
//! most recent facts when the query has no usable words.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::utils::{hit_table, print_json};
use super::CliContext;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Maximum results (default: search.default_limit)
    #[arg(short, long)]
    pub limit: Option<usize>,
}

pub async fn run(args: SearchArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service()?;
    let hits = service.search_facts(&ctx.team, &args.query, args.limit).await?;

    if ctx.json() {
        return print_json(&hits);
    }

    if hits.is_empty() {
        println!("No facts found for '{}'", args.query);
        return Ok(());
    }

    println!("{}", hit_table(&hits));
    Ok(())
}

#[derive(Args, Debug)]
pub struct KnowledgeArgs {
    /// Search query
    pub query: String,

    /// Maximum results per kind
    #[arg(short, long)]
    pub limit: Option<usize>,
}

pub async fn run_knowledge(args: KnowledgeArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service()?;
    let results = service.search_knowledge(&ctx.team, &args.query, args.limit).await?;

    if ctx.json() {
        return print_json(&results);
    }

    if results.is_empty() {
        println!("Nothing found for '{}'", args.query);
        return Ok(());
    }

    println!("{}", "Facts".bold());
    if results.facts.is_empty() {
        println!("  (none)");
    } else {
        println!("{}", hit_table(&results.facts));
    }

    println!("{}", "Decisions".bold());
    if results.decisions.is_empty() {
        println!("  (none)");
    }
    for decision in &results.decisions {
        println!("  {} {}", decision.created_at.format("%Y-%m-%d").to_string().dimmed(), decision);
    }

    Ok(())
}

#[derive(Args, Debug)]
pub struct ContextArgs {
    /// Search query
    pub query: String,

    /// Maximum results per kind
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Token budget (default: search.token_budget)
    #[arg(long)]
    pub token_budget: Option<usize>,
}

pub async fn run_context(args: ContextArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service()?;
    let context = service
        .get_knowledge_context(&ctx.team, &args.query, args.limit, args.token_budget)
        .await?;

    if ctx.json() {
        return print_json(&serde_json::json!({ "context": context }));
    }

    print!("{}", context);
    Ok(())
}
