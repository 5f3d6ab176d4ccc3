//! CLI utility functions
//!
//! Common helpers shared across CLI commands:
//! - Building a [`FactService`] from config
//! - Fact id parsing
//! - Table and JSON output

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use ulid::Ulid;

use crate::config::{AiProvider, Config};
use crate::core::embedding::HashingEmbedder;
use crate::core::fact::Fact;
use crate::core::pending::PendingStore;
use crate::core::search::ScoredFact;
use crate::core::service::FactService;
use crate::core::storage::Storage;
use crate::remote::AiClient;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

/// Everything a command needs besides its own arguments
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub team: String,
    pub format: OutputFormat,
}

impl CliContext {
    pub fn new(config: Config, config_path: Option<PathBuf>, team: Option<String>, format: OutputFormat) -> Self {
        let team = team
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| config.user.team.clone());

        Self {
            config,
            config_path,
            team,
            format,
        }
    }

    pub fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Name recorded on new facts and decisions
    pub fn user(&self) -> String {
        if !self.config.user.name.is_empty() {
            return self.config.user.name.clone();
        }
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "cli".to_string())
    }

    /// Open the store and wire the configured collaborators
    pub fn service(&self) -> Result<FactService> {
        open_service(&self.config)
    }
}

/// Open storage and pending store for `config` and attach collaborators
pub fn open_service(config: &Config) -> Result<FactService> {
    let db_path = config.database_path();
    if !db_path.exists() {
        bail!(
            "No database at {}. Run 'teamfacts init' first or set TEAMFACTS_DATABASE.",
            db_path.display()
        );
    }

    let storage = Storage::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let pending = PendingStore::open(&config.pending_path())?;

    let service = FactService::new(Arc::new(storage), Arc::new(pending), config.service_options());

    let service = match config.ai.provider {
        AiProvider::None => service,
        AiProvider::Local => service.with_embedder(Arc::new(HashingEmbedder::new(config.ai.embedding_dim))),
        AiProvider::Openai => {
            if config.ai.resolved_api_key().is_none() {
                tracing::warn!("ai.provider is openai but no API key is set");
            }
            let client = Arc::new(AiClient::from_config(&config.ai)?);
            service
                .with_embedder(client.clone())
                .with_extractor(client.clone())
                .with_judge(client)
        }
    };

    tracing::debug!(db = %db_path.display(), provider = ?config.ai.provider, "opened fact service");
    Ok(service)
}

/// Parse a fact id, with or without a `fact-` prefix
pub fn parse_fact_id(s: &str) -> Result<Ulid> {
    let trimmed = s.trim().trim_start_matches("fact-");
    Ulid::from_string(trimmed).map_err(|_| anyhow::anyhow!("Invalid fact ID: {}", s))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cut `s` to `max` characters, adding an ellipsis
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

#[derive(Tabled)]
struct FactRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Content")]
    content: String,
    #[tabled(rename = "Since")]
    since: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&Fact> for FactRow {
    fn from(fact: &Fact) -> Self {
        Self {
            id: fact.id.to_string(),
            category: fact.category.to_string(),
            content: truncate(&fact.content, 60),
            since: fact.valid_from.format("%Y-%m-%d").to_string(),
            status: status_label(fact),
        }
    }
}

#[derive(Tabled)]
struct HitRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Content")]
    content: String,
}

fn status_label(fact: &Fact) -> String {
    match (fact.valid_until, fact.superseded_by) {
        (None, _) => "active".to_string(),
        (Some(_), Some(by)) => format!("superseded by {}", &by.to_string()[..10]),
        (Some(until), None) => format!("invalid since {}", until.format("%Y-%m-%d")),
    }
}

pub fn fact_table(facts: &[Fact]) -> String {
    let rows: Vec<FactRow> = facts.iter().map(FactRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn hit_table(hits: &[ScoredFact]) -> String {
    let rows: Vec<HitRow> = hits
        .iter()
        .map(|h| HitRow {
            id: h.fact.id.to_string(),
            score: format!("{:.2}", h.score),
            mode: h.mode.to_string(),
            content: truncate(&h.fact.content, 60),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Multi-line detail view of one fact
pub fn print_fact(fact: &Fact) {
    let status = if fact.is_active() {
        status_label(fact).green()
    } else {
        status_label(fact).yellow()
    };

    println!("{} {}", fact.id.to_string().bold(), status);
    println!("  {}", fact.content);
    println!("  Category:   {}", fact.category);
    if let (Some(name), Some(attr)) = (&fact.entity_name, &fact.attribute) {
        println!(
            "  Subject:    {} / {} = {}",
            name,
            attr,
            fact.value.as_deref().unwrap_or("?")
        );
    }
    println!("  Confidence: {:.2}", fact.confidence_score);
    println!("  Source:     {}", fact.source.source_type);
    if !fact.created_by.is_empty() {
        println!("  Created by: {}", fact.created_by);
    }
    println!("  Valid from: {}", fact.valid_from.format("%Y-%m-%d %H:%M:%S"));
    if let Some(until) = fact.valid_until {
        println!("  Valid until: {}", until.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("  Embedded:   {}", if fact.has_embedding() { "yes" } else { "no" });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fact::NewFact;

    #[test]
    fn test_parse_fact_id() {
        let id = Ulid::new();
        assert_eq!(parse_fact_id(&id.to_string()).unwrap(), id);
        assert_eq!(parse_fact_id(&format!("fact-{}", id)).unwrap(), id);
        assert!(parse_fact_id("nope").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer sentence", 10), "a much ...");
    }

    #[test]
    fn test_team_falls_back_to_config() {
        let ctx = CliContext::new(Config::default(), None, None, OutputFormat::Pretty);
        assert_eq!(ctx.team, "default");

        let ctx = CliContext::new(Config::default(), None, Some("acme".into()), OutputFormat::Json);
        assert_eq!(ctx.team, "acme");
        assert!(ctx.json());
    }

    #[test]
    fn test_fact_table_lists_content() {
        let fact = Fact::from_new("acme", NewFact::new("We ship from Leeds"));
        let table = fact_table(&[fact]);
        assert!(table.contains("We ship from Leeds"));
        assert!(table.contains("active"));
    }
}
