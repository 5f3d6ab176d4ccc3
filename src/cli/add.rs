//! `teamfacts add` command
//!
//! Stores a fact as-is. Use `propose` to check it against existing
//! knowledge first.
//!
//! # Usage
//! ```bash
//! teamfacts add "We ship from Leeds" --category manufacturing
//! teamfacts add "Launch is March 22" --entity "Dungeon Crawlers" --attribute "launch date" --value 2025-03-22
//! teamfacts add -f note.txt --source integration --source-id jira-42
//! ```

use std::fs;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use super::utils::print_json;
use super::CliContext;
use crate::core::fact::{Category, FactSource, NewFact, SourceType};

/// Fields shared by `add` and `propose`
#[derive(Args, Debug, Clone)]
pub struct FactInput {
    /// The statement to store
    pub content: Option<String>,

    /// Read content from file
    #[arg(short = 'f', long)]
    pub file: Option<String>,

    /// Category (product, manufacturing, marketing, sales, finance, people, faq, general)
    #[arg(short = 'C', long, default_value = "general")]
    pub category: Category,

    /// Entity kind (e.g. product, person)
    #[arg(long)]
    pub entity_type: Option<String>,

    /// Entity the fact is about
    #[arg(long)]
    pub entity: Option<String>,

    /// Attribute of the entity
    #[arg(long)]
    pub attribute: Option<String>,

    /// Value of the attribute
    #[arg(long)]
    pub value: Option<String>,

    /// Confidence (0.0-1.0)
    #[arg(long, default_value = "1.0")]
    pub confidence: f32,

    /// Where the fact came from (manual, conversation, team_answer, integration)
    #[arg(long, default_value = "manual")]
    pub source: SourceType,

    /// Id in the source system
    #[arg(long)]
    pub source_id: Option<String>,
}

impl FactInput {
    pub fn to_new_fact(&self, created_by: String) -> Result<NewFact> {
        let content = match (&self.file, &self.content) {
            (Some(path), _) => fs::read_to_string(path)?,
            (None, Some(content)) => content.clone(),
            (None, None) => bail!("Content is required. Pass it as an argument or use --file."),
        };

        let mut new = NewFact::new(content.trim())
            .with_category(self.category)
            .with_confidence(self.confidence)
            .with_source(FactSource::new(self.source, self.source_id.clone()))
            .with_created_by(created_by);
        new.entity_type = self.entity_type.clone();
        new.entity_name = self.entity.clone();
        new.attribute = self.attribute.clone();
        new.value = self.value.clone();

        Ok(new)
    }
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[command(flatten)]
    pub fact: FactInput,
}

pub async fn run(args: AddArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.service()?;
    let new = args.fact.to_new_fact(ctx.user())?;

    let fact = service.create_fact(&ctx.team, new).await?;

    if ctx.json() {
        return print_json(&fact);
    }

    println!("{} Fact added: {}", "✓".green(), fact.id);
    println!("   Team:     {}", fact.team_id);
    println!("   Category: {}", fact.category);
    if !fact.has_embedding() {
        println!("   {}", "(stored without embedding)".dimmed());
    }

    Ok(())
}
