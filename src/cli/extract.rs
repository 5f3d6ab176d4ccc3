//! `teamfacts extract` command
//!
//! Splits free text into atomic facts and stores the confident ones.
//!
//! # Usage
//! ```bash
//! teamfacts extract "We ship from Leeds. Payroll runs every Friday."
//! teamfacts extract -f meeting-notes.txt --source conversation --source-id standup-12
//! teamfacts extract "Every Friday" --question "When does payroll run?"
//! ```

use std::fs;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use super::utils::{fact_table, print_json};
use super::CliContext;
use crate::core::fact::{FactSource, SourceType};

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Text to split into facts
    pub text: Option<String>,

    /// Read text from file
    #[arg(short = 'f', long)]
    pub file: Option<String>,

    /// Question the text answers, kept with each fact
    #[arg(short, long)]
    pub question: Option<String>,

    /// Where the text came from
    #[arg(long, default_value = "conversation")]
    pub source: SourceType,

    /// Id in the source system
    #[arg(long)]
    pub source_id: Option<String>,
}

pub async fn run(args: ExtractArgs, ctx: &CliContext) -> Result<()> {
    let text = match (&args.file, &args.text) {
        (Some(path), _) => fs::read_to_string(path)?,
        (None, Some(text)) => text.clone(),
        (None, None) => bail!("Text is required. Pass it as an argument or use --file."),
    };

    let service = ctx.service()?;
    let report = service
        .create_atomic_facts(
            &ctx.team,
            &text,
            FactSource::new(args.source, args.source_id.clone()),
            args.question.as_deref(),
            &ctx.user(),
        )
        .await?;

    if ctx.json() {
        return print_json(&report);
    }

    if report.extractor_degraded {
        println!(
            "{} Extractor unavailable; the whole text was considered as one low-confidence fact.",
            "!".yellow()
        );
    }

    if report.created.is_empty() {
        println!("No facts stored.");
    } else {
        println!("{} Stored {} fact(s):", "✓".green(), report.created.len());
        println!("{}", fact_table(&report.created));
    }

    if report.skipped_low_confidence > 0 {
        println!(
            "   {} candidate(s) below confidence {:.2} skipped",
            report.skipped_low_confidence,
            service.options().min_confidence
        );
    }
    for err in &report.errors {
        println!("   {} {}: {}", "✗".red(), err.statement, err.error);
    }

    Ok(())
}
