//! CLI module - Command definitions and handlers

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod add;
pub mod config;
pub mod decide;
pub mod edit;
pub mod extract;
pub mod init;
pub mod list;
pub mod pending;
pub mod propose;
pub mod search;
pub mod show;
pub mod stats;
pub mod utils;

pub use utils::{CliContext, OutputFormat};

/// teamfacts - team knowledge fact store
///
/// Atomic, versioned facts about a team's business, with hybrid retrieval
/// and conflict checks before anything is overwritten.
#[derive(Parser, Debug)]
#[command(name = "teamfacts")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, env = "TEAMFACTS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Team partition (default: user.team from config)
    #[arg(short, long, global = true, env = "TEAMFACTS_TEAM")]
    pub team: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new teamfacts directory
    Init(init::InitArgs),

    /// Add a fact directly, without a conflict check
    Add(add::AddArgs),

    /// Split free text into atomic facts and store the confident ones
    Extract(extract::ExtractArgs),

    /// Add a fact after checking it against existing knowledge
    Propose(propose::ProposeArgs),

    /// Facts waiting for confirmation
    Pending(pending::PendingArgs),

    /// Edit a fact in place
    Update(edit::UpdateArgs),

    /// Retire a fact
    Invalidate(edit::InvalidateArgs),

    /// List facts
    List(list::ListArgs),

    /// Show a fact and its history
    Show(show::ShowArgs),

    /// Search facts
    Search(search::SearchArgs),

    /// Search facts and decisions together
    Knowledge(search::KnowledgeArgs),

    /// Knowledge for a query, formatted for a prompt
    Context(search::ContextArgs),

    /// Record or list decisions
    Decide(decide::DecideArgs),

    /// Embed facts stored without a vector
    Backfill(stats::BackfillArgs),

    /// Show store statistics
    Stats(stats::StatsArgs),

    /// Get or set configuration
    Config(config::ConfigArgs),
}
