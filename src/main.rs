//! teamfacts CLI - Entry point
//!
//! Usage: teamfacts <command> [options]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use teamfacts::cli::{self, Cli, CliContext, Commands};
use teamfacts::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose picks debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        // init must work even when the file it is about to write is broken or missing
        Err(e) if matches!(cli.command, Commands::Init(_)) => {
            tracing::warn!(error = %e, "ignoring unreadable config during init");
            Config::default()
        }
        Err(e) => return Err(e),
    };
    let ctx = CliContext::new(config, cli.config.clone(), cli.team.clone(), cli.format);

    match cli.command {
        Commands::Init(args) => cli::init::run(args, &ctx),
        Commands::Add(args) => cli::add::run(args, &ctx).await,
        Commands::Extract(args) => cli::extract::run(args, &ctx).await,
        Commands::Propose(args) => cli::propose::run(args, &ctx).await,
        Commands::Pending(args) => cli::pending::execute(args, &ctx).await,
        Commands::Update(args) => cli::edit::run_update(args, &ctx).await,
        Commands::Invalidate(args) => cli::edit::run_invalidate(args, &ctx),
        Commands::List(args) => cli::list::run(args, &ctx),
        Commands::Show(args) => cli::show::run(args, &ctx),
        Commands::Search(args) => cli::search::run(args, &ctx).await,
        Commands::Knowledge(args) => cli::search::run_knowledge(args, &ctx).await,
        Commands::Context(args) => cli::search::run_context(args, &ctx).await,
        Commands::Decide(args) => cli::decide::run(args, &ctx),
        Commands::Backfill(args) => cli::stats::run_backfill(args, &ctx).await,
        Commands::Stats(args) => cli::stats::execute(args, &ctx),
        Commands::Config(args) => cli::config::run(args, &ctx),
    }
}
