mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{apply, check, rebase, squash, ApplyArgs, CheckArgs, RebaseArgs, SquashArgs};
use config::Config;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Folio CLI - apply, squash and rebase document transactions
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ./folio.config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate document files
    Check(CheckArgs),

    /// Apply transactions to a document
    Apply(ApplyArgs),

    /// Squash a sequence of transactions into one
    Squash(SquashArgs),

    /// Rebase an uncommitted change over history
    Rebase(RebaseArgs),
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Cannot get current directory")?;
    let config = Config::load(&cwd, cli.config.as_deref())
        .context("Failed to load configuration")?;
    debug!(
        node_types = config.node_types.len(),
        undo_levels = config.undo_levels,
        "Configuration loaded"
    );

    match cli.command {
        Command::Check(args) => check(args, &config),
        Command::Apply(args) => apply(args, &config),
        Command::Squash(args) => squash(args, &config),
        Command::Rebase(args) => rebase(args, &config),
    }
}

fn main() {
    setup_tracing();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
