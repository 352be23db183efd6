//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use output::OutputFormat;

pub mod commands;
pub mod output;

/// Resilient search - circuit breakers, failure triage and hybrid query planning
#[derive(Parser, Debug)]
#[command(name = "rsx")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (human, json)
    #[arg(long, short = 'O', global = true, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Machine-readable JSON output (shorthand for --output-format=json)
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colors
    #[arg(long, global = true)]
    pub plain: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all logging except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (replaces ~/.config/rsx/config.toml and <root>/config.toml)
    #[arg(long, global = true, env = "RSX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project state directory (default: .rsx)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Effective output format. `--json` wins over `--output-format`.
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            return OutputFormat::Json;
        }
        self.output_format.unwrap_or_default()
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile search text into a hybrid (or degraded lexical) SQL query
    Query(commands::query::QueryArgs),

    /// Inspect and reset circuit breakers
    Breakers(commands::breakers::BreakersArgs),

    /// Run health checks
    Health(commands::health::HealthArgs),

    /// Summarize degraded features from current breaker state
    Status(commands::status::StatusArgs),

    /// Show or edit configuration
    Config(commands::config::ConfigArgs),
}
