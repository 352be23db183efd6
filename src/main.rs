//! rsx - Resilient search CLI
//!
//! Inspect circuit breakers, run health checks, and plan hybrid queries.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use resilient_search::Result;
use resilient_search::app::AppContext;
use resilient_search::cli::output;
use resilient_search::cli::{Cli, OutputFormat};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.plain {
        colored::control::set_override(false);
    }
    init_tracing(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.output_format() == OutputFormat::Json {
                let payload = serde_json::to_string_pretty(&output::json_error(&e)).unwrap_or_default();
                println!("{payload}");
            } else {
                let structured = e.to_structured();
                eprintln!("Error [{}]: {e}", structured.code.code_string());
                eprintln!("  hint: {}", structured.suggestion);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = AppContext::from_cli(cli)?;
    resilient_search::cli::commands::run(&ctx, &cli.command)
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn,resilient_search=info",
            1 => "info,resilient_search=debug",
            2 => "debug,resilient_search=trace",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.output_format() == OutputFormat::Json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
