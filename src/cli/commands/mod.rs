//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::Result;

pub mod breakers;
pub mod config;
pub mod health;
pub mod query;
pub mod status;

pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Query(args) => query::run(ctx, args),
        Commands::Breakers(args) => breakers::run(ctx, args),
        Commands::Health(args) => health::run(ctx, args),
        Commands::Status(args) => status::run(ctx, args),
        Commands::Config(args) => config::run(ctx, args),
    }
}
