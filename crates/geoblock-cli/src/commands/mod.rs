//! CLI commands

pub mod check;
pub mod completions;
pub mod config;
pub mod db;
pub mod ranges;
pub mod simulate;

use clap::Subcommand;

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate addresses against the admission rules
    Check(check::CheckArgs),

    /// Run a synthetic request through the full filter
    Simulate(simulate::SimulateArgs),

    /// Country database inspection and updates
    Db(db::DbArgs),

    /// CIDR block list inspection
    Ranges(ranges::RangesArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}
