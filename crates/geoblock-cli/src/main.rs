//! geoblock CLI
//!
//! Command-line front end for the country and network admission filter.

mod args;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use args::Args;

fn main() -> Result<()> {
    let args = Args::parse();

    let config = commands::config::load(args.config.as_deref())?;
    let _guard = logging::init(&args, &config.logging)?;

    let result = run(args, config);

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
    }

    result
}

fn run(args: Args, config: geoblock_core::Config) -> Result<()> {
    use commands::Command;

    match args.command {
        Command::Check(check_args) => commands::check::execute(check_args, config),
        Command::Simulate(sim_args) => commands::simulate::execute(sim_args, config),
        Command::Db(db_args) => commands::db::execute(db_args, config),
        Command::Ranges(ranges_args) => commands::ranges::execute(ranges_args, &config),
        Command::Config(config_args) => {
            commands::config::execute(config_args, args.config.as_deref())
        }
        Command::Completions(comp_args) => commands::completions::execute(comp_args),
    }
}
