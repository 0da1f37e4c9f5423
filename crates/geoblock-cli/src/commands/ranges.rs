//! CIDR block list commands

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use geoblock_core::config::Config;
use geoblock_core::RangeSet;
use std::net::IpAddr;
use std::path::PathBuf;

/// Ranges command arguments
#[derive(Args, Debug)]
pub struct RangesArgs {
    #[command(subcommand)]
    pub command: RangesCommands,
}

/// Where entries come from
#[derive(Args, Debug, Clone)]
pub struct RangeSource {
    /// Network entry (repeatable)
    #[arg(long = "cidr", value_name = "CIDR")]
    pub cidrs: Vec<String>,

    /// Directory of .txt block lists
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Use the configured blocked networks instead of the allowed ones
    #[arg(long)]
    pub blocked: bool,
}

/// Ranges subcommands
#[derive(Subcommand, Debug)]
pub enum RangesCommands {
    /// Load entries and show how many were accepted
    List {
        #[command(flatten)]
        source: RangeSource,
    },

    /// Show the most specific matching prefix for an address
    Check {
        /// Address to look up
        ip: IpAddr,

        #[command(flatten)]
        source: RangeSource,
    },
}

/// Execute ranges command
pub fn execute(args: RangesArgs, config: &Config) -> Result<()> {
    match args.command {
        RangesCommands::List { source } => list(&source, config),
        RangesCommands::Check { ip, source } => check(ip, &source, config),
    }
}

/// Entries from the command line, or from the config when none are given
fn load(source: &RangeSource, config: &Config) -> Result<(RangeSet, String)> {
    if let Some(dir) = &source.dir {
        if !dir.is_dir() {
            anyhow::bail!("Not a directory: {}", dir.display());
        }
    }

    if !source.cidrs.is_empty() || source.dir.is_some() {
        let set = RangeSet::load(&source.cidrs, source.dir.as_deref());
        return Ok((set, "command line".to_string()));
    }

    let filter = &config.filter;
    let (cidrs, dir, label) = if source.blocked {
        (&filter.blocked_ip_blocks, &filter.blocked_ip_blocks_dir, "blocked_ip_blocks")
    } else {
        (&filter.allowed_ip_blocks, &filter.allowed_ip_blocks_dir, "allowed_ip_blocks")
    };
    Ok((RangeSet::load(cidrs, dir.as_deref()), format!("config {label}")))
}

fn list(source: &RangeSource, config: &Config) -> Result<()> {
    let (set, origin) = load(source, config).context("Failed to load networks")?;

    println!("{}", "═".repeat(50).bright_blue());
    println!("{}", " Network Set".bright_white().bold());
    println!("{}", "═".repeat(50).bright_blue());
    println!("Source: {}", origin.cyan());
    if let Some(dir) = &source.dir {
        println!("Directory: {}", dir.display());
    }
    println!("Entries: {}", set.len().to_string().green());
    println!("{}", "═".repeat(50).bright_blue());
    Ok(())
}

fn check(ip: IpAddr, source: &RangeSource, config: &Config) -> Result<()> {
    let (set, origin) = load(source, config).context("Failed to load networks")?;

    println!("{}", "─".repeat(50).bright_black());
    println!("Address: {}", ip.to_string().cyan());
    println!("Source: {origin} ({} entries)", set.len());
    match set.longest_match(ip) {
        Some(prefix) => println!("Match: {} (/{prefix})", "Yes".green()),
        None => println!("Match: {}", "No".yellow()),
    }
    println!("{}", "─".repeat(50).bright_black());
    Ok(())
}
