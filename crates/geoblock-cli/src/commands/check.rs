//! Check command - evaluate addresses against the admission rules

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use geoblock_core::admission::{AdmissionEngine, Verdict};
use geoblock_core::config::Config;
use geoblock_core::geodb::{CountryLookup, GeoDatabaseManager};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Check command arguments
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Addresses to evaluate
    #[arg(required = true, value_name = "IP")]
    pub ips: Vec<String>,

    /// Country database file or directory
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Allow a country code (repeatable)
    #[arg(long = "allow-country", value_name = "CODE")]
    pub allow_countries: Vec<String>,

    /// Block a country code (repeatable)
    #[arg(long = "block-country", value_name = "CODE")]
    pub block_countries: Vec<String>,

    /// Allow a network (repeatable)
    #[arg(long = "allow-ip", value_name = "CIDR")]
    pub allow_ips: Vec<String>,

    /// Block a network (repeatable)
    #[arg(long = "block-ip", value_name = "CIDR")]
    pub block_ips: Vec<String>,

    /// Allow addresses no rule matches
    #[arg(long)]
    pub default_allow: bool,

    /// Deny private and loopback addresses
    #[arg(long)]
    pub deny_private: bool,

    /// Print one JSON object per address
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct CheckLine<'a> {
    ip: &'a str,
    #[serde(flatten)]
    verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckArgs {
    /// Apply command-line overrides on top of the loaded config
    fn apply(&self, mut config: Config) -> Config {
        let filter = &mut config.filter;
        filter.allowed_countries.extend(self.allow_countries.iter().cloned());
        filter.blocked_countries.extend(self.block_countries.iter().cloned());
        filter.allowed_ip_blocks.extend(self.allow_ips.iter().cloned());
        filter.blocked_ip_blocks.extend(self.block_ips.iter().cloned());
        if self.default_allow {
            filter.default_allow = true;
        }
        if self.deny_private {
            filter.allow_private = false;
        }

        if let Some(db) = &self.db {
            config.database.file_path = db.clone();
        }
        // one-shot command, no background refresh
        config.database.auto_update = false;
        config
    }
}

/// Execute check command
pub fn execute(args: CheckArgs, config: Config) -> Result<()> {
    let config = args.apply(config);
    config.validate().context("Invalid configuration")?;

    let manager = GeoDatabaseManager::new(config.database.clone())
        .context("Failed to open country database")?;
    let geo: Arc<dyn CountryLookup> = manager.clone();
    let engine = AdmissionEngine::from_config(&config.filter, geo);

    if !args.json {
        println!(
            "Database: {} ({})",
            manager.current().path().display().to_string().cyan(),
            manager.version()
        );
        println!("{}", "─".repeat(60).bright_black());
    }

    for ip in &args.ips {
        let result = engine.check(ip);
        if args.json {
            let line = match result {
                Ok(verdict) => CheckLine {
                    ip,
                    verdict: Some(verdict),
                    error: None,
                },
                Err(e) => CheckLine {
                    ip,
                    verdict: None,
                    error: Some(e.to_string()),
                },
            };
            println!("{}", serde_json::to_string(&line).context("Failed to encode result")?);
            continue;
        }

        match result {
            Ok(verdict) => {
                let status = if verdict.allowed {
                    "ALLOW".green().bold()
                } else {
                    "DENY".red().bold()
                };
                println!(
                    "{:<40} {:<6} country={:<8} phase={}",
                    ip,
                    status,
                    verdict.country.as_deref().unwrap_or("-"),
                    verdict.phase
                );
            }
            Err(e) => {
                let policy = if engine.policy().ban_on_error {
                    "DENY".red().bold()
                } else {
                    "SKIP".yellow().bold()
                };
                println!("{ip:<40} {policy:<6} error: {e}");
            }
        }
    }

    manager.shutdown();
    Ok(())
}
