//! Config command - configuration management

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use geoblock_core::config::Config;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File names searched in the working directory
const LOCAL_CONFIG_FILES: [&str; 2] = ["geoblock.toml", "config.toml"];

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Config file to show (default: detect)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with defaults
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "geoblock.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Config file to validate
        file: PathBuf,
    },

    /// Show config file locations
    Paths,
}

/// Execute config command
pub fn execute(args: ConfigArgs, global: Option<&Path>) -> Result<()> {
    match args.action {
        ConfigAction::Show { file } => show_config(file.as_deref().or(global)),
        ConfigAction::Generate { output, force } => generate_config(&output, force),
        ConfigAction::Validate { file } => validate_config(&file),
        ConfigAction::Paths => show_paths(),
    }
}

/// Load the config from `explicit`, a discovered file, or defaults
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration");
            Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

fn show_config(file: Option<&Path>) -> Result<()> {
    let config = load(file)?;
    let toml_str = config.to_toml().context("Failed to serialize config")?;
    println!("{toml_str}");
    Ok(())
}

fn generate_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite",
            output.display()
        );
    }

    let toml_str = Config::default()
        .to_toml()
        .context("Failed to serialize config")?;

    let content = format!(
        "# geoblock configuration\n\
         # Every key is optional; omitted keys use the values below.\n\
         # Set filter.country_header to forward the resolved country downstream.\n\n\
         {toml_str}"
    );

    std::fs::write(output, content)
        .with_context(|| format!("Failed to write config to {}", output.display()))?;

    info!(path = %output.display(), "Generated config file");
    println!("{} Configuration file generated: {}", "✓".green(), output.display());
    Ok(())
}

fn validate_config(file: &Path) -> Result<()> {
    let config = Config::load(file)
        .with_context(|| format!("Failed to load config from {}", file.display()))?;

    config.validate().context("Configuration validation failed")?;

    let filter = &config.filter;
    println!("{} Configuration is valid", "✓".green());
    println!("  Filter enabled: {}", filter.enabled);
    println!("  Default allow: {}", filter.default_allow);
    println!(
        "  Countries: {} allowed, {} blocked",
        filter.allowed_countries.len(),
        filter.blocked_countries.len()
    );
    println!(
        "  IP blocks: {} allowed, {} blocked",
        filter.allowed_ip_blocks.len(),
        filter.blocked_ip_blocks.len()
    );
    println!("  Header strategy: {}", filter.ip_header_strategy);
    println!("  Database: {}", config.database.file_path.display());
    println!("  Auto-update: {}", config.database.auto_update);

    Ok(())
}

fn show_paths() -> Result<()> {
    println!("Configuration file search paths:");
    println!();

    for (i, name) in LOCAL_CONFIG_FILES.iter().enumerate() {
        println!("  {}. ./{name}", i + 1);
    }
    if let Some(path) = user_config_file() {
        println!("  {}. {}", LOCAL_CONFIG_FILES.len() + 1, path.display());
    }

    println!();
    println!("The GEOBLOCK_CONFIG environment variable or -c/--config overrides the search.");
    Ok(())
}

fn user_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "geoblock").map(|d| d.config_dir().join("config.toml"))
}

fn find_config_file() -> Option<PathBuf> {
    LOCAL_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .chain(user_config_file())
        .find(|path| path.is_file())
}
