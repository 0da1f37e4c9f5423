//! Country database commands
//!
//! Inspect database headers, find and download dated databases, and watch
//! a manager refresh in the background.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use geoblock_core::config::{Config, DatabaseConfig, DEFAULT_DATABASE_FILE};
use geoblock_core::geodb::files::search_file;
use geoblock_core::geodb::header::{read_header, DbHeader};
use geoblock_core::geodb::update::{self, UpdateOutcome};
use geoblock_core::geodb::GeoDatabaseManager;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Database command arguments
#[derive(Args, Debug)]
pub struct DbArgs {
    #[command(subcommand)]
    pub action: DbAction,
}

/// Database subcommands
#[derive(Subcommand, Debug)]
pub enum DbAction {
    /// Print the parsed header of a database file
    Info {
        /// Database file or directory (default: database.file_path)
        path: Option<PathBuf>,
    },

    /// Show the newest dated database in a directory
    Latest {
        /// Auto-update directory (default: database.auto_update_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Product code
        #[arg(long)]
        code: Option<String>,
    },

    /// Download and install a fresh database once
    Update {
        /// Auto-update directory (default: database.auto_update_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Download token
        #[arg(long, env = "IP2LOCATION_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Product code
        #[arg(long)]
        code: Option<String>,

        /// Download URL override
        #[arg(long)]
        url: Option<String>,
    },

    /// Run a refreshing manager until interrupted
    Watch {
        /// Auto-update directory (default: database.auto_update_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Seconds between refresh checks
        #[arg(long)]
        interval: Option<u64>,
    },
}

/// Execute database command
pub fn execute(args: DbArgs, config: Config) -> Result<()> {
    let db = config.database;
    match args.action {
        DbAction::Info { path } => show_info(path.as_deref().unwrap_or(&db.file_path)),
        DbAction::Latest { dir, code } => {
            let db = override_dir(db, dir, code)?;
            show_latest(&db)
        }
        DbAction::Update {
            dir,
            token,
            code,
            url,
        } => {
            let mut db = override_dir(db, dir, code)?;
            if token.is_some() {
                db.auto_update_token = token;
            }
            if url.is_some() {
                db.download_url = url;
            }
            run_update(&db)
        }
        DbAction::Watch { dir, interval } => {
            let mut db = override_dir(db, dir, None)?;
            if let Some(secs) = interval {
                db.refresh_interval_secs = secs;
            }
            db.auto_update = true;
            watch(db)
        }
    }
}

fn override_dir(
    mut db: DatabaseConfig,
    dir: Option<PathBuf>,
    code: Option<String>,
) -> Result<DatabaseConfig> {
    if dir.is_some() {
        db.auto_update_dir = dir;
    }
    if let Some(code) = code {
        db.product_code = code;
    }
    if db.auto_update_dir.is_none() {
        anyhow::bail!("No auto-update directory; pass --dir or set database.auto_update_dir");
    }
    Ok(db)
}

/// Header fields as aligned label/value pairs
fn header_lines(header: &DbHeader) -> Vec<(&'static str, String)> {
    vec![
        ("Version", header.version.to_string()),
        ("Database type", header.db_type.to_string()),
        ("Columns", header.columns.to_string()),
        ("IPv4 rows", header.ipv4_count.to_string()),
        ("IPv6 rows", header.ipv6_count.to_string()),
        (
            "IPv4 index",
            if header.ipv4_index_base > 0 { "yes" } else { "no" }.to_string(),
        ),
        (
            "IPv6 index",
            if header.ipv6_index_base > 0 { "yes" } else { "no" }.to_string(),
        ),
        ("Product code", header.product_code.to_string()),
        ("License code", header.license_code.to_string()),
        ("Size class", header.database_size.to_string()),
    ]
}

fn show_info(path: &Path) -> Result<()> {
    let file = search_file(path, DEFAULT_DATABASE_FILE)
        .with_context(|| format!("No database found at {}", path.display()))?;
    let header = read_header(&file)
        .with_context(|| format!("Failed to read database header: {}", file.display()))?;

    println!("{}", "═".repeat(50).bright_blue());
    println!("{}", " Country Database".bright_white().bold());
    println!("{}", "═".repeat(50).bright_blue());
    println!("File: {}", file.display().to_string().cyan());
    for (label, value) in header_lines(&header) {
        println!("  {label:<14} {value}");
    }
    if let Some(date) = header.version.date() {
        let age = (today() - date).num_days();
        let age_str = format!("{age} days");
        let age_str = if age > update::WARN_AFTER_DAYS {
            age_str.red()
        } else if age > update::UPDATE_AFTER_DAYS {
            age_str.yellow()
        } else {
            age_str.green()
        };
        println!("  {:<14} {age_str}", "Age");
    }
    println!("{}", "═".repeat(50).bright_blue());
    Ok(())
}

fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

fn show_latest(db: &DatabaseConfig) -> Result<()> {
    let dir = auto_update_dir(db)?;
    let latest = update::find_latest_database(dir, &db.product_code)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;

    match latest {
        Some(path) => {
            println!("{} {}", "●".green(), path.display());
            if update::needs_update(Some(&path), today()) {
                println!("  {}", "older than 30 days, an update is due".yellow());
            }
        }
        None => {
            println!(
                "{} No {} databases in {}",
                "✗".red(),
                db.product_code,
                dir.display()
            );
        }
    }
    Ok(())
}

fn auto_update_dir(db: &DatabaseConfig) -> Result<&Path> {
    db.auto_update_dir
        .as_deref()
        .context("No auto-update directory configured")
}

fn run_update(db: &DatabaseConfig) -> Result<()> {
    match update::download_database(db).context("Database update failed")? {
        UpdateOutcome::Installed(path) => {
            println!("{} Installed {}", "✓".green(), path.display());
        }
        UpdateOutcome::Locked => {
            println!(
                "{} Another update holds the lock in {}",
                "!".yellow(),
                auto_update_dir(db)?.display()
            );
        }
    }
    Ok(())
}

fn watch(db: DatabaseConfig) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let manager = GeoDatabaseManager::new(db).context("Failed to start database manager")?;
    let mut version = manager.version();
    info!(
        path = %manager.current().path().display(),
        %version,
        interval_secs = manager.config().refresh_interval_secs,
        "Watching country database, press Ctrl-C to stop"
    );

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(500));
        let current = manager.version();
        if current != version {
            println!("{} {} -> {}", "↻".cyan(), version, current);
            version = current;
        }
    }

    manager.shutdown();
    info!("Stopped watching");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_dir_requires_directory() {
        assert!(override_dir(DatabaseConfig::default(), None, None).is_err());

        let db = override_dir(
            DatabaseConfig::default(),
            Some(PathBuf::from("/var/lib/geoblock")),
            Some("DB3".to_string()),
        )
        .unwrap();
        assert_eq!(db.auto_update_dir, Some(PathBuf::from("/var/lib/geoblock")));
        assert_eq!(db.product_code, "DB3");
    }

    #[test]
    fn test_show_latest_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseConfig {
            auto_update_dir: Some(dir.path().join("updates")),
            ..DatabaseConfig::default()
        };
        show_latest(&db).unwrap();
        assert!(dir.path().join("updates").is_dir());
    }
}
