//! Logging initialization

use anyhow::{Context, Result};
use geoblock_core::config::LoggingConfig;
use std::path::Path;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::args::{Args, LogFormat};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Pick the log level: CLI flags first, then the config file
fn level(args: &Args, config: &LoggingConfig) -> Level {
    if args.quiet {
        return Level::ERROR;
    }
    match args.verbose {
        0 => Level::from_str(&config.level).unwrap_or(Level::INFO),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Initialize logging based on CLI arguments and the `[logging]` section
///
/// The returned guard flushes the log file on drop and must be held until exit.
pub fn init(args: &Args, config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = level(args, config);
    let format = args
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.format));

    // stdout is reserved for command output
    let console: BoxedLayer = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(args.verbose >= 2)
            .with_thread_ids(args.verbose >= 3)
            .with_file(args.verbose >= 3)
            .with_line_number(args.verbose >= 3)
            .with_filter(env_filter(level))
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(level))
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(level))
            .boxed(),
    };
    let mut layers = vec![console];

    let log_file = args.log_file.as_deref().or(config.file.as_deref());
    let guard = match log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = match format {
                LogFormat::Json => fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(env_filter(level))
                    .boxed(),
                LogFormat::Text | LogFormat::Compact => fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(env_filter(level))
                    .boxed(),
            };
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, name);
    Ok(tracing_appender::non_blocking(appender))
}
