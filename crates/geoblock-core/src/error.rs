//! Error types for geoblock-core
//!
//! Centralized error handling using `thiserror` for ergonomic error definitions.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for geoblock-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// CIDR string could not be parsed
    #[error("Invalid CIDR: {cidr}")]
    InvalidCidr {
        /// The offending input
        cidr: String,
    },

    /// Invalid IP address
    #[error("Invalid IP address: {addr}")]
    InvalidIpAddr {
        /// The invalid address
        addr: String,
    },

    /// No usable country database could be opened
    #[error("Country database unavailable: {reason}")]
    DatabaseUnavailable {
        /// Why resolution or opening failed
        reason: String,
    },

    /// Database header is truncated or carries a zero product code
    #[error("Invalid database header in '{path}': {message}")]
    InvalidHeader {
        /// File the header was read from
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Auto-update file name does not start with a valid YYYYMMDD date
    #[error("Invalid date in database file name '{name}'")]
    InvalidFileDate {
        /// The file name that failed to parse
        name: String,
    },

    /// Country lookup failed for an address
    #[error("Country lookup failed for {ip}: {message}")]
    Lookup {
        /// Address being looked up
        ip: String,
        /// Error message
        message: String,
    },

    /// Database download failed
    #[error("Download from '{url}' failed: {message}")]
    Download {
        /// URL that was requested, token redacted
        url: String,
        /// Error message
        message: String,
    },

    /// Database archive could not be extracted
    #[error("Archive error: {0}")]
    Archive(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// Path to the missing config file
        path: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    ConfigValue {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a config value error
    pub fn config_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a lookup error
    pub fn lookup(ip: impl ToString, message: impl Into<String>) -> Self {
        Self::Lookup {
            ip: ip.to_string(),
            message: message.into(),
        }
    }

    /// Create a header error for a file
    pub fn invalid_header(path: &Path, message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a database unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::DatabaseUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a download error
    pub fn download(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Download {
            url: url.into(),
            message: message.to_string(),
        }
    }
}
