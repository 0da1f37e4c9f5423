//! Configuration management for geoblock
//!
//! Provides a strongly-typed configuration system with TOML support.
//! Every section has documented defaults, so a partial file is valid.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default database file name, also used when searching directories
pub const DEFAULT_DATABASE_FILE: &str = "IP2LOCATION-LITE-DB1.IPV6.BIN";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Admission rules and request handling
    pub filter: FilterConfig,

    /// Denial response settings
    pub response: ResponseConfig,

    /// Country database location and refresh
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        self.response.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Which of the extracted client addresses are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IpHeaderStrategy {
    /// Evaluate every address in the chain
    #[default]
    CheckAll,
    /// Evaluate only the first address
    CheckFirst,
    /// Evaluate the first public address, falling back to the first one
    CheckFirstNonPrivate,
}

impl IpHeaderStrategy {
    /// Configuration spelling
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckAll => "check-all",
            Self::CheckFirst => "check-first",
            Self::CheckFirstNonPrivate => "check-first-non-private",
        }
    }
}

impl fmt::Display for IpHeaderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpHeaderStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "checkall" => Ok(Self::CheckAll),
            "checkfirst" => Ok(Self::CheckFirst),
            "checkfirstnonprivate" | "checkfirstnoneprivate" => Ok(Self::CheckFirstNonPrivate),
            _ => Err(Error::config_value(
                "filter.ip_header_strategy",
                format!("invalid IP header strategy '{s}'"),
            )),
        }
    }
}

impl Serialize for IpHeaderStrategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IpHeaderStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            serde::de::Error::custom(format!("invalid IP header strategy '{s}'"))
        })
    }
}

/// Admission rules and request handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Evaluate requests at all
    pub enabled: bool,
    /// Verdict when no rule decides
    pub default_allow: bool,
    /// Verdict for private and loopback addresses
    pub allow_private: bool,
    /// Deny when an address cannot be evaluated
    pub ban_on_error: bool,
    /// Country codes that are always allowed
    pub allowed_countries: Vec<String>,
    /// Country codes that are always denied
    pub blocked_countries: Vec<String>,
    /// Allowed networks
    pub allowed_ip_blocks: Vec<String>,
    /// Denied networks
    pub blocked_ip_blocks: Vec<String>,
    /// Directory of `.txt` files with allowed networks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_ip_blocks_dir: Option<PathBuf>,
    /// Directory of `.txt` files with denied networks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_ip_blocks_dir: Option<PathBuf>,
    /// Headers holding client addresses, in priority order
    ///
    /// The name `remoteAddress` refers to the connection peer.
    pub ip_headers: Vec<String>,
    /// Which extracted addresses are evaluated
    pub ip_header_strategy: IpHeaderStrategy,
    /// Header/value pairs that skip blocking
    pub bypass_headers: BTreeMap<String, String>,
    /// HTTP methods that skip blocking
    pub ignore_verbs: Vec<String>,
    /// Header to carry the resolved country downstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_header: Option<String>,
    /// Log every denied request
    pub log_banned_requests: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_allow: false,
            allow_private: true,
            ban_on_error: true,
            allowed_countries: Vec::new(),
            blocked_countries: Vec::new(),
            allowed_ip_blocks: Vec::new(),
            blocked_ip_blocks: Vec::new(),
            allowed_ip_blocks_dir: None,
            blocked_ip_blocks_dir: None,
            ip_headers: vec!["x-forwarded-for".to_string(), "x-real-ip".to_string()],
            ip_header_strategy: IpHeaderStrategy::CheckAll,
            bypass_headers: BTreeMap::new(),
            ignore_verbs: Vec::new(),
            country_header: None,
            log_banned_requests: true,
        }
    }
}

impl FilterConfig {
    /// Configured country header, `None` when unset or blank
    pub fn country_header(&self) -> Option<&str> {
        self.country_header
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.ip_headers.iter().all(|h| h.trim().is_empty()) {
            return Err(Error::config_value(
                "filter.ip_headers",
                "At least one header name is required",
            ));
        }
        if let Some(header) = self.country_header() {
            if http::HeaderName::from_bytes(header.as_bytes()).is_err() {
                return Err(Error::config_value(
                    "filter.country_header",
                    format!("'{header}' is not a valid header name"),
                ));
            }
        }
        Ok(())
    }
}

/// Denial response settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Status code for denied requests
    pub status_code: u16,
    /// HTML page returned with denials, `{{.IP}}` and `{{.Country}}` are substituted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_html_file: Option<PathBuf>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status_code: 403,
            ban_html_file: None,
        }
    }
}

impl ResponseConfig {
    fn validate(&self) -> Result<()> {
        let valid = http::StatusCode::from_u16(self.status_code)
            .map(|s| s.canonical_reason().is_some())
            .unwrap_or(false);
        if !valid {
            return Err(Error::config_value(
                "response.status_code",
                format!("{} is not a valid HTTP status code", self.status_code),
            ));
        }
        Ok(())
    }
}

/// Country database location and refresh
///
/// Two managers are shared exactly when their `DatabaseConfig` values are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file, or a directory searched for the default file name
    pub file_path: PathBuf,
    /// Download and hot-swap newer databases in the background
    pub auto_update: bool,
    /// Directory holding dated databases
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_update_dir: Option<PathBuf>,
    /// Download token, the free LITE URL is used without one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_update_token: Option<String>,
    /// Product code such as `DB1`
    pub product_code: String,
    /// Override of the download URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Where private working copies are written, defaults to the temp dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_copy_dir: Option<PathBuf>,
    /// Seconds between refresh checks
    pub refresh_interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            auto_update: false,
            auto_update_dir: None,
            auto_update_token: None,
            product_code: "DB1".to_string(),
            download_url: None,
            local_copy_dir: None,
            refresh_interval_secs: 24 * 60 * 60,
        }
    }
}

impl DatabaseConfig {
    /// Database config reading a single file
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: path.into(),
            ..Self::default()
        }
    }

    /// Validate the database settings
    pub fn validate(&self) -> Result<()> {
        if self.auto_update && self.auto_update_dir.is_none() {
            return Err(Error::config_value(
                "database.auto_update_dir",
                "Required when auto_update is enabled",
            ));
        }
        if self.product_code.trim().is_empty() {
            return Err(Error::config_value(
                "database.product_code",
                "Must not be empty",
            ));
        }
        if self.refresh_interval_secs == 0 {
            return Err(Error::config_value(
                "database.refresh_interval_secs",
                "Must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (text, json, compact)
    pub format: String,
    /// Log file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        if !matches!(
            self.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(Error::config_value(
                "logging.level",
                format!("Unknown level '{}'", self.level),
            ));
        }
        if !matches!(self.format.to_ascii_lowercase().as_str(), "text" | "json" | "compact") {
            return Err(Error::config_value(
                "logging.format",
                format!("Unknown format '{}'", self.format),
            ));
        }
        Ok(())
    }
}
