//! Admission decisions for a single client address
//!
//! Rules are evaluated in a fixed order and the first one that applies wins:
//! private networks, explicit network rules, country rules, then the default.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::trace;

use crate::config::FilterConfig;
use crate::error::{Error, Result};
use crate::geodb::CountryLookup;
use crate::ranges::RangeSet;

/// Country reported for private and loopback addresses
pub const PRIVATE_COUNTRY: &str = "PRIVATE";

/// Country reported when an address could not be evaluated
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// The rule that produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Private or loopback address
    AllowPrivate,
    /// Matched an allowed network
    AllowedIpBlock,
    /// Matched a blocked network
    BlockedIpBlock,
    /// Country is explicitly allowed
    AllowedCountry,
    /// Country is explicitly blocked
    BlockedCountry,
    /// No rule matched
    DefaultAllow,
}

impl Phase {
    /// Stable name used in logs and output
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllowPrivate => "allow_private",
            Self::AllowedIpBlock => "allowed_ip_block",
            Self::BlockedIpBlock => "blocked_ip_block",
            Self::AllowedCountry => "allowed_country",
            Self::BlockedCountry => "blocked_country",
            Self::DefaultAllow => "default_allow",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Whether the address may pass
    pub allowed: bool,
    /// Resolved country; `None` when a network rule decided before lookup
    pub country: Option<String>,
    /// Deciding rule
    pub phase: Phase,
}

impl Verdict {
    fn new(allowed: bool, country: Option<String>, phase: Phase) -> Self {
        Self {
            allowed,
            country,
            phase,
        }
    }
}

/// Behaviour flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Verdict when no rule matches
    pub default_allow: bool,
    /// Verdict for private and loopback addresses
    pub allow_private: bool,
    /// Whether callers should deny addresses that fail evaluation
    pub ban_on_error: bool,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            default_allow: false,
            allow_private: true,
            ban_on_error: true,
        }
    }
}

/// Private (RFC 1918 / unique local) or loopback address
pub fn is_private(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Ordered rule evaluation for client addresses
///
/// Immutable once built and safe to share across request threads.
pub struct AdmissionEngine {
    geo: Arc<dyn CountryLookup>,
    allowed_ranges: Arc<RangeSet>,
    blocked_ranges: Arc<RangeSet>,
    allowed_countries: HashSet<String>,
    blocked_countries: HashSet<String>,
    policy: AdmissionPolicy,
}

impl fmt::Debug for AdmissionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionEngine")
            .field("allowed_ranges", &self.allowed_ranges.len())
            .field("blocked_ranges", &self.blocked_ranges.len())
            .field("allowed_countries", &self.allowed_countries)
            .field("blocked_countries", &self.blocked_countries)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn country_set(codes: &[String]) -> HashSet<String> {
    codes
        .iter()
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

impl AdmissionEngine {
    /// Engine with no network or country rules
    pub fn new(geo: Arc<dyn CountryLookup>, policy: AdmissionPolicy) -> Self {
        Self {
            geo,
            allowed_ranges: Arc::new(RangeSet::new()),
            blocked_ranges: Arc::new(RangeSet::new()),
            allowed_countries: HashSet::new(),
            blocked_countries: HashSet::new(),
            policy,
        }
    }

    /// Build from the filter section of the configuration
    ///
    /// Range directories are scanned here, once.
    pub fn from_config(config: &FilterConfig, geo: Arc<dyn CountryLookup>) -> Self {
        let policy = AdmissionPolicy {
            default_allow: config.default_allow,
            allow_private: config.allow_private,
            ban_on_error: config.ban_on_error,
        };
        let allowed = RangeSet::load(
            &config.allowed_ip_blocks,
            config.allowed_ip_blocks_dir.as_deref(),
        );
        let blocked = RangeSet::load(
            &config.blocked_ip_blocks,
            config.blocked_ip_blocks_dir.as_deref(),
        );

        Self::new(geo, policy)
            .with_ranges(Arc::new(allowed), Arc::new(blocked))
            .with_countries(&config.allowed_countries, &config.blocked_countries)
    }

    /// Set allowed and blocked networks
    pub fn with_ranges(mut self, allowed: Arc<RangeSet>, blocked: Arc<RangeSet>) -> Self {
        self.allowed_ranges = allowed;
        self.blocked_ranges = blocked;
        self
    }

    /// Set allowed and blocked country codes, compared case-insensitively
    pub fn with_countries(mut self, allowed: &[String], blocked: &[String]) -> Self {
        self.allowed_countries = country_set(allowed);
        self.blocked_countries = country_set(blocked);
        self
    }

    /// Behaviour flags
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Evaluate an address string
    pub fn check(&self, ip: &str) -> Result<Verdict> {
        let addr: IpAddr = ip.trim().parse().map_err(|_| Error::InvalidIpAddr {
            addr: ip.to_string(),
        })?;
        self.check_addr(addr)
    }

    /// Evaluate a parsed address
    pub fn check_addr(&self, ip: IpAddr) -> Result<Verdict> {
        let ip = ip.to_canonical();

        if is_private(ip) {
            return Ok(Verdict::new(
                self.policy.allow_private,
                Some(PRIVATE_COUNTRY.to_string()),
                Phase::AllowPrivate,
            ));
        }

        if let Some(verdict) = self.check_ranges(ip) {
            return Ok(verdict);
        }

        let country = self.geo.lookup_country(ip)?.to_ascii_uppercase();
        let verdict = if self.allowed_countries.contains(&country) {
            Verdict::new(true, Some(country), Phase::AllowedCountry)
        } else if self.blocked_countries.contains(&country) {
            Verdict::new(false, Some(country), Phase::BlockedCountry)
        } else {
            Verdict::new(self.policy.default_allow, Some(country), Phase::DefaultAllow)
        };

        trace!(%ip, allowed = verdict.allowed, phase = %verdict.phase, "Country verdict");
        Ok(verdict)
    }

    /// Network rules; a more specific block only overrides a non-empty allow
    /// prefix, allow wins ties
    fn check_ranges(&self, ip: IpAddr) -> Option<Verdict> {
        let allowed = self.allowed_ranges.longest_match(ip);
        let blocked = self.blocked_ranges.longest_match(ip);

        match (allowed, blocked) {
            (Some(a), Some(b)) if a > 0 && b > a => Some(Verdict::new(false, None, Phase::BlockedIpBlock)),
            (Some(_), _) => Some(Verdict::new(true, None, Phase::AllowedIpBlock)),
            (None, Some(_)) => Some(Verdict::new(false, None, Phase::BlockedIpBlock)),
            (None, None) => None,
        }
    }
}
