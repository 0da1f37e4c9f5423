//! # Geoblock Core
//!
//! Request admission by client network and country.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Range matching** - Longest-prefix CIDR tries for allow/block networks
//! - **Country database** - IP2Location BIN reader with hot-swapped, auto-updated snapshots
//! - **Admission engine** - Ordered rule evaluation for a single address
//! - **Request filter** - Header extraction, bypass rules and denial responses
//! - **Configuration** - TOML configuration with validation
//!
//! ## Example
//!
//! ```rust,no_run
//! use geoblock_core::{Config, ManagerRegistry, RequestFilter};
//!
//! let config = Config::load("geoblock.toml")?;
//! let registry = ManagerRegistry::new();
//! let filter = RequestFilter::new(&config, &registry)?;
//!
//! let mut request = http::Request::builder()
//!     .uri("/")
//!     .header("x-forwarded-for", "8.8.8.8")
//!     .body(())?;
//!
//! if let Some(denied) = filter.apply(&mut request) {
//!     println!("denied with {}", denied.status());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod admission;
pub mod config;
pub mod error;
pub mod filter;
pub mod geodb;
pub mod ranges;

// Re-exports for convenience
pub use admission::{AdmissionEngine, AdmissionPolicy, Phase, Verdict};
pub use config::Config;
pub use error::{Error, Result};
pub use filter::{Decision, RequestFilter};
pub use geodb::{CountryLookup, GeoDatabaseManager, ManagerRegistry};
pub use ranges::{PrefixTrie, RangeSet};
