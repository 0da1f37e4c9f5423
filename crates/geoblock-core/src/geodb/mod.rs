//! Country database lifecycle
//!
//! This module owns everything between a database file on disk and a
//! country code answer:
//! - Header parsing and an in-memory BIN reader behind [`CountryLookup`]
//! - Immutable [`GeoDatabaseHandle`] snapshots
//! - [`GeoDatabaseManager`], which hot-swaps snapshots and refreshes them
//!   in the background
//! - [`ManagerRegistry`], which shares managers between identical configurations
//! - Dated auto-update files, download locking and archive installation

pub mod files;
mod handle;
pub mod header;
mod manager;
mod reader;
mod registry;
pub mod update;

pub use handle::GeoDatabaseHandle;
pub use header::{DbHeader, DbVersion};
pub use manager::{GeoDatabaseManager, RefreshOutcome};
pub use reader::{CountryLookup, Ip2LocationReader};
pub use registry::{fingerprint, ManagerRegistry};

#[cfg(test)]
pub use reader::MockCountryLookup;
