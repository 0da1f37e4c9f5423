//! CIDR range matching
//!
//! This module provides the allow/block network sets used by the admission engine:
//! - A binary prefix trie with longest-prefix match over IPv4 and IPv6
//! - Range sets assembled from configuration entries and `.txt` block lists
//!
//! Sets are built once and are read-only afterwards, so they can be shared
//! across threads without locking.

mod set;
mod trie;

pub use set::RangeSet;
pub use trie::{parse_cidr, PrefixTrie};
