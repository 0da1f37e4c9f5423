//! CIDR range sets built from configuration lists and block-list directories

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::trie::PrefixTrie;

/// Immutable set of networks answering longest-prefix queries
#[derive(Debug, Default)]
pub struct RangeSet {
    trie: PrefixTrie,
    entries: usize,
}

impl RangeSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from inline CIDRs and an optional directory of `.txt` lists
    ///
    /// Static entries are inserted first. Bad lines are logged and skipped,
    /// and a missing directory contributes nothing.
    pub fn load<S: AsRef<str>>(cidrs: &[S], dir: Option<&Path>) -> Self {
        let mut set = Self::new();
        for cidr in cidrs {
            set.add(cidr.as_ref(), "config");
        }
        if let Some(dir) = dir {
            set.load_dir(dir);
        }
        set
    }

    /// Build from inline CIDRs only
    pub fn from_cidrs<S: AsRef<str>>(cidrs: &[S]) -> Self {
        Self::load(cidrs, None)
    }

    /// Recursively load every `.txt` file under `dir`
    ///
    /// Returns the number of entries added.
    pub fn load_dir(&mut self, dir: &Path) -> usize {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "CIDR directory not found, skipping");
            return 0;
        }

        let mut files = Vec::new();
        collect_text_files(dir, &mut files);
        files.sort();

        let before = self.entries;
        for file in &files {
            match std::fs::read_to_string(file) {
                Ok(content) => {
                    let source = file.display().to_string();
                    for line in content.lines() {
                        let line = line.trim();
                        if line.is_empty() || line.starts_with('#') {
                            continue;
                        }
                        self.add(line, &source);
                    }
                }
                Err(e) => warn!(file = %file.display(), error = %e, "Failed to read CIDR file"),
            }
        }

        let added = self.entries - before;
        info!(
            entries = added,
            files = files.len(),
            dir = %dir.display(),
            "Loaded CIDR blocks"
        );
        added
    }

    fn add(&mut self, cidr: &str, source: &str) {
        match self.trie.insert_str(cidr) {
            Ok(()) => self.entries += 1,
            Err(e) => warn!(source, error = %e, "Skipping invalid CIDR"),
        }
    }

    /// Most specific matching prefix length for `ip`
    pub fn longest_match(&self, ip: IpAddr) -> Option<u8> {
        self.trie.longest_match(ip)
    }

    /// Whether `ip` is covered by any entry
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.trie.contains(ip)
    }

    /// Number of accepted entries, duplicates included
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

fn collect_text_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read CIDR directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_text_files(&path, out);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt"))
        {
            out.push(path);
        } else {
            debug!(file = %path.display(), "Ignoring non-text file");
        }
    }
}
