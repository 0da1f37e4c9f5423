//! Immutable database snapshots

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::files::{copy_file, private_copy_path};
use super::header::{DbHeader, DbVersion};
use super::reader::{CountryLookup, Ip2LocationReader};
use crate::error::Result;

/// An opened database plus where it came from
///
/// Handles never change after construction. A refresh builds a new handle
/// and swaps it in; the old one is released when its last reader drops it,
/// which also deletes its private working copy.
#[derive(Debug)]
pub struct GeoDatabaseHandle {
    reader: Ip2LocationReader,
    path: PathBuf,
    source: PathBuf,
    private_copy: bool,
}

impl GeoDatabaseHandle {
    /// Open `path` directly
    pub fn open(path: &Path) -> Result<Self> {
        let reader = Ip2LocationReader::open(path)?;
        Ok(Self {
            reader,
            path: path.to_path_buf(),
            source: path.to_path_buf(),
            private_copy: false,
        })
    }

    /// Copy `source` into `copy_dir` and open the copy
    ///
    /// Shared files may be rewritten by other processes, so they are never
    /// opened in place.
    pub fn open_private_copy(source: &Path, copy_dir: &Path, product_code: &str) -> Result<Self> {
        let path = private_copy_path(copy_dir, product_code);
        copy_file(source, &path)?;
        debug!(source = %source.display(), copy = %path.display(), "Created private database copy");

        match Ip2LocationReader::open(&path) {
            Ok(reader) => Ok(Self {
                reader,
                path,
                source: source.to_path_buf(),
                private_copy: true,
            }),
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                Err(e)
            }
        }
    }

    /// Release date from the header
    pub fn version(&self) -> DbVersion {
        self.reader.version()
    }

    /// Full parsed header
    pub fn header(&self) -> &DbHeader {
        self.reader.header()
    }

    /// File the reader was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File the snapshot was copied from, equal to `path` for direct opens
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Whether this handle owns a private copy
    pub fn is_private_copy(&self) -> bool {
        self.private_copy
    }
}

impl CountryLookup for GeoDatabaseHandle {
    fn lookup_country(&self, ip: IpAddr) -> Result<String> {
        self.reader.lookup_country(ip)
    }
}

impl Drop for GeoDatabaseHandle {
    fn drop(&mut self) {
        if !self.private_copy {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Released database copy"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove database copy"),
        }
    }
}
