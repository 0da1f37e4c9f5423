//! File helpers for locating and copying database files

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Resolve `path` to a file
///
/// A file is returned as is. A directory is searched recursively for
/// `default_name`. Anything else is an error.
pub fn search_file(path: &Path, default_name: &str) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_dir() {
        if let Some(found) = find_in_dir(path, default_name) {
            debug!(path = %found.display(), "Found file by directory search");
            return Ok(found);
        }
        return Err(Error::unavailable(format!(
            "'{default_name}' not found under {}",
            path.display()
        )));
    }
    Err(Error::unavailable(format!("{} does not exist", path.display())))
}

fn find_in_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .collect();
    entries.sort();

    let (dirs, files): (Vec<_>, Vec<_>) = entries.into_iter().partition(|p| p.is_dir());
    files
        .into_iter()
        .find(|p| p.file_name().is_some_and(|n| n == name))
        .or_else(|| dirs.iter().find_map(|d| find_in_dir(d, name)))
}

/// Copy `src` to `dst` byte for byte
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::copy(src, dst)?)
}

/// Unique path for a private working copy
///
/// The nanosecond suffix keeps concurrent managers and processes apart.
pub fn private_copy_path(dir: &Path, product_code: &str) -> PathBuf {
    let now = Utc::now();
    dir.join(format!(
        "IP2LOCATION-LITE-{product_code}.IPV6_{}_{}.BIN",
        now.format("%Y%m%d_%H%M%S"),
        now.timestamp_subsec_nanos()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_direct_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.BIN");
        std::fs::write(&file, b"x").unwrap();

        assert_eq!(search_file(&file, "other.BIN").unwrap(), file);
    }

    #[test]
    fn test_search_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("db.BIN"), b"x").unwrap();

        assert_eq!(search_file(dir.path(), "db.BIN").unwrap(), nested.join("db.BIN"));
        assert!(search_file(dir.path(), "missing.BIN").is_err());
    }

    #[test]
    fn test_search_missing_path() {
        assert!(search_file(Path::new("/nonexistent/geoblock.BIN"), "db.BIN").is_err());
    }

    #[test]
    fn test_copy_and_private_names() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.BIN");
        std::fs::write(&src, b"payload").unwrap();

        let a = private_copy_path(dir.path(), "DB1");
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = private_copy_path(dir.path(), "DB1");
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("IP2LOCATION-LITE-DB1.IPV6_"));

        assert_eq!(copy_file(&src, &a).unwrap(), 7);
        assert_eq!(std::fs::read(&a).unwrap(), b"payload");
    }
}
