//! Dated database files and downloads
//!
//! Auto-update directories hold files named `YYYYMMDD_IP2LOCATION-LITE-<code>.IPV6.BIN`.
//! The leading date is what freshness checks use, so deciding whether to
//! download never requires opening a database.

use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::header::read_header;
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Free LITE download, used when no token is configured
pub const LITE_DOWNLOAD_URL: &str =
    "https://download.ip2location.com/lite/IP2LOCATION-LITE-DB1.IPV6.BIN.ZIP";

/// Upper bound on the extracted database size
pub const MAX_EXTRACTED_SIZE: u64 = 200 * 1024 * 1024;

/// Lock file guarding downloads into one directory
pub const LOCK_FILE: &str = "update.lock";

/// Locks older than this are considered abandoned
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(60 * 60);

/// Databases older than this are refreshed
pub const UPDATE_AFTER_DAYS: i64 = 30;

/// Databases older than this are reported loudly
pub const WARN_AFTER_DAYS: i64 = 60;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Product file name without a date prefix
pub fn database_file_name(product_code: &str) -> String {
    format!("IP2LOCATION-LITE-{product_code}.IPV6.BIN")
}

/// Dated file name used inside auto-update directories
pub fn dated_file_name(date: NaiveDate, product_code: &str) -> String {
    format!("{}_{}", date.format("%Y%m%d"), database_file_name(product_code))
}

/// Date encoded in the leading `YYYYMMDD_` segment of a file name
pub fn date_from_name(path: &str) -> Result<NaiveDate> {
    let normalized = path.replace('\\', "/");
    let name = normalized.rsplit('/').next().unwrap_or_default();
    let prefix = name.split('_').next().unwrap_or_default();

    let invalid = || Error::InvalidFileDate {
        name: name.to_string(),
    };
    if prefix.len() != 8 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(prefix, "%Y%m%d").map_err(|_| invalid())
}

/// Newest dated database for `product_code` in `dir`
///
/// Creates `dir` when missing. Files without a valid date are ignored.
pub fn find_latest_database(dir: &Path, product_code: &str) -> Result<Option<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let suffix = database_file_name(product_code);

    let mut latest: Option<(NaiveDate, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_file() || !name.ends_with(&suffix) {
            continue;
        }
        match date_from_name(name) {
            Ok(date) => {
                if latest.as_ref().map_or(true, |(best, _)| date > *best) {
                    latest = Some((date, path));
                }
            }
            Err(e) => debug!(file = name, error = %e, "Ignoring undated database file"),
        }
    }

    Ok(latest.map(|(_, path)| path))
}

/// Whether a download should be attempted given the newest local file
pub fn needs_update(latest: Option<&Path>, today: NaiveDate) -> bool {
    let Some(path) = latest else {
        return true;
    };
    match date_from_name(&path.to_string_lossy()) {
        Ok(date) => (today - date).num_days() > UPDATE_AFTER_DAYS,
        Err(_) => true,
    }
}

/// URL to download from for this configuration
pub fn download_url(config: &DatabaseConfig) -> String {
    if let Some(url) = &config.download_url {
        return url.clone();
    }
    match config.auto_update_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => format!(
            "https://www.ip2location.com/download?token={token}&file=IP2LOCATION-LITE-{}.IPV6.BIN.ZIP",
            config.product_code
        ),
        None => LITE_DOWNLOAD_URL.to_string(),
    }
}

fn redact(url: &str, config: &DatabaseConfig) -> String {
    match config.auto_update_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => url.replace(token, "***"),
        None => url.to_string(),
    }
}

/// Exclusive download lock, removed on drop
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
}

impl UpdateLock {
    /// Take the lock in `dir`
    ///
    /// Returns `None` while another live process holds it. Locks older than
    /// [`STALE_LOCK_AGE`] are removed first.
    pub fn acquire(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(LOCK_FILE);

        if let Ok(meta) = std::fs::metadata(&path) {
            let age = meta
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .unwrap_or_default();
            if age < STALE_LOCK_AGE {
                info!(lock = %path.display(), "Another update is in progress, skipping");
                return Ok(None);
            }
            warn!(lock = %path.display(), age_secs = age.as_secs(), "Removing stale update lock");
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Some(Self { path }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lock file location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to remove update lock");
        }
    }
}

/// Result of a download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new dated database was written
    Installed(PathBuf),
    /// Another process holds the lock
    Locked,
}

/// Download, validate and install a fresh database into `auto_update_dir`
pub fn download_database(config: &DatabaseConfig) -> Result<UpdateOutcome> {
    let dir = config
        .auto_update_dir
        .as_deref()
        .ok_or_else(|| Error::config_value("database.auto_update_dir", "Required for downloads"))?;
    std::fs::create_dir_all(dir)?;

    let Some(_lock) = UpdateLock::acquire(dir)? else {
        return Ok(UpdateOutcome::Locked);
    };

    let url = download_url(config);
    let shown = redact(&url, config);
    let staging = tempfile::Builder::new().prefix("ip2location-").tempdir_in(dir)?;
    let archive = staging.path().join("database.zip");

    info!(url = %shown, "Downloading country database");
    let bytes = fetch(&url, &shown, &archive)?;
    debug!(bytes, archive = %archive.display(), "Download complete");

    let installed = install_archive(&archive, dir, &config.product_code)?;
    Ok(UpdateOutcome::Installed(installed))
}

fn fetch(url: &str, shown: &str, dest: &Path) -> Result<u64> {
    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .user_agent(concat!("geoblock/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::download(shown, e))?;

    let mut response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| Error::download(shown, e.without_url()))?;

    let mut file = File::create(dest)?;
    let bytes = response
        .copy_to(&mut file)
        .map_err(|e| Error::download(shown, e.without_url()))?;
    file.sync_all()?;
    Ok(bytes)
}

/// Extract the database from `archive`, validate it and move it into `dir`
///
/// The installed name carries the header's release date.
pub fn install_archive(archive: &Path, dir: &Path, product_code: &str) -> Result<PathBuf> {
    let staging = tempfile::Builder::new().prefix("ip2location-").tempdir_in(dir)?;
    let extracted = extract_database(archive, staging.path())?;

    let header = read_header(&extracted)?;
    let date = header.version.date().ok_or_else(|| {
        Error::invalid_header(&extracted, format!("impossible release date {}", header.version))
    })?;

    let dest = dir.join(dated_file_name(date, product_code));
    if std::fs::rename(&extracted, &dest).is_err() {
        std::fs::copy(&extracted, &dest)?;
    }

    info!(path = %dest.display(), version = %header.version, "Installed country database");
    Ok(dest)
}

/// Extract the first `.BIN` entry of a zip archive into `dest_dir`
pub fn extract_database(archive: &Path, dest_dir: &Path) -> Result<PathBuf> {
    extract_database_capped(archive, dest_dir, MAX_EXTRACTED_SIZE)
}

/// [`extract_database`] with an explicit size limit
///
/// An entry larger than `limit` is an [`Error::Archive`] and leaves no output file.
pub(crate) fn extract_database_capped(
    archive: &Path,
    dest_dir: &Path,
    limit: u64,
) -> Result<PathBuf> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| Error::Archive(e.to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| Error::Archive(e.to_string()))?;
        if !entry.is_file() || !entry.name().to_ascii_uppercase().ends_with(".BIN") {
            continue;
        }

        let out_path = dest_dir.join("database.BIN");
        let mut out = File::create(&out_path)?;
        let written = io::copy(&mut (&mut entry).take(limit + 1), &mut out)?;
        if written > limit {
            drop(out);
            let _ = std::fs::remove_file(&out_path);
            return Err(Error::Archive(format!(
                "'{}' exceeds {limit} bytes",
                entry.name()
            )));
        }

        debug!(entry = entry.name(), bytes = written, "Extracted database");
        return Ok(out_path);
    }

    Err(Error::Archive("no .BIN file in archive".to_string()))
}
