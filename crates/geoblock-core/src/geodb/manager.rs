//! Database lifecycle: initial resolution, background refresh and hot swap

use arc_swap::ArcSwap;
use chrono::{NaiveDate, Utc};
use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::files::search_file;
use super::handle::GeoDatabaseHandle;
use super::header::{read_version, DbVersion};
use super::reader::CountryLookup;
use super::update::{
    date_from_name, download_database, find_latest_database, needs_update, UpdateOutcome,
    UPDATE_AFTER_DAYS, WARN_AFTER_DAYS,
};
use crate::config::{DatabaseConfig, DEFAULT_DATABASE_FILE};
use crate::error::{Error, Result};

/// What a refresh check did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The active database is recent enough
    Fresh,
    /// Nothing newer than the active database was found or downloaded
    UpToDate,
    /// A newer database is now active
    Swapped {
        /// Version that was replaced
        from: DbVersion,
        /// Version now serving lookups
        to: DbVersion,
    },
}

struct RefreshWorker {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Owner of the active database snapshot
///
/// Lookups load the current handle without locking. Refreshes build a new
/// handle off to the side and publish it with a single atomic swap.
pub struct GeoDatabaseManager {
    config: DatabaseConfig,
    current: ArcSwap<GeoDatabaseHandle>,
    refresh_lock: Mutex<()>,
    worker: Mutex<Option<RefreshWorker>>,
}

impl std::fmt::Debug for GeoDatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoDatabaseManager")
            .field("path", &self.current.load().path())
            .field("version", &self.current.load().version())
            .field("auto_update", &self.config.auto_update)
            .finish()
    }
}

impl GeoDatabaseManager {
    /// Resolve and open the initial database, then start refreshing if enabled
    pub fn new(config: DatabaseConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let handle = resolve_initial(&config)?;
        info!(
            path = %handle.path().display(),
            source = %handle.source().display(),
            version = %handle.version(),
            "Opened country database"
        );
        warn_if_stale(handle.version(), today());

        let manager = Arc::new(Self {
            config,
            current: ArcSwap::from_pointee(handle),
            refresh_lock: Mutex::new(()),
            worker: Mutex::new(None),
        });

        if manager.config.auto_update {
            manager.start_refresh()?;
        }
        Ok(manager)
    }

    /// Configuration this manager was built from
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Snapshot of the active handle
    pub fn current(&self) -> Arc<GeoDatabaseHandle> {
        self.current.load_full()
    }

    /// Version of the active database
    pub fn version(&self) -> DbVersion {
        self.current.load().version()
    }

    fn copy_dir(&self) -> PathBuf {
        self.config
            .local_copy_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Replace the active database with a private copy of `source`
    ///
    /// Readers holding the previous handle keep using it until they drop it.
    pub fn hot_swap(&self, source: &Path) -> Result<DbVersion> {
        let handle =
            GeoDatabaseHandle::open_private_copy(source, &self.copy_dir(), &self.config.product_code)?;
        let version = handle.version();
        let old = self.current.swap(Arc::new(handle));
        info!(
            from = %old.version(),
            to = %version,
            source = %source.display(),
            "Swapped country database"
        );
        Ok(version)
    }

    /// Run one refresh check
    ///
    /// Recent databases are left alone. Otherwise the auto-update directory is
    /// scanned, a download is attempted when nothing newer exists there, and
    /// the newest file is swapped in.
    #[instrument(skip(self), fields(product = %self.config.product_code))]
    pub fn check_and_update(&self) -> Result<RefreshOutcome> {
        let _guard = self.refresh_lock.lock();
        let today = today();
        let version = self.version();
        let current_date = version.date();

        if let Some(age) = version.age_days(today) {
            warn_if_stale(version, today);
            if age <= UPDATE_AFTER_DAYS {
                debug!(age_days = age, "Country database is fresh");
                return Ok(RefreshOutcome::Fresh);
            }
        }

        let Some(dir) = self.config.auto_update_dir.as_deref() else {
            return Ok(RefreshOutcome::UpToDate);
        };

        let mut latest = find_latest_database(dir, &self.config.product_code)?;
        let have_newer = latest.as_deref().is_some_and(|p| is_newer(p, current_date));

        if self.config.auto_update && !have_newer && needs_update(latest.as_deref(), today) {
            match download_database(&self.config)? {
                UpdateOutcome::Installed(path) => {
                    debug!(path = %path.display(), "Downloaded database");
                }
                UpdateOutcome::Locked => {}
            }
            latest = find_latest_database(dir, &self.config.product_code)?;
        }

        match latest.filter(|p| is_newer(p, current_date)) {
            Some(path) => {
                let to = self.hot_swap(&path)?;
                Ok(RefreshOutcome::Swapped { from: version, to })
            }
            None => Ok(RefreshOutcome::UpToDate),
        }
    }

    fn refresh_logged(&self) {
        match self.check_and_update() {
            Ok(RefreshOutcome::Swapped { from, to }) => {
                info!(%from, %to, "Country database refreshed");
            }
            Ok(outcome) => debug!(?outcome, "Refresh check finished"),
            Err(e) => warn!(error = %e, "Database refresh failed, keeping current database"),
        }
    }

    fn start_refresh(self: &Arc<Self>) -> Result<()> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let weak = Arc::downgrade(self);
        let interval = Duration::from_secs(self.config.refresh_interval_secs);

        let thread = std::thread::Builder::new()
            .name("geodb-refresh".to_string())
            .spawn(move || refresh_loop(&weak, &stop_rx, interval))?;

        *self.worker.lock() = Some(RefreshWorker {
            stop: stop_tx,
            thread,
        });
        debug!(interval_secs = interval.as_secs(), "Started database refresh loop");
        Ok(())
    }

    /// Whether the background refresh loop is running
    pub fn is_refreshing(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Stop the background refresh loop
    ///
    /// Idempotent. Returns after the loop has exited unless called from the
    /// loop itself.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        drop(worker.stop);
        if worker.thread.thread().id() == std::thread::current().id() {
            return;
        }
        if worker.thread.join().is_err() {
            warn!("Database refresh loop panicked");
        }
        debug!("Stopped database refresh loop");
    }
}

impl CountryLookup for GeoDatabaseManager {
    fn lookup_country(&self, ip: IpAddr) -> Result<String> {
        self.current.load().lookup_country(ip)
    }
}

impl Drop for GeoDatabaseManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn refresh_loop(manager: &Weak<GeoDatabaseManager>, stop: &Receiver<()>, interval: Duration) {
    let ticker = crossbeam_channel::tick(interval);
    loop {
        match manager.upgrade() {
            Some(m) => m.refresh_logged(),
            None => break,
        }
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {}
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn is_newer(path: &Path, current: Option<NaiveDate>) -> bool {
    match (date_from_name(&path.to_string_lossy()), current) {
        (Ok(date), Some(current)) => date > current,
        (Ok(_), None) => true,
        (Err(_), _) => false,
    }
}

fn warn_if_stale(version: DbVersion, today: NaiveDate) {
    if let Some(age) = version.age_days(today) {
        if age > WARN_AFTER_DAYS {
            warn!(
                version = %version,
                age_days = age,
                "Country database is more than {WARN_AFTER_DAYS} days old, lookups may be inaccurate"
            );
        }
    }
}

/// Open the first usable candidate
///
/// The newest dated file in the auto-update directory wins over the
/// configured file when it is at least as recent; either way the other one
/// is tried if opening fails.
fn resolve_initial(config: &DatabaseConfig) -> Result<GeoDatabaseHandle> {
    let mut failures = Vec::new();

    let fallback = match search_file(&config.file_path, DEFAULT_DATABASE_FILE) {
        Ok(path) => Some(path),
        Err(e) => {
            failures.push(e.to_string());
            None
        }
    };

    let latest = match (config.auto_update, config.auto_update_dir.as_deref()) {
        (true, Some(dir)) => match find_latest_database(dir, &config.product_code) {
            Ok(found) => found,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to scan auto-update directory");
                None
            }
        },
        _ => None,
    };

    let prefer_latest = match (&latest, &fallback) {
        (Some(latest), Some(fallback)) => {
            let latest_date = date_from_name(&latest.to_string_lossy()).ok();
            let fallback_date = read_version(fallback).ok().and_then(|v| v.date());
            match (latest_date, fallback_date) {
                (Some(l), Some(f)) => l >= f,
                (Some(_), None) => true,
                (None, _) => false,
            }
        }
        (Some(_), None) => true,
        _ => false,
    };

    let mut candidates: Vec<(PathBuf, bool)> = Vec::new();
    if let Some(latest) = &latest {
        candidates.push((latest.clone(), true));
    }
    if let Some(fallback) = fallback {
        let at = if prefer_latest { candidates.len() } else { 0 };
        candidates.insert(at, (fallback, false));
    }

    let copy_dir = config
        .local_copy_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);

    for (path, private) in candidates {
        let opened = if private {
            GeoDatabaseHandle::open_private_copy(&path, &copy_dir, &config.product_code)
        } else {
            GeoDatabaseHandle::open(&path)
        };
        match opened {
            Ok(handle) => return Ok(handle),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unusable database");
                failures.push(format!("{}: {e}", path.display()));
            }
        }
    }

    Err(Error::unavailable(if failures.is_empty() {
        "no database configured".to_string()
    } else {
        failures.join("; ")
    }))
}
