//! One manager per distinct database configuration

use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

use super::manager::GeoDatabaseManager;
use crate::config::DatabaseConfig;
use crate::error::Result;

/// Stable hash of a database configuration, used to identify managers in logs
pub fn fingerprint(config: &DatabaseConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.hash(&mut hasher);
    hasher.finish()
}

/// Shares managers between filters with identical database settings
///
/// Filters built from the same registry and the same [`DatabaseConfig`]
/// share one open database and one refresh loop. Entries are keyed by the
/// full configuration, so distinct settings never share a manager.
#[derive(Debug, Default)]
pub struct ManagerRegistry {
    managers: RwLock<HashMap<DatabaseConfig, Arc<GeoDatabaseManager>>>,
}

impl ManagerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing manager for `config`, or a newly initialized one
    pub fn get_or_create(&self, config: &DatabaseConfig) -> Result<Arc<GeoDatabaseManager>> {
        if let Some(manager) = self.managers.read().get(config) {
            return Ok(Arc::clone(manager));
        }

        let mut managers = self.managers.write();
        if let Some(manager) = managers.get(config) {
            return Ok(Arc::clone(manager));
        }

        let manager = GeoDatabaseManager::new(config.clone())?;
        debug!(fingerprint = fingerprint(config), "Registered database manager");
        managers.insert(config.clone(), Arc::clone(&manager));
        Ok(manager)
    }

    /// Registered manager for `config`, without creating one
    pub fn get(&self, config: &DatabaseConfig) -> Option<Arc<GeoDatabaseManager>> {
        self.managers.read().get(config).cloned()
    }

    /// Stop and forget the manager for `config`
    pub fn remove(&self, config: &DatabaseConfig) -> Option<Arc<GeoDatabaseManager>> {
        let removed = self.managers.write().remove(config);
        if let Some(manager) = &removed {
            manager.shutdown();
        }
        removed
    }

    /// Stop and forget every manager
    pub fn clear(&self) {
        let drained: Vec<_> = self.managers.write().drain().map(|(_, m)| m).collect();
        for manager in drained {
            manager.shutdown();
        }
    }

    /// Number of registered managers
    pub fn len(&self) -> usize {
        self.managers.read().len()
    }

    /// Check if no manager is registered
    pub fn is_empty(&self) -> bool {
        self.managers.read().is_empty()
    }
}
