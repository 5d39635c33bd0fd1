//! Configuration cache
//!
//! Holds the last validated configuration per file path. Readers load a
//! snapshot without locking; writers publish a new map in one atomic swap,
//! so a reader never sees a half-updated entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use log::debug;

use crate::config::types::Configuration;

type Entries = HashMap<PathBuf, Arc<Configuration>>;

/// Lock-free cache of validated configurations keyed by path
#[derive(Debug, Default)]
pub struct ConfigCache {
    entries: ArcSwap<Entries>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current configuration for a path
    pub fn get(&self, path: &Path) -> Option<Arc<Configuration>> {
        self.entries.load().get(path).cloned()
    }

    /// Publish a configuration, replacing any previous one.
    ///
    /// Returns the replaced configuration.
    pub fn put(&self, path: impl Into<PathBuf>, config: Arc<Configuration>) -> Option<Arc<Configuration>> {
        let path = path.into();
        let previous = self.entries.rcu(|entries| {
            let mut next = Entries::clone(entries);
            next.insert(path.clone(), Arc::clone(&config));
            next
        });
        debug!("Published configuration for {}", path.display());
        previous.get(&path).cloned()
    }

    /// Drop the configuration for a path
    pub fn invalidate(&self, path: &Path) -> Option<Arc<Configuration>> {
        if !self.entries.load().contains_key(path) {
            return None;
        }

        let previous = self.entries.rcu(|entries| {
            let mut next = Entries::clone(entries);
            next.remove(path);
            next
        });
        debug!("Invalidated cached configuration for {}", path.display());
        previous.get(path).cloned()
    }

    /// Drop every cached configuration
    pub fn clear(&self) {
        self.entries.store(Arc::new(Entries::new()));
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}
