//! Process-lifetime load cache keyed by logical module name.
//!
//! Each module gets one `LoadCacheEntry` holding at most one plugin and at
//! most one engine. Population goes through `tokio::sync::OnceCell`, so
//! concurrent loads of the same module serialise on initialisation and the
//! factory runs exactly once. Entries are never evicted.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::bundle::{BundleContainer, EntryDescriptor};
use crate::engine::DashboardEngine;
use crate::plugin::DashboardPlugin;

/// A plugin instance with the provenance it was loaded from
#[derive(Clone)]
pub struct CachedPlugin {
    pub plugin: Arc<dyn DashboardPlugin>,
    pub source_url: String,
    pub entry: EntryDescriptor,
}

/// An engine instance with the provenance it was loaded from
#[derive(Clone)]
pub struct CachedEngine {
    pub engine: Arc<dyn DashboardEngine>,
    pub source_url: String,
    pub entry: EntryDescriptor,
}

#[derive(Default)]
pub struct LoadCacheEntry {
    pub(crate) plugin: OnceCell<CachedPlugin>,
    pub(crate) engine: OnceCell<CachedEngine>,
}

impl LoadCacheEntry {
    pub fn plugin(&self) -> Option<&CachedPlugin> {
        self.plugin.get()
    }

    pub fn engine(&self) -> Option<&CachedEngine> {
        self.engine.get()
    }
}

/// A fetched bundle after its one-time shared-scope handshake
pub(crate) struct InitializedBundle {
    pub(crate) container: Arc<dyn BundleContainer>,
    pub(crate) entry: EntryDescriptor,
}

#[derive(Default)]
pub struct LoadCache {
    entries: DashMap<String, Arc<LoadCacheEntry>>,
    bundles: DashMap<String, Arc<OnceCell<Arc<InitializedBundle>>>>,
    plugin_conflicts: AtomicUsize,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or lazily create the entry for `module_name`
    pub fn entry(&self, module_name: &str) -> Arc<LoadCacheEntry> {
        // Clone the Arc out so no map shard lock is held across an await
        self.entries.entry(module_name.to_string()).or_default().clone()
    }

    pub(crate) fn bundle_cell(&self, url: &str) -> Arc<OnceCell<Arc<InitializedBundle>>> {
        self.bundles.entry(url.to_string()).or_default().clone()
    }

    pub fn cached_plugin(&self, module_name: &str) -> Option<CachedPlugin> {
        self.entries.get(module_name)?.plugin().cloned()
    }

    pub fn cached_engine(&self, module_name: &str) -> Option<CachedEngine> {
        self.entries.get(module_name)?.engine().cloned()
    }

    pub fn module_names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of bundles that completed the handshake
    pub fn initialized_bundle_count(&self) -> usize {
        self.bundles.iter().filter(|cell| cell.value().initialized()).count()
    }

    /// How many plugin loads reused an instance loaded from a different URL
    pub fn plugin_conflict_count(&self) -> usize {
        self.plugin_conflicts.load(Ordering::Relaxed)
    }

    pub(crate) fn record_plugin_conflict(&self) {
        self.plugin_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
