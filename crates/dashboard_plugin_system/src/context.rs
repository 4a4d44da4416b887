//! Loader context: everything a loader needs, passed in explicitly.
//!
//! Two contexts never share a cache unless the caller hands them the same
//! `Arc<LoadCache>`, so independent runtimes (and tests) stay isolated.

use std::sync::Arc;
use std::time::Duration;

use crate::bundle::{BundleTransport, SharedScope};
use crate::cache::LoadCache;
use crate::config::LoaderConfig;

#[derive(Clone)]
pub struct LoaderContext {
    cache: Arc<LoadCache>,
    transport: Arc<dyn BundleTransport>,
    shared_scope: SharedScope,
    config: LoaderConfig,
}

impl LoaderContext {
    /// Create a context with a fresh cache
    pub fn new(transport: Arc<dyn BundleTransport>, config: LoaderConfig) -> Self {
        Self::with_cache(Arc::new(LoadCache::new()), transport, config)
    }

    pub fn with_cache(cache: Arc<LoadCache>, transport: Arc<dyn BundleTransport>, config: LoaderConfig) -> Self {
        let shared_scope = SharedScope::new(config.shared_modules.clone());
        Self {
            cache,
            transport,
            shared_scope,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<LoadCache> {
        &self.cache
    }

    pub fn transport(&self) -> &Arc<dyn BundleTransport> {
        &self.transport
    }

    pub fn shared_scope(&self) -> &SharedScope {
        &self.shared_scope
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.config.load_timeout()
    }
}

impl std::fmt::Debug for LoaderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderContext")
            .field("cached_modules", &self.cache.len())
            .field("shared_scope", &self.shared_scope)
            .field("config", &self.config)
            .finish()
    }
}
