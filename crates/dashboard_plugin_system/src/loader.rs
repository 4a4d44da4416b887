//! Bundle loader: obtains plugin and engine instances, at most once per module.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bundle::{BundleExport, BundleReference, EntryDescriptor};
use crate::cache::{CachedEngine, CachedPlugin, InitializedBundle};
use crate::context::LoaderContext;
use crate::engine::DashboardEngine;
use crate::error::{PluginLoaderError, Result};
use crate::plugin::DashboardPlugin;

/// Loads plugins and engines from bundle URLs through a [`LoaderContext`].
///
/// Every bundle URL is fetched and handshaken once. The plugin and the
/// engine of a logical module are each created once; later requests return
/// the cached instance, even when they name a different URL.
///
/// Concurrent requests for the same module wait on the one in-flight load
/// instead of starting their own. A failed load leaves the slot empty, so
/// the next request tries again.
pub struct BundleLoader {
    context: LoaderContext,
}

impl BundleLoader {
    pub fn new(context: LoaderContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &LoaderContext {
        &self.context
    }

    /// Obtain the plugin instance for the module `url` resolves to.
    ///
    /// If the module's plugin was already loaded from another URL, a conflict
    /// is logged and the existing instance is returned.
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute or root-relative bundle URL; its last path segment
    ///   names the module
    ///
    /// # Returns
    ///
    /// The cached plugin instance, or an error if the URL is invalid, the
    /// fetch or handshake fails, the export is missing or of the wrong kind,
    /// or the plugin factory fails.
    pub async fn load_plugin(&self, url: &str) -> Result<Arc<dyn DashboardPlugin>> {
        let reference = BundleReference::parse(url)?;
        let bundle = self.initialized_bundle(&reference).await?;
        let entry = self.context.cache().entry(reference.module_name());

        let cached = entry
            .plugin
            .get_or_try_init(|| self.create_plugin(&reference, &bundle))
            .await?;

        if cached.source_url != reference.url() {
            self.context.cache().record_plugin_conflict();
            warn!(
                "⚠️ Plugin module '{}' is already loaded from {} (v{}); reusing it instead of {} (v{})",
                reference.module_name(),
                cached.source_url,
                cached.entry.version,
                reference.url(),
                bundle.entry.version
            );
        }

        Ok(Arc::clone(&cached.plugin))
    }

    /// Obtain the engine instance for the module `url` resolves to.
    ///
    /// A cached engine is returned without further checks. A failing engine
    /// factory is logged and returned as an error; it is not retried here.
    ///
    /// # Arguments
    ///
    /// * `url` - Bundle URL whose engine export should be created
    ///
    /// # Returns
    ///
    /// The cached engine instance, or [`PluginLoaderError::EngineFactoryFailed`]
    /// when the bundle's engine cannot be built against the shared modules.
    pub async fn load_engine(&self, url: &str) -> Result<Arc<dyn DashboardEngine>> {
        let reference = BundleReference::parse(url)?;
        let bundle = self.initialized_bundle(&reference).await?;
        let entry = self.context.cache().entry(reference.module_name());

        let cached = entry
            .engine
            .get_or_try_init(|| self.create_engine(&reference, &bundle))
            .await?;

        Ok(Arc::clone(&cached.engine))
    }

    /// Entry descriptor of the bundle at `url`, performing the handshake if needed.
    ///
    /// # Arguments
    ///
    /// * `url` - Bundle URL to inspect
    ///
    /// # Returns
    ///
    /// The export keys and version the bundle declared during its handshake.
    pub async fn entry_descriptor(&self, url: &str) -> Result<EntryDescriptor> {
        let reference = BundleReference::parse(url)?;
        Ok(self.initialized_bundle(&reference).await?.entry.clone())
    }

    async fn create_plugin(&self, reference: &BundleReference, bundle: &InitializedBundle) -> Result<CachedPlugin> {
        let key = &bundle.entry.plugin_key;
        let factory = match self.export(reference, bundle, key).await? {
            BundleExport::Plugin(factory) => factory,
            BundleExport::Engine(_) => {
                return Err(PluginLoaderError::UnexpectedExport {
                    url: reference.url().to_string(),
                    key: key.clone(),
                    expected: "plugin factory",
                })
            }
        };

        let plugin = factory().map_err(|e| {
            error!("❌ Plugin factory for module '{}' failed: {}", reference.module_name(), e);
            PluginLoaderError::PluginFactoryFailed {
                module: reference.module_name().to_string(),
                url: reference.url().to_string(),
                reason: e.to_string(),
            }
        })?;

        info!(
            "🔌 Loaded plugin {} v{} from {}",
            plugin.display_name(),
            bundle.entry.version,
            reference.url()
        );

        Ok(CachedPlugin {
            plugin,
            source_url: reference.url().to_string(),
            entry: bundle.entry.clone(),
        })
    }

    async fn create_engine(&self, reference: &BundleReference, bundle: &InitializedBundle) -> Result<CachedEngine> {
        let key = &bundle.entry.engine_key;
        let factory = match self.export(reference, bundle, key).await? {
            BundleExport::Engine(factory) => factory,
            BundleExport::Plugin(_) => {
                return Err(PluginLoaderError::UnexpectedExport {
                    url: reference.url().to_string(),
                    key: key.clone(),
                    expected: "engine factory",
                })
            }
        };

        let engine = factory().map_err(|e| {
            error!(
                "❌ Engine factory for module '{}' from {} failed: {}. This usually means two deployments \
                 with different versions use the same module name",
                reference.module_name(),
                reference.url(),
                e
            );
            PluginLoaderError::EngineFactoryFailed {
                module: reference.module_name().to_string(),
                url: reference.url().to_string(),
                reason: e.to_string(),
            }
        })?;

        info!("🔧 Loaded engine v{} from {}", engine.version(), reference.url());

        Ok(CachedEngine {
            engine,
            source_url: reference.url().to_string(),
            entry: bundle.entry.clone(),
        })
    }

    /// Look up one export of an initialised bundle under the load timeout
    async fn export(&self, reference: &BundleReference, bundle: &InitializedBundle, key: &str) -> Result<BundleExport> {
        let operation = format!("Resolving '{}' from {}", key, reference.url());
        self.bounded(operation, async {
            bundle.container.get(key).await.map_err(|e| PluginLoaderError::Entry {
                url: reference.url().to_string(),
                reason: format!("export '{}' unavailable: {}", key, e),
            })
        })
        .await
    }

    /// Fetch the bundle and run its shared-scope handshake, once per URL
    async fn initialized_bundle(&self, reference: &BundleReference) -> Result<Arc<InitializedBundle>> {
        let cell = self.context.cache().bundle_cell(reference.url());
        let bundle = cell
            .get_or_try_init(|| async {
                let url = reference.url();
                debug!("📦 Fetching bundle {}", reference);

                let container = self
                    .bounded(format!("Fetching {}", url), async {
                        self.context
                            .transport()
                            .fetch(reference)
                            .await
                            .map_err(|e| PluginLoaderError::Transport {
                                url: url.to_string(),
                                reason: e.to_string(),
                            })
                    })
                    .await?;

                let entry = self
                    .bounded(format!("Initialising {}", url), async {
                        container
                            .init(self.context.shared_scope())
                            .await
                            .map_err(|e| PluginLoaderError::Entry {
                                url: url.to_string(),
                                reason: format!("shared scope handshake failed: {}", e),
                            })?;
                        container.get_entry().await.map_err(|e| PluginLoaderError::Entry {
                            url: url.to_string(),
                            reason: e.to_string(),
                        })
                    })
                    .await?;

                debug!(
                    "📝 Bundle {} declares plugin '{}', engine '{}', version {}",
                    reference, entry.plugin_key, entry.engine_key, entry.version
                );

                Ok::<_, PluginLoaderError>(Arc::new(InitializedBundle { container, entry }))
            })
            .await?;

        Ok(Arc::clone(bundle))
    }

    /// Apply the configured load timeout, if any, to a remote operation
    async fn bounded<T, F>(&self, operation: String, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(limit) = self.context.load_timeout() else {
            return future.await;
        };

        match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => {
                error!("❌ {} timed out after {:?}", operation, limit);
                Err(PluginLoaderError::Timeout {
                    operation,
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        }
    }
}
