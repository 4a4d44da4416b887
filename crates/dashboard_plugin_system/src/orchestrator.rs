//! Turns a dashboard's ordered plugin links into ready-to-install plugins

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PluginLoaderError, Result};
use crate::loader::BundleLoader;
use crate::plugin::{DashboardPluginDescriptor, DashboardPluginLink, LoadedPlugin, ReadyPlugin};

/// Loads plugin links in order and resolves their engine bounds
pub struct PluginOrchestrator {
    loader: Arc<BundleLoader>,
}

impl PluginOrchestrator {
    pub fn new(loader: Arc<BundleLoader>) -> Self {
        Self { loader }
    }

    /// Load the plugin behind every link, in link order.
    ///
    /// Links are processed strictly one after another: a plugin's load
    /// (factory invocation included) finishes before the next link starts, so
    /// later plugins can rely on side effects of earlier ones.
    ///
    /// # Arguments
    ///
    /// * `referenced_plugins` - Plugins the dashboard references
    /// * `plugin_links` - Links to install, each pointing at one of the
    ///   `referenced_plugins` records by identity
    ///
    /// # Returns
    ///
    /// One [`ReadyPlugin`] per link, in link order, with any "bundled" engine
    /// bound replaced by the bundle's own engine version.
    pub async fn load_plugins(
        &self,
        referenced_plugins: &[Arc<DashboardPluginDescriptor>],
        plugin_links: &[DashboardPluginLink],
    ) -> Result<Vec<ReadyPlugin>> {
        let mut ready = Vec::with_capacity(plugin_links.len());

        for link in plugin_links {
            let descriptor = referenced_plugins
                .iter()
                .find(|candidate| Arc::ptr_eq(candidate, &link.plugin))
                .ok_or_else(|| PluginLoaderError::ReferencedPluginMissing(link.plugin.identifier.clone()))?;

            let plugin = self.load_link_plugin(descriptor).await?;
            debug!(
                "📝 Plugin link {} resolved to {} (engine {} - {})",
                descriptor.identifier,
                plugin.display_name(),
                plugin.min_engine_version(),
                plugin.max_engine_version()
            );

            ready.push(ReadyPlugin {
                plugin,
                parameters: link.parameters.clone(),
            });
        }

        info!("🔌 {} plugin link(s) loaded", ready.len());
        Ok(ready)
    }

    async fn load_link_plugin(&self, descriptor: &DashboardPluginDescriptor) -> Result<LoadedPlugin> {
        let plugin = LoadedPlugin::new(self.loader.load_plugin(&descriptor.url).await?);

        if plugin.compatibility().is_some() || !plugin.engine_range().has_bundled_bound() {
            return Ok(plugin);
        }

        let engine = self.loader.load_engine(&descriptor.url).await?;
        debug!(
            "🔧 Resolved 'bundled' engine bound of {} to v{}",
            plugin.display_name(),
            engine.version()
        );
        Ok(plugin.with_bundled_engine_version(engine.version()))
    }
}
