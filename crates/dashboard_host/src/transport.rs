//! Bundles declared in the host configuration.
//!
//! The host serves these from memory through [`StaticBundleTransport`], so a
//! dashboard can be exercised end to end without a bundle server. Each bundle
//! may export a [`DeclarativePlugin`] and a [`StaticEngine`].

use async_trait::async_trait;
use dashboard_event_system::{DashboardEvent, DashboardState, DashboardDispatch, EventHandlerRegistry};
use dashboard_plugin_system::{
    BoxError, BundleContainer, BundleExport, BundleReference, BundleTransport, DashboardEngine, DashboardPlugin,
    EngineFactory, EngineVersionBound, EntryDescriptor, PluginFactory, SharedScope,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{BundleSettings, DeclaredPlugin};

const PLUGIN_EXPORT: &str = "./plugin";
const ENGINE_EXPORT: &str = "./engine";

/// Plugin whose metadata and event subscriptions come from configuration
#[derive(Debug, Clone)]
pub struct DeclarativePlugin {
    settings: DeclaredPlugin,
}

impl DeclarativePlugin {
    pub fn new(settings: DeclaredPlugin) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DashboardPlugin for DeclarativePlugin {
    fn display_name(&self) -> &str {
        &self.settings.name
    }

    fn version(&self) -> &str {
        &self.settings.version
    }

    fn min_engine_version(&self) -> EngineVersionBound {
        self.settings.min_engine_version.as_str().into()
    }

    fn max_engine_version(&self) -> EngineVersionBound {
        self.settings.max_engine_version.as_str().into()
    }

    fn compatibility(&self) -> Option<&str> {
        self.settings.compatibility.as_deref()
    }

    async fn on_plugin_loaded(&self, parameters: Option<&str>) -> Result<(), BoxError> {
        if let Some(raw) = parameters {
            let parsed: serde_json::Value = serde_json::from_str(raw)?;
            info!(plugin = %self.settings.name, parameters = %parsed, "🔌 Plugin parameters applied");
        }
        Ok(())
    }

    fn register(&self, handlers: &EventHandlerRegistry) {
        for event_type in &self.settings.listen_to {
            let name = self.settings.name.clone();
            handlers.add_event_handler(
                event_type,
                Arc::new(move |event: &DashboardEvent| {
                    info!(
                        plugin = %name,
                        event_type = %event.event_type,
                        correlation_id = event.correlation_id.as_deref().unwrap_or("-"),
                        "📨 Dashboard event"
                    );
                }),
            );
        }

        if self.settings.watch_state {
            let name = self.settings.name.clone();
            handlers.subscribe_to_state_changes(Arc::new(
                move |state: &DashboardState, _dispatch: &dyn DashboardDispatch| {
                    info!(plugin = %name, state = %state, "🔄 Dashboard state changed");
                },
            ));
        }
    }

    async fn on_plugin_unload(&self) -> Result<(), BoxError> {
        debug!(plugin = %self.settings.name, "Plugin unloaded");
        Ok(())
    }
}

/// Engine that carries nothing but its version
#[derive(Debug, Clone)]
pub struct StaticEngine {
    version: String,
}

impl StaticEngine {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into() }
    }
}

#[async_trait]
impl DashboardEngine for StaticEngine {
    fn version(&self) -> &str {
        &self.version
    }
}

/// In-memory bundle built from [`BundleSettings`]
pub struct StaticBundle {
    entry: EntryDescriptor,
    exports: HashMap<String, BundleExport>,
}

impl StaticBundle {
    pub fn from_settings(settings: &BundleSettings) -> Self {
        let mut exports = HashMap::new();

        if let Some(plugin) = settings.plugin.clone() {
            let factory: PluginFactory = Arc::new(move || -> Result<Arc<dyn DashboardPlugin>, BoxError> {
                Ok(Arc::new(DeclarativePlugin::new(plugin.clone())))
            });
            exports.insert(PLUGIN_EXPORT.to_string(), BundleExport::Plugin(factory));
        }

        if let Some(version) = settings.engine_version.clone() {
            let factory: EngineFactory = Arc::new(move || -> Result<Arc<dyn DashboardEngine>, BoxError> {
                Ok(Arc::new(StaticEngine::new(version.clone())))
            });
            exports.insert(ENGINE_EXPORT.to_string(), BundleExport::Engine(factory));
        }

        Self {
            entry: EntryDescriptor {
                plugin_key: PLUGIN_EXPORT.to_string(),
                engine_key: ENGINE_EXPORT.to_string(),
                version: settings.version.clone(),
            },
            exports,
        }
    }
}

#[async_trait]
impl BundleContainer for StaticBundle {
    async fn init(&self, shared_scope: &SharedScope) -> Result<(), BoxError> {
        let modules: Vec<&str> = shared_scope.modules().iter().map(|module| module.name.as_str()).collect();
        debug!(version = %self.entry.version, ?modules, "Bundle joined shared scope");
        Ok(())
    }

    async fn get_entry(&self) -> Result<EntryDescriptor, BoxError> {
        Ok(self.entry.clone())
    }

    async fn get(&self, key: &str) -> Result<BundleExport, BoxError> {
        self.exports
            .get(key)
            .cloned()
            .ok_or_else(|| format!("bundle does not export '{key}'").into())
    }
}

/// Serves configured bundles by URL
#[derive(Default)]
pub struct StaticBundleTransport {
    bundles: HashMap<String, Arc<StaticBundle>>,
}

impl StaticBundleTransport {
    pub fn from_settings(bundles: &[BundleSettings]) -> Self {
        Self {
            bundles: bundles
                .iter()
                .map(|settings| (settings.url.clone(), Arc::new(StaticBundle::from_settings(settings))))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

#[async_trait]
impl BundleTransport for StaticBundleTransport {
    async fn fetch(&self, bundle: &BundleReference) -> Result<Arc<dyn BundleContainer>, BoxError> {
        let served = self
            .bundles
            .get(bundle.url())
            .cloned()
            .ok_or_else(|| format!("no bundle is served at {}", bundle.url()))?;
        Ok(served as Arc<dyn BundleContainer>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use dashboard_event_system::DashboardEventBus;
    use dashboard_plugin_system::{LoaderConfig, LoaderContext, BundleLoader};

    fn bundle_settings() -> BundleSettings {
        AppConfig::default().bundles.remove(0)
    }

    #[tokio::test]
    async fn test_bundle_exports_plugin_and_engine() {
        let bundle = StaticBundle::from_settings(&bundle_settings());

        let entry = bundle.get_entry().await.unwrap();
        assert_eq!(entry.version, "1.0.0");
        assert!(matches!(bundle.get(&entry.plugin_key).await, Ok(BundleExport::Plugin(_))));
        assert!(matches!(bundle.get(&entry.engine_key).await, Ok(BundleExport::Engine(_))));
        assert!(bundle.get("./missing").await.is_err());
    }

    #[tokio::test]
    async fn test_engine_export_is_optional() {
        let mut settings = bundle_settings();
        settings.engine_version = None;
        let bundle = StaticBundle::from_settings(&settings);

        assert!(bundle.get(ENGINE_EXPORT).await.is_err());
        assert!(bundle.get(PLUGIN_EXPORT).await.is_ok());
    }

    #[tokio::test]
    async fn test_transport_serves_configured_urls_through_loader() {
        let settings = bundle_settings();
        let transport = Arc::new(StaticBundleTransport::from_settings(std::slice::from_ref(&settings)));
        assert_eq!(transport.len(), 1);
        let loader = BundleLoader::new(LoaderContext::new(transport, LoaderConfig::default()));

        let plugin = loader.load_plugin(&settings.url).await.unwrap();
        let engine = loader.load_engine(&settings.url).await.unwrap();

        assert_eq!(plugin.display_name(), "Dashboard Insights");
        assert!(plugin.min_engine_version().is_bundled());
        assert_eq!(engine.version(), "8.3.0");
        assert!(loader.load_plugin("/plugins/unknown.js").await.is_err());
    }

    #[test]
    fn test_declared_plugin_registers_listeners() {
        let mut settings = bundle_settings().plugin.unwrap();
        settings.listen_to = vec!["GDC.DASH/EVT.SAVED".to_string(), "GDC.DASH/EVT.INITIALIZED".to_string()];
        let plugin = DeclarativePlugin::new(settings);

        let registry = EventHandlerRegistry::new();
        plugin.register(&registry);
        assert_eq!(registry.handler_count(), 2);
        assert_eq!(registry.state_changes().len(), 1);

        let bus = Arc::new(DashboardEventBus::new());
        bus.connect(&registry).unwrap();
        assert_eq!(bus.emit(&DashboardEvent::new("GDC.DASH/EVT.SAVED")), 1);
        assert_eq!(bus.emit(&DashboardEvent::new("GDC.DASH/EVT.EXPORTED")), 0);
    }

    #[tokio::test]
    async fn test_malformed_parameters_fail_on_load() {
        let plugin = DeclarativePlugin::new(bundle_settings().plugin.unwrap());

        assert!(plugin.on_plugin_loaded(Some(r#"{"highlight":"revenue"}"#)).await.is_ok());
        assert!(plugin.on_plugin_loaded(None).await.is_ok());
        assert!(plugin.on_plugin_loaded(Some("{not json")).await.is_err());
    }
}
