//! Top-level dashboard loading flow

use dashboard_event_system::EventHandlerRegistry;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::LoaderContext;
use crate::engine::{DashboardEngine, InstallReport};
use crate::error::{PluginLoaderError, Result};
use crate::loader::BundleLoader;
use crate::orchestrator::PluginOrchestrator;
use crate::plugin::{DashboardPluginDescriptor, DashboardPluginLink, ReadyPlugin};
use crate::resolver::{filter_compatible_plugins, EngineCompatibilityResolver, EngineResolver, HighestVersionEngineResolver};
use crate::side_load::{side_load_scripts, ScriptHost};

/// Result of loading a dashboard's plugins
#[derive(Default)]
pub struct LoadedDashboard {
    /// `None` when the dashboard references no plugins
    pub engine: Option<Arc<dyn DashboardEngine>>,
    pub plugins: Vec<ReadyPlugin>,
    /// Display names of plugins dropped as incompatible with the engine
    pub incompatible: Vec<String>,
}

impl LoadedDashboard {
    /// Install the loaded plugins into the engine
    pub async fn install(&self, handlers: &EventHandlerRegistry) -> InstallReport {
        match &self.engine {
            Some(engine) => engine.install_plugins(&self.plugins, handlers).await,
            None => InstallReport::default(),
        }
    }

    pub async fn uninstall(&self) {
        if let Some(engine) = &self.engine {
            engine.uninstall_plugins(&self.plugins).await;
        }
    }
}

impl std::fmt::Debug for LoadedDashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDashboard")
            .field("engine", &self.engine.as_ref().map(|engine| engine.version().to_string()))
            .field("plugins", &self.plugins)
            .field("incompatible", &self.incompatible)
            .finish()
    }
}

/// Side-loads legacy scripts, resolves the engine and loads plugin links
pub struct DashboardLoader {
    context: LoaderContext,
    orchestrator: PluginOrchestrator,
    engine_resolver: EngineResolver,
    script_host: Option<Arc<dyn ScriptHost>>,
}

impl DashboardLoader {
    pub fn new(context: LoaderContext) -> Self {
        Self::with_resolver(context, Arc::new(HighestVersionEngineResolver))
    }

    pub fn with_resolver(context: LoaderContext, resolver: Arc<dyn EngineCompatibilityResolver>) -> Self {
        let loader = Arc::new(BundleLoader::new(context.clone()));
        Self {
            context,
            orchestrator: PluginOrchestrator::new(Arc::clone(&loader)),
            engine_resolver: EngineResolver::new(loader, resolver),
            script_host: None,
        }
    }

    pub fn with_script_host(mut self, host: Arc<dyn ScriptHost>) -> Self {
        self.script_host = Some(host);
        self
    }

    pub fn context(&self) -> &LoaderContext {
        &self.context
    }

    pub async fn load(
        &self,
        referenced_plugins: &[Arc<DashboardPluginDescriptor>],
        plugin_links: &[DashboardPluginLink],
    ) -> Result<LoadedDashboard> {
        self.side_load().await?;

        if referenced_plugins.is_empty() {
            if let Some(link) = plugin_links.first() {
                return Err(PluginLoaderError::ReferencedPluginMissing(link.plugin.identifier.clone()));
            }
            info!("📂 Dashboard references no plugins");
            return Ok(LoadedDashboard::default());
        }

        let engine = self.engine_resolver.resolve_engine(referenced_plugins).await?;
        let plugins = self.orchestrator.load_plugins(referenced_plugins, plugin_links).await?;

        let (plugins, incompatible) = if self.context.config().filter_incompatible_plugins {
            filter_compatible_plugins(engine.as_ref(), plugins)
        } else {
            (plugins, Vec::new())
        };

        info!(
            "🎉 Dashboard plugins ready: {} loaded, {} incompatible, engine v{}",
            plugins.len(),
            incompatible.len(),
            engine.version()
        );

        Ok(LoadedDashboard {
            engine: Some(engine),
            plugins,
            incompatible,
        })
    }

    async fn side_load(&self) -> Result<()> {
        let scripts = &self.context.config().before_load_scripts;
        if scripts.is_empty() {
            return Ok(());
        }

        match &self.script_host {
            Some(host) => side_load_scripts(host.as_ref(), scripts, self.context.load_timeout()).await,
            None => {
                warn!("⚠️ {} before-load script(s) configured but no script host is available", scripts.len());
                Err(PluginLoaderError::Config(
                    "before_load_scripts requires a script host".to_string(),
                ))
            }
        }
    }
}
