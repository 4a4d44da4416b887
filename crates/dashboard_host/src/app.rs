//! Main application logic and lifecycle management.
//!
//! The `Application` loads one dashboard session: it fetches the configured
//! plugin bundles, resolves the engine, installs the plugins, hands their
//! handlers over to the event bus and finally tears the session down again.

use crate::{cli::CliArgs, config::AppConfig, logging::display_banner, transport::StaticBundleTransport};
use dashboard_event_system::{
    DashboardCommand, DashboardDispatch, DashboardEvent, DashboardEventBus, EventBusStats, EventHandlerRegistry,
};
use dashboard_plugin_system::{DashboardLoader, DashboardPluginDescriptor, DashboardPluginLink, LoaderContext};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const INITIALIZED_EVENT: &str = "GDC.DASH/EVT.INITIALIZED";

/// Command sink that only reports what plugins asked for
struct LoggingDispatch;

impl DashboardDispatch for LoggingDispatch {
    fn dispatch(&self, command: DashboardCommand) {
        info!(command_type = %command.command_type, payload = %command.payload, "📤 Plugin dispatched command");
    }
}

/// What a single dashboard session did
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub engine_version: Option<String>,
    pub installed: Vec<String>,
    pub failed: Vec<String>,
    pub incompatible: Vec<String>,
    pub state_subscribers_notified: usize,
    pub bus: EventBusStats,
}

pub struct Application {
    config: AppConfig,
}

impl Application {
    /// Loads configuration, applies command-line overrides and validates the result.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Some(timeout_ms) = args.timeout_ms {
            config.loader.load_timeout_ms = Some(timeout_ms);
        }

        let app = Self::from_config(config)?;
        display_banner();
        Ok(app)
    }

    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");
        Ok(Self { config })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting dashboard session");
        self.log_configuration_summary();

        let report = self.run_session().await?;
        log_final_statistics(&report);

        info!("✅ Dashboard session complete");
        Ok(())
    }

    /// Load, install and exercise the configured dashboard once.
    pub async fn run_session(&self) -> Result<SessionReport, Box<dyn std::error::Error>> {
        let transport = Arc::new(StaticBundleTransport::from_settings(&self.config.bundles));
        let loader = DashboardLoader::new(LoaderContext::new(transport, self.config.loader.clone()));

        let (referenced, links) = self.dashboard_links();
        let dashboard = loader.load(&referenced, &links).await?;

        let registry = EventHandlerRegistry::new();
        let install = dashboard.install(&registry).await;
        if !install.failed.is_empty() {
            warn!("⚠️ {} plugin(s) failed to install: {:?}", install.failed.len(), install.failed);
        }

        let bus = Arc::new(DashboardEventBus::new());
        let state_changes = bus.connect(&registry)?;

        let correlation_id = Uuid::new_v4().to_string();
        let handled = bus.emit(
            &DashboardEvent::new(INITIALIZED_EVENT)
                .with_correlation_id(correlation_id.clone())
                .with_payload(json!({ "plugins": &install.installed })),
        );
        info!("📣 {} delivered to {} handler(s) [{}]", INITIALIZED_EVENT, handled, correlation_id);

        let notified = state_changes.notify(
            &json!({ "status": "loaded", "correlationId": correlation_id }),
            &LoggingDispatch,
        );

        dashboard.uninstall().await;
        let cache = loader.context().cache();
        info!(
            "🗂️ Load cache holds {} module(s) from {} bundle(s); {} plugin conflict(s)",
            cache.len(),
            cache.initialized_bundle_count(),
            cache.plugin_conflict_count()
        );

        Ok(SessionReport {
            engine_version: dashboard.engine.as_ref().map(|engine| engine.version().to_string()),
            installed: install.installed,
            failed: install.failed,
            incompatible: dashboard.incompatible.clone(),
            state_subscribers_notified: notified,
            bus: bus.stats(),
        })
    }

    /// The referenced plugin records and the links pointing at them.
    ///
    /// Links to the same identifier share one descriptor.
    fn dashboard_links(&self) -> (Vec<Arc<DashboardPluginDescriptor>>, Vec<DashboardPluginLink>) {
        let mut referenced: Vec<Arc<DashboardPluginDescriptor>> = Vec::new();
        let mut by_identifier: HashMap<&str, Arc<DashboardPluginDescriptor>> = HashMap::new();
        let mut links = Vec::with_capacity(self.config.plugins.len());

        for settings in &self.config.plugins {
            let descriptor = by_identifier
                .entry(settings.identifier.as_str())
                .or_insert_with(|| {
                    let descriptor = Arc::new(DashboardPluginDescriptor::new(&settings.identifier, &settings.url));
                    referenced.push(descriptor.clone());
                    descriptor
                })
                .clone();

            let link = DashboardPluginLink::new(&descriptor);
            links.push(match &settings.parameters {
                Some(parameters) => link.with_parameters(parameters.clone()),
                None => link,
            });
        }

        (referenced, links)
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🔌 Plugin links: {}", self.config.plugins.len());
        info!("  📦 Served bundles: {}", self.config.bundles.len());
        match self.config.loader.load_timeout_ms {
            Some(timeout_ms) => info!("  ⏱️ Load timeout: {}ms", timeout_ms),
            None => info!("  ⏱️ Load timeout: unbounded"),
        }
        info!("  🧹 Filter incompatible plugins: {}", self.config.loader.filter_incompatible_plugins);
    }
}

fn log_final_statistics(report: &SessionReport) {
    info!("📊 Final Statistics:");
    info!("  - Engine: {}", report.engine_version.as_deref().unwrap_or("none"));
    info!("  - Plugins installed: {}", report.installed.len());
    info!("  - Plugins dropped as incompatible: {}", report.incompatible.len());
    info!("  - Events emitted: {}", report.bus.events_emitted);
    info!("  - Events handled: {}", report.bus.events_handled);
    info!("  - Handler failures: {}", report.bus.handler_failures);
}
