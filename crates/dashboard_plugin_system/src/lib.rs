//! Plugin and engine loading for dashboards.
//!
//! Plugins are independently built, versioned bundles addressed by URL. This
//! crate fetches them, instantiates each logical module's plugin and engine
//! exactly once per [`LoadCache`], resolves the single engine a session runs
//! on and hands back plugins in link order, ready to install.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod context;
pub mod dashboard_loader;
pub mod engine;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod plugin;
pub mod resolver;
pub mod side_load;
pub mod version;

#[cfg(test)]
mod tests;

pub use bundle::{
    parse_bundle_url, BundleContainer, BundleExport, BundleReference, BundleTransport, EngineFactory,
    EntryDescriptor, PluginFactory, SharedScope,
};
pub use cache::{CachedEngine, CachedPlugin, LoadCache, LoadCacheEntry};
pub use config::{LoaderConfig, SharedModule};
pub use context::LoaderContext;
pub use dashboard_loader::{DashboardLoader, LoadedDashboard};
pub use engine::{DashboardEngine, InstallReport};
pub use error::{BoxError, PluginLoaderError, Result};
pub use loader::BundleLoader;
pub use orchestrator::PluginOrchestrator;
pub use plugin::{
    DashboardPlugin, DashboardPluginDescriptor, DashboardPluginLink, EngineCompatibilityRange, EngineVersionBound,
    LoadedPlugin, ReadyPlugin, BUNDLED_ENGINE_VERSION,
};
pub use resolver::{
    filter_compatible_plugins, EngineCandidate, EngineCompatibilityResolver, EngineResolver,
    HighestVersionEngineResolver,
};
pub use side_load::{side_load_scripts, ScriptHandle, ScriptHost};
pub use version::{Version, VersionRange};

/// Re-export the eventing types plugins register against
pub use dashboard_event_system::{DashboardEvent, EventHandlerRegistry};
