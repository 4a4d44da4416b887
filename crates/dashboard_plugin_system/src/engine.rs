//! Engine contract: the shared runtime a session's plugins are installed into

use async_trait::async_trait;
use dashboard_event_system::EventHandlerRegistry;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, info};

use crate::plugin::ReadyPlugin;

/// Outcome of installing plugins into an engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub failed: Vec<String>,
}

/// The runtime contract version plugins are built against.
///
/// The provided `install_plugins` installs plugins one at a time in link
/// order: a plugin's `on_plugin_loaded` is awaited and, if it succeeds, the
/// plugin registers before the next plugin's load hook runs. A failing or
/// panicking plugin is logged and skipped; the rest are still installed.
#[async_trait]
pub trait DashboardEngine: Send + Sync {
    fn version(&self) -> &str;

    async fn install_plugins(&self, plugins: &[ReadyPlugin], handlers: &EventHandlerRegistry) -> InstallReport {
        let mut report = InstallReport::default();

        for ready in plugins {
            let name = ready.plugin.display_name().to_string();
            let instance = ready.plugin.instance();

            if let Err(e) = instance.on_plugin_loaded(ready.parameters.as_deref()).await {
                error!("❌ Plugin {} failed in on_plugin_loaded: {}", name, e);
                report.failed.push(name);
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| instance.register(handlers))) {
                Ok(()) => {
                    info!("✅ Plugin installed: {} v{}", name, ready.plugin.version());
                    report.installed.push(name);
                }
                Err(_) => {
                    error!("❌ Plugin {} panicked during registration", name);
                    report.failed.push(name);
                }
            }
        }

        report
    }

    /// Run unload hooks in reverse installation order
    async fn uninstall_plugins(&self, plugins: &[ReadyPlugin]) {
        for ready in plugins.iter().rev() {
            if let Err(e) = ready.plugin.instance().on_plugin_unload().await {
                error!("❌ Plugin {} failed to unload: {}", ready.plugin.display_name(), e);
            }
        }
    }
}
