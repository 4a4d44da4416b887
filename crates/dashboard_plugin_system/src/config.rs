//! Loader configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::bundle::parse_bundle_url;

/// A capability the host process shares with every bundle during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SharedModule {
    pub name: String,
    pub version: String,
}

impl SharedModule {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Settings that control how bundles are fetched and reconciled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Upper bound for a single remote fetch or entry call; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_timeout_ms: Option<u64>,
    /// Legacy global-scope scripts side-loaded before any plugin
    #[serde(default)]
    pub before_load_scripts: Vec<String>,
    #[serde(default = "default_true")]
    pub filter_incompatible_plugins: bool,
    /// Shared-capability set offered to each bundle once
    #[serde(default = "default_shared_modules")]
    pub shared_modules: Vec<SharedModule>,
}

fn default_shared_modules() -> Vec<SharedModule> {
    vec![SharedModule::new(
        "dashboard_event_system",
        dashboard_event_system::DASHBOARD_EVENT_SYSTEM_VERSION,
    )]
}

fn default_true() -> bool {
    true
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: None,
            before_load_scripts: Vec::new(),
            filter_incompatible_plugins: true,
            shared_modules: default_shared_modules(),
        }
    }
}

impl LoaderConfig {
    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.load_timeout_ms == Some(0) {
            return Err("load_timeout_ms must be greater than 0 when set".to_string());
        }

        let mut seen = HashSet::new();
        for module in &self.shared_modules {
            if module.name.trim().is_empty() {
                return Err("Shared module name cannot be empty".to_string());
            }
            if !seen.insert(module.name.as_str()) {
                return Err(format!("Shared module '{}' is declared more than once", module.name));
            }
        }

        for script in &self.before_load_scripts {
            parse_bundle_url(script).map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}
