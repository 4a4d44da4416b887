//! Bundle addressing and the contracts a loadable bundle exposes.
//!
//! A bundle is an independently deployed unit of code addressed by URL. Its
//! logical module name is derived from the URL and is the key under which the
//! loaded plugin and engine are cached.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::{ParseError, Url};

use crate::config::SharedModule;
use crate::engine::DashboardEngine;
use crate::error::{BoxError, PluginLoaderError, Result};
use crate::plugin::DashboardPlugin;

/// Base used to resolve host-relative bundle URLs such as `/plugins/kpi.js`
const RELATIVE_URL_BASE: &str = "http://localhost";

/// Parse a bundle or script URL. Host-relative paths are accepted.
pub fn parse_bundle_url(url: &str) -> Result<Url> {
    let invalid = |reason: String| PluginLoaderError::InvalidBundleUrl {
        url: url.to_string(),
        reason,
    };

    match Url::parse(url) {
        Ok(parsed) => Ok(parsed),
        Err(ParseError::RelativeUrlWithoutBase) if url.starts_with('/') => Url::parse(RELATIVE_URL_BASE)
            .and_then(|base| base.join(url))
            .map_err(|e| invalid(e.to_string())),
        Err(e) => Err(invalid(e.to_string())),
    }
}

/// A bundle URL together with its derived logical module name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleReference {
    url: String,
    module_name: String,
}

impl BundleReference {
    /// Derive the module name from the final path segment, minus a `.js`/`.mjs` extension
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = parse_bundle_url(url)?;
        let segment = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        let module_name = segment
            .strip_suffix(".mjs")
            .or_else(|| segment.strip_suffix(".js"))
            .unwrap_or(segment);

        if module_name.is_empty() {
            return Err(PluginLoaderError::InvalidBundleUrl {
                url: url.to_string(),
                reason: "URL has no final path segment to derive a module name from".to_string(),
            });
        }

        Ok(Self {
            url: url.to_string(),
            module_name: module_name.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }
}

impl fmt::Display for BundleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.module_name, self.url)
    }
}

/// Metadata a bundle exposes before any of its factories run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDescriptor {
    pub plugin_key: String,
    pub engine_key: String,
    pub version: String,
}

/// Zero-argument constructor for a plugin instance
pub type PluginFactory = Arc<dyn Fn() -> std::result::Result<Arc<dyn DashboardPlugin>, BoxError> + Send + Sync>;

/// Zero-argument constructor for an engine instance
pub type EngineFactory = Arc<dyn Fn() -> std::result::Result<Arc<dyn DashboardEngine>, BoxError> + Send + Sync>;

/// What a bundle hands out for a factory key
#[derive(Clone)]
pub enum BundleExport {
    Plugin(PluginFactory),
    Engine(EngineFactory),
}

impl BundleExport {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Plugin(_) => "plugin factory",
            Self::Engine(_) => "engine factory",
        }
    }
}

impl fmt::Debug for BundleExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// The process's shared-capability set, handed to each bundle once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedScope {
    modules: Vec<SharedModule>,
}

impl SharedScope {
    pub fn new(modules: Vec<SharedModule>) -> Self {
        Self { modules }
    }

    pub fn modules(&self) -> &[SharedModule] {
        &self.modules
    }

    pub fn get(&self, name: &str) -> Option<&SharedModule> {
        self.modules.iter().find(|module| module.name == name)
    }
}

/// A fetched bundle.
///
/// `init` must be called exactly once before `get_entry` or `get`; the loader
/// guarantees this per URL.
#[async_trait]
pub trait BundleContainer: Send + Sync {
    async fn init(&self, shared_scope: &SharedScope) -> std::result::Result<(), BoxError>;

    async fn get_entry(&self) -> std::result::Result<EntryDescriptor, BoxError>;

    async fn get(&self, key: &str) -> std::result::Result<BundleExport, BoxError>;
}

/// Fetches bundle code given its address
#[async_trait]
pub trait BundleTransport: Send + Sync {
    async fn fetch(&self, bundle: &BundleReference) -> std::result::Result<Arc<dyn BundleContainer>, BoxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_name_derivation() {
        let reference = BundleReference::parse("https://cdn.example.com/plugins/kpi_plugin.js").unwrap();
        assert_eq!(reference.module_name(), "kpi_plugin");
        assert_eq!(reference.url(), "https://cdn.example.com/plugins/kpi_plugin.js");

        let esm = BundleReference::parse("https://cdn.example.com/v2/kpi_plugin.mjs?build=42").unwrap();
        assert_eq!(esm.module_name(), "kpi_plugin");

        let bare = BundleReference::parse("https://cdn.example.com/dash_plugin").unwrap();
        assert_eq!(bare.module_name(), "dash_plugin");
    }

    #[test]
    fn test_host_relative_urls_are_accepted() {
        let reference = BundleReference::parse("/plugins/table_plugin.js").unwrap();
        assert_eq!(reference.module_name(), "table_plugin");
        assert_eq!(reference.url(), "/plugins/table_plugin.js");
    }

    #[test]
    fn test_malformed_urls_are_rejected() {
        for url in ["plugins/kpi.js", "https://", "https://cdn.example.com/", "https://cdn.example.com/.js"] {
            let error = BundleReference::parse(url).unwrap_err();
            assert!(
                matches!(error, PluginLoaderError::InvalidBundleUrl { .. }),
                "expected {url} to be rejected"
            );
        }
    }

    #[test]
    fn test_entry_descriptor_wire_format() {
        let entry: EntryDescriptor = serde_json::from_str(
            r#"{ "pluginKey": "./plugin", "engineKey": "./engine", "version": "3.2.0" }"#,
        )
        .unwrap();
        assert_eq!(entry.plugin_key, "./plugin");
        assert_eq!(entry.engine_key, "./engine");
        assert_eq!(entry.version, "3.2.0");
    }

    #[test]
    fn test_shared_scope_lookup() {
        let scope = SharedScope::new(vec![SharedModule::new("dashboard_event_system", "0.1.0")]);
        assert_eq!(scope.get("dashboard_event_system").map(|m| m.version.as_str()), Some("0.1.0"));
        assert!(scope.get("react").is_none());
    }
}
