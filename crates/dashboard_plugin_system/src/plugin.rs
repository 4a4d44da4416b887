//! Plugin contract, compatibility bounds and the loaded-plugin overlay

use async_trait::async_trait;
use dashboard_event_system::EventHandlerRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;
use crate::version::{Version, VersionRange};

/// Sentinel meaning "the version declared by this plugin's own bundled engine"
pub const BUNDLED_ENGINE_VERSION: &str = "bundled";

/// One end of a plugin's engine compatibility range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EngineVersionBound {
    Bundled,
    Version(String),
}

impl EngineVersionBound {
    pub fn is_bundled(&self) -> bool {
        matches!(self, Self::Bundled)
    }

    /// Substitute the sentinel with `engine_version`
    pub fn resolve_bundled(&self, engine_version: &str) -> Self {
        match self {
            Self::Bundled => Self::Version(engine_version.to_string()),
            other => other.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Bundled => BUNDLED_ENGINE_VERSION,
            Self::Version(version) => version,
        }
    }
}

impl From<&str> for EngineVersionBound {
    fn from(value: &str) -> Self {
        if value == BUNDLED_ENGINE_VERSION {
            Self::Bundled
        } else {
            Self::Version(value.to_string())
        }
    }
}

impl From<String> for EngineVersionBound {
    fn from(value: String) -> Self {
        if value == BUNDLED_ENGINE_VERSION {
            Self::Bundled
        } else {
            Self::Version(value)
        }
    }
}

impl From<EngineVersionBound> for String {
    fn from(bound: EngineVersionBound) -> Self {
        bound.as_str().to_string()
    }
}

impl fmt::Display for EngineVersionBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<&str> for EngineVersionBound {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Inclusive `[min, max]` engine compatibility of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCompatibilityRange {
    pub min: EngineVersionBound,
    pub max: EngineVersionBound,
}

impl EngineCompatibilityRange {
    pub fn new(min: impl Into<EngineVersionBound>, max: impl Into<EngineVersionBound>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn has_bundled_bound(&self) -> bool {
        self.min.is_bundled() || self.max.is_bundled()
    }

    pub fn resolve_bundled(&self, engine_version: &str) -> Self {
        Self {
            min: self.min.resolve_bundled(engine_version),
            max: self.max.resolve_bundled(engine_version),
        }
    }

    /// Range of concrete versions; `None` while a sentinel is unresolved or a bound is unparseable
    pub fn to_version_range(&self) -> Option<VersionRange> {
        match (&self.min, &self.max) {
            (EngineVersionBound::Version(min), EngineVersionBound::Version(max)) => {
                Some(VersionRange::between(&Version::parse(min).ok()?, &Version::parse(max).ok()?))
            }
            _ => None,
        }
    }
}

/// A dashboard plugin.
///
/// Lifecycle: constructed by its bundle's factory, `on_plugin_loaded` is
/// awaited with the link parameters, then `register` wires its customizations
/// and event handlers. `on_plugin_unload` runs when the dashboard goes away.
#[async_trait]
pub trait DashboardPlugin: Send + Sync {
    fn display_name(&self) -> &str;

    fn version(&self) -> &str;

    fn min_engine_version(&self) -> EngineVersionBound;

    fn max_engine_version(&self) -> EngineVersionBound;

    /// Explicit engine range expression (e.g. `">=8.0.0 <9.0.0"`).
    ///
    /// When present it takes precedence over the min/max bounds and no
    /// sentinel resolution happens.
    fn compatibility(&self) -> Option<&str> {
        None
    }

    async fn on_plugin_loaded(&self, _parameters: Option<&str>) -> Result<(), BoxError> {
        Ok(())
    }

    fn register(&self, handlers: &EventHandlerRegistry);

    async fn on_plugin_unload(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A loaded plugin instance plus its effective engine compatibility.
///
/// Resolving the "bundled" sentinel produces a new `LoadedPlugin` that
/// shares the same instance; the instance itself is never mutated.
#[derive(Clone)]
pub struct LoadedPlugin {
    instance: Arc<dyn DashboardPlugin>,
    engine_range: EngineCompatibilityRange,
}

impl LoadedPlugin {
    pub fn new(instance: Arc<dyn DashboardPlugin>) -> Self {
        let engine_range = EngineCompatibilityRange {
            min: instance.min_engine_version(),
            max: instance.max_engine_version(),
        };
        Self { instance, engine_range }
    }

    pub fn with_bundled_engine_version(&self, engine_version: &str) -> Self {
        Self {
            instance: Arc::clone(&self.instance),
            engine_range: self.engine_range.resolve_bundled(engine_version),
        }
    }

    pub fn instance(&self) -> &Arc<dyn DashboardPlugin> {
        &self.instance
    }

    pub fn display_name(&self) -> &str {
        self.instance.display_name()
    }

    pub fn version(&self) -> &str {
        self.instance.version()
    }

    pub fn min_engine_version(&self) -> &EngineVersionBound {
        &self.engine_range.min
    }

    pub fn max_engine_version(&self) -> &EngineVersionBound {
        &self.engine_range.max
    }

    pub fn engine_range(&self) -> &EngineCompatibilityRange {
        &self.engine_range
    }

    pub fn compatibility(&self) -> Option<&str> {
        self.instance.compatibility()
    }

    pub fn is_same_instance(&self, other: &LoadedPlugin) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.display_name())
            .field("version", &self.version())
            .field("engine_range", &self.engine_range)
            .finish()
    }
}

/// A plugin the dashboard references, addressed by its bundle URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardPluginDescriptor {
    pub identifier: String,
    pub url: String,
}

impl DashboardPluginDescriptor {
    pub fn new(identifier: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            url: url.into(),
        }
    }
}

/// A dashboard's use of a referenced plugin, with optional parameters.
///
/// `plugin` must be one of the `Arc`s in the referenced plugin list; links are
/// matched by pointer, not by value.
#[derive(Debug, Clone)]
pub struct DashboardPluginLink {
    pub plugin: Arc<DashboardPluginDescriptor>,
    pub parameters: Option<String>,
}

impl DashboardPluginLink {
    pub fn new(plugin: &Arc<DashboardPluginDescriptor>) -> Self {
        Self {
            plugin: Arc::clone(plugin),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = Some(parameters.into());
        self
    }
}

/// A loaded plugin ready for installation, with its link parameters
#[derive(Debug, Clone)]
pub struct ReadyPlugin {
    pub plugin: LoadedPlugin,
    pub parameters: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticPlugin;

    #[async_trait]
    impl DashboardPlugin for StaticPlugin {
        fn display_name(&self) -> &str {
            "static"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn min_engine_version(&self) -> EngineVersionBound {
            EngineVersionBound::Bundled
        }

        fn max_engine_version(&self) -> EngineVersionBound {
            "9.0.0".into()
        }

        fn register(&self, _handlers: &EventHandlerRegistry) {}
    }

    #[test]
    fn test_bound_serialization() {
        let range: EngineCompatibilityRange =
            serde_json::from_str(r#"{ "min": "bundled", "max": "8.4.0" }"#).unwrap();
        assert!(range.min.is_bundled());
        assert_eq!(range.max, "8.4.0");
        assert_eq!(
            serde_json::to_value(&range).unwrap(),
            serde_json::json!({ "min": "bundled", "max": "8.4.0" })
        );
    }

    #[test]
    fn test_version_range_needs_resolved_bounds() {
        let range = EngineCompatibilityRange::new("bundled", "8.4.0");
        assert!(range.to_version_range().is_none());

        let resolved = range.resolve_bundled("8.1.0").to_version_range().unwrap();
        assert!(resolved.matches(&Version::new(8, 2, 0)));
        assert!(!resolved.matches(&Version::new(8, 0, 9)));
    }

    #[test]
    fn test_overlay_keeps_instance() {
        let loaded = LoadedPlugin::new(Arc::new(StaticPlugin));
        let resolved = loaded.with_bundled_engine_version("3.2.0");

        assert!(loaded.min_engine_version().is_bundled());
        assert_eq!(*resolved.min_engine_version(), "3.2.0");
        assert_eq!(*resolved.max_engine_version(), "9.0.0");
        assert!(resolved.is_same_instance(&loaded));
        assert_eq!(resolved.display_name(), "static");
    }
}
