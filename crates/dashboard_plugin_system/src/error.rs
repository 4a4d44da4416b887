//! Error types for the plugin loader.

use thiserror::Error;

/// Error produced by a bundle, a transport or a plugin/engine factory
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PluginLoaderError {
    #[error("Invalid bundle URL '{url}': {reason}")]
    InvalidBundleUrl { url: String, reason: String },

    #[error("Plugin link '{0}' does not match any referenced plugin")]
    ReferencedPluginMissing(String),

    #[error("Dynamic load failed: {url}")]
    DynamicLoadFailed { url: String, reason: String },

    #[error("Engine factory failed for module '{module}' ({url}): {reason}")]
    EngineFactoryFailed {
        module: String,
        url: String,
        reason: String,
    },

    #[error("Plugin factory failed for module '{module}' ({url}): {reason}")]
    PluginFactoryFailed {
        module: String,
        url: String,
        reason: String,
    },

    #[error("Bundle transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Bundle entry error for {url}: {reason}")]
    Entry { url: String, reason: String },

    #[error("Bundle {url} exported something other than {expected} under key '{key}'")]
    UnexpectedExport {
        url: String,
        key: String,
        expected: &'static str,
    },

    #[error("Engine resolution requires at least one referenced plugin")]
    NoPluginsReferenced,

    #[error("Engine resolution failed: {0}")]
    EngineResolution(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Loader configuration error: {0}")]
    Config(String),
}

impl PluginLoaderError {
    /// Configuration errors are invariant violations and never worth retrying
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidBundleUrl { .. } | Self::ReferencedPluginMissing(_) | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PluginLoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_load_failed_names_url() {
        let error = PluginLoaderError::DynamicLoadFailed {
            url: "https://cdn.example.com/legacy.js".to_string(),
            reason: "404".to_string(),
        };
        assert_eq!(error.to_string(), "Dynamic load failed: https://cdn.example.com/legacy.js");
        assert!(!error.is_configuration_error());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(PluginLoaderError::ReferencedPluginMissing("kpi-plugin".to_string()).is_configuration_error());
        assert!(PluginLoaderError::InvalidBundleUrl {
            url: "::".to_string(),
            reason: "relative URL without a base".to_string(),
        }
        .is_configuration_error());
        assert!(!PluginLoaderError::NoPluginsReferenced.is_configuration_error());
    }
}
