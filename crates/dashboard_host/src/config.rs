//! Configuration management for the dashboard host.
//!
//! Loads the TOML configuration: logging, loader settings, the dashboard's
//! plugin links and the bundles the host serves itself.

use dashboard_plugin_system::{BundleReference, LoaderConfig, BUNDLED_ENGINE_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bundled_bound() -> String {
    BUNDLED_ENGINE_VERSION.to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub loader: LoaderConfig,
    /// The dashboard's plugin links, in load order
    #[serde(default)]
    pub plugins: Vec<PluginSettings>,
    /// Bundles served by the host's built-in transport
    #[serde(default)]
    pub bundles: Vec<BundleSettings>,
}

/// Logging configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

/// A plugin link: which plugin the dashboard uses, with what parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    pub identifier: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
}

/// A bundle the host serves without going to the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSettings {
    pub url: String,
    /// Version the bundle's entry declares
    pub version: String,
    /// Version of the co-located engine; no engine export when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<DeclaredPlugin>,
}

/// A plugin described entirely by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredPlugin {
    pub name: String,
    pub version: String,
    #[serde(default = "default_bundled_bound")]
    pub min_engine_version: String,
    #[serde(default = "default_bundled_bound")]
    pub max_engine_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<String>,
    /// Event types the plugin reports on; `"*"` for all
    #[serde(default)]
    pub listen_to: Vec<String>,
    /// Report every dashboard state change
    #[serde(default)]
    pub watch_state: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let url = "/plugins/dashboard_insights.js".to_string();
        Self {
            logging: LoggingSettings::default(),
            loader: LoaderConfig::default(),
            plugins: vec![PluginSettings {
                identifier: "dashboard-insights".to_string(),
                url: url.clone(),
                parameters: Some(r#"{"highlight":"revenue"}"#.to_string()),
            }],
            bundles: vec![BundleSettings {
                url,
                version: "1.0.0".to_string(),
                engine_version: Some("8.3.0".to_string()),
                plugin: Some(DeclaredPlugin {
                    name: "Dashboard Insights".to_string(),
                    version: "1.0.0".to_string(),
                    min_engine_version: default_bundled_bound(),
                    max_engine_version: "8.9.0".to_string(),
                    compatibility: None,
                    listen_to: vec!["*".to_string()],
                    watch_state: true,
                }),
            }],
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, writing the default if the file is missing.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        self.loader.validate().map_err(|e| format!("Invalid loader settings: {e}"))?;

        let mut served = HashSet::new();
        for bundle in &self.bundles {
            BundleReference::parse(&bundle.url).map_err(|e| e.to_string())?;
            if !served.insert(bundle.url.as_str()) {
                return Err(format!("Bundle {} is declared more than once", bundle.url));
            }
            if bundle.plugin.is_none() && bundle.engine_version.is_none() {
                return Err(format!("Bundle {} exports neither a plugin nor an engine", bundle.url));
            }
        }

        let mut identifiers = HashSet::new();
        for link in &self.plugins {
            if link.identifier.trim().is_empty() {
                return Err("Plugin identifier cannot be empty".to_string());
            }
            BundleReference::parse(&link.url).map_err(|e| e.to_string())?;
            if identifiers.insert(link.identifier.as_str()) {
                continue;
            }
            // Repeated links must keep pointing at the same bundle
            let first = self.plugins.iter().find(|other| other.identifier == link.identifier);
            if first.is_some_and(|first| first.url != link.url) {
                return Err(format!(
                    "Plugin '{}' is linked from more than one URL",
                    link.identifier
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.loader.filter_incompatible_plugins);
        assert_eq!(config.plugins.len(), 1);
        assert_eq!(config.bundles[0].engine_version.as_deref(), Some("8.3.0"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.plugins[0].url = "insights.js".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid bundle URL"));

        let mut config = AppConfig::default();
        config.loader.load_timeout_ms = Some(0);
        assert!(config.validate().unwrap_err().starts_with("Invalid loader settings"));

        let mut config = AppConfig::default();
        config.bundles.push(config.bundles[0].clone());
        assert!(config.validate().unwrap_err().contains("declared more than once"));

        let mut config = AppConfig::default();
        let mut relinked = config.plugins[0].clone();
        relinked.url = "/plugins/other_insights.js".to_string();
        config.plugins.push(relinked);
        assert!(config.validate().unwrap_err().contains("more than one URL"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [logging]
            level = "debug"

            [[plugins]]
            identifier = "kpi"
            url = "https://cdn.example.com/plugins/kpi_plugin.js"

            [[bundles]]
            url = "https://cdn.example.com/plugins/kpi_plugin.js"
            version = "2.1.0"
            engine_version = "8.1.0"

            [bundles.plugin]
            name = "KPI"
            version = "2.1.0"
            listen_to = ["GDC.DASH/EVT.SAVED"]
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.loader, LoaderConfig::default());
        let plugin = config.bundles[0].plugin.as_ref().unwrap();
        assert_eq!(plugin.min_engine_version, "bundled");
        assert_eq!(plugin.max_engine_version, "bundled");
        assert!(!plugin.watch_state);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_existing_file() {
        let file = NamedTempFile::new().unwrap();
        let mut config = AppConfig::default();
        config.logging.json_format = true;
        config.loader.load_timeout_ms = Some(750);
        tokio::fs::write(file.path(), toml::to_string_pretty(&config).unwrap())
            .await
            .unwrap();

        let loaded = AppConfig::load_from_file(&file.path().to_path_buf()).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_writes_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dashboard.toml");

        let loaded = AppConfig::load_from_file(&path).await.unwrap();

        assert_eq!(loaded, AppConfig::default());
        assert!(path.exists());
        let written: AppConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, AppConfig::default());
    }
}
