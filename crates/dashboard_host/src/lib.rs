//! # Dashboard Host
//!
//! Loads a dashboard's plugin bundles, settles on one engine, installs the
//! plugins and connects them to the dashboard event bus.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! dashboard_host
//!
//! # Specify custom configuration
//! dashboard_host --config production.toml
//!
//! # Bound every bundle fetch and JSON logging for production
//! dashboard_host --timeout-ms 5000 --json-logs
//! ```
//!
//! The host reads a TOML file (default: `dashboard.toml`) and writes a
//! default one when it is missing.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod transport;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Parses arguments, sets up logging and runs one dashboard session.
///
/// Exits the process with status 1 on any startup or load failure.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file, so it is read once up front
    let config = AppConfig::load_from_file(&args.config_path).await.unwrap_or_default();

    let mut logging_settings = config.logging;
    if let Some(level) = &args.log_level {
        logging_settings.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&logging_settings, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use app::SessionReport;
pub use config::{BundleSettings, DeclaredPlugin, LoggingSettings, PluginSettings};
pub use transport::{DeclarativePlugin, StaticBundle, StaticBundleTransport, StaticEngine};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_application_from_cli_args() {
        let dir = TempDir::new().unwrap();
        let config_path: PathBuf = dir.path().join("dashboard.toml");
        let args = CliArgs {
            config_path: config_path.clone(),
            log_level: Some("debug".to_string()),
            json_logs: false,
            timeout_ms: Some(2_000),
        };

        let app = Application::new(args).await.unwrap();

        // Missing file was replaced by the default configuration
        assert!(config_path.exists());
        let report = app.run_session().await.unwrap();
        assert_eq!(report.installed, vec!["Dashboard Insights"]);
    }

    #[tokio::test]
    async fn test_invalid_override_fails_startup() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("dashboard.toml"),
            log_level: Some("chatty".to_string()),
            json_logs: false,
            timeout_ms: None,
        };

        assert!(Application::new(args).await.is_err());

        let args = CliArgs {
            config_path: dir.path().join("dashboard.toml"),
            log_level: None,
            json_logs: false,
            timeout_ms: Some(0),
        };
        assert!(Application::new(args).await.is_err());
    }
}
