//! Side-loading of legacy global-scope scripts before plugins load.
//!
//! All scripts are injected, every load is awaited to completion or failure,
//! and then every injected script is removed again, whatever the outcome.

use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::bundle::parse_bundle_url;
use crate::error::{BoxError, PluginLoaderError, Result};

/// A script injected into the host environment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHandle {
    pub id: Uuid,
    pub url: String,
}

/// The environment scripts are injected into
#[async_trait]
pub trait ScriptHost: Send + Sync {
    /// Insert a loadable reference to `handle.url`
    fn inject(&self, handle: &ScriptHandle);

    /// Wait until the injected script has loaded or failed
    async fn loaded(&self, handle: &ScriptHandle) -> std::result::Result<(), BoxError>;

    /// Remove a previously injected reference
    fn remove(&self, handle: &ScriptHandle);
}

/// Removes every injected script when dropped
struct InjectedScripts<'a> {
    host: &'a dyn ScriptHost,
    handles: Vec<ScriptHandle>,
}

impl Drop for InjectedScripts<'_> {
    fn drop(&mut self) {
        for handle in &self.handles {
            self.host.remove(handle);
        }
        debug!("🧹 Removed {} side-loaded script reference(s)", self.handles.len());
    }
}

/// Load `urls` into `host` and wait for all of them.
///
/// Fails with [`PluginLoaderError::DynamicLoadFailed`] naming the first
/// failing URL. Scripts are cleaned up on success, on failure and on timeout.
pub async fn side_load_scripts(host: &dyn ScriptHost, urls: &[String], timeout: Option<Duration>) -> Result<()> {
    if urls.is_empty() {
        return Ok(());
    }

    for url in urls {
        parse_bundle_url(url)?;
    }

    let mut scripts = InjectedScripts {
        host,
        handles: Vec::with_capacity(urls.len()),
    };
    for url in urls {
        let handle = ScriptHandle {
            id: Uuid::new_v4(),
            url: url.clone(),
        };
        host.inject(&handle);
        scripts.handles.push(handle);
    }

    info!("📦 Side-loading {} script(s)", scripts.handles.len());

    let all_settled = join_all(scripts.handles.iter().map(|handle| host.loaded(handle)));
    let outcomes = match timeout {
        Some(limit) => tokio::time::timeout(limit, all_settled).await.map_err(|_| {
            error!("❌ Side-loading timed out after {:?}", limit);
            PluginLoaderError::Timeout {
                operation: "Side-loading scripts".to_string(),
                timeout_ms: limit.as_millis() as u64,
            }
        })?,
        None => all_settled.await,
    };

    let mut first_failure = None;
    for (handle, outcome) in scripts.handles.iter().zip(outcomes) {
        if let Err(e) = outcome {
            error!("❌ Failed to load script {}: {}", handle.url, e);
            first_failure.get_or_insert_with(|| PluginLoaderError::DynamicLoadFailed {
                url: handle.url.clone(),
                reason: e.to_string(),
            });
        }
    }

    drop(scripts);
    match first_failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
