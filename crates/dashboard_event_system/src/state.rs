//! State-change subscriptions
//!
//! Subscribers are called on every dashboard state transition with the new
//! state and a dispatcher they can use to issue follow-up commands. Each call
//! is isolated: a panicking subscriber is logged and skipped and the rest of
//! the chain still runs.

use compact_str::CompactString;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::event::same_fn;

/// Dashboard state as seen by subscribers; owned by the dashboard model
pub type DashboardState = serde_json::Value;

/// A command subscribers may dispatch back into the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardCommand {
    #[serde(rename = "type")]
    pub command_type: CompactString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl DashboardCommand {
    pub fn new(command_type: &str) -> Self {
        Self {
            command_type: CompactString::new(command_type),
            correlation_id: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Command sink handed to state-change subscribers
pub trait DashboardDispatch: Send + Sync {
    fn dispatch(&self, command: DashboardCommand);
}

/// Callback invoked on state transitions
pub type StateChangeCallback = Arc<dyn Fn(&DashboardState, &dyn DashboardDispatch) + Send + Sync>;

/// Ordered chain of state-change subscribers.
///
/// Cloning yields another handle onto the same chain, so a handle given out
/// in the initial snapshot keeps seeing later subscriptions.
#[derive(Clone, Default)]
pub struct StateChangeChain {
    callbacks: Arc<RwLock<Vec<StateChangeCallback>>>,
}

impl StateChangeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber. Returns `false` if the same callback is already subscribed.
    pub fn subscribe(&self, callback: StateChangeCallback) -> bool {
        let mut callbacks = self.callbacks.write();
        if callbacks.iter().any(|existing| same_fn(existing, &callback)) {
            warn!("⚠️ State change callback is already subscribed; ignoring duplicate subscription");
            return false;
        }
        callbacks.push(callback);
        debug!("📝 State change subscriber added ({} total)", callbacks.len());
        true
    }

    /// Remove a subscriber. Returns `false` if the callback was never subscribed.
    pub fn unsubscribe(&self, callback: &StateChangeCallback) -> bool {
        let mut callbacks = self.callbacks.write();
        match callbacks.iter().position(|existing| same_fn(existing, callback)) {
            Some(index) => {
                callbacks.remove(index);
                true
            }
            None => {
                warn!("⚠️ Attempted to unsubscribe a state change callback that was not subscribed");
                false
            }
        }
    }

    /// Invoke every subscriber in subscription order.
    ///
    /// Returns the number of subscribers that completed without panicking.
    pub fn notify(&self, state: &DashboardState, dispatch: &dyn DashboardDispatch) -> usize {
        // Subscribers may (un)subscribe while being notified
        let callbacks: Vec<StateChangeCallback> = self.callbacks.read().clone();

        let mut completed = 0;
        for (index, callback) in callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(state, dispatch))) {
                Ok(()) => completed += 1,
                Err(panic_info) => {
                    error!(
                        "❌ State change subscriber #{} failed: {}",
                        index,
                        panic_message(panic_info.as_ref())
                    );
                }
            }
        }
        completed
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
