//! Dashboard events and the handler model shared by the registry and event sources

use compact_str::CompactString;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Type key that matches every event
pub const ANY_EVENT_TYPE: &str = "*";

/// A dashboard lifecycle or custom event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardEvent {
    /// Event type tag (e.g. `GDC.DASH/EVT.INITIALIZED`)
    #[serde(rename = "type")]
    pub event_type: CompactString,
    /// Correlation id of the command that caused the event, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Event body
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl DashboardEvent {
    /// Create an event with an empty payload
    pub fn new(event_type: &str) -> Self {
        Self {
            event_type: CompactString::new(event_type),
            correlation_id: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Predicate deciding whether a handler wants an event
pub type EventMatcher = Arc<dyn Fn(&DashboardEvent) -> bool + Send + Sync>;

/// Callback invoked for matching events
pub type EventCallback = Arc<dyn Fn(&DashboardEvent) + Send + Sync>;

/// Shared handle to a registered handler
pub type HandlerRef = Arc<DashboardEventHandler>;

/// An event handler: a matcher paired with the callback to run on a match.
///
/// Two handlers are the same handler when they are the same allocation, or
/// when both their matcher and their callback are the same functions. Matchers
/// produced by one [`EventMatcherCache`] for the same type key are shared, so
/// registering the same callback for the same type twice yields equal handlers.
pub struct DashboardEventHandler {
    pub eval: EventMatcher,
    pub handler: EventCallback,
}

impl DashboardEventHandler {
    pub fn new(eval: EventMatcher, handler: EventCallback) -> HandlerRef {
        Arc::new(Self { eval, handler })
    }

    /// Whether this handler wants to see the event
    #[inline]
    pub fn matches(&self, event: &DashboardEvent) -> bool {
        (self.eval)(event)
    }

    #[inline]
    pub fn invoke(&self, event: &DashboardEvent) {
        (self.handler)(event)
    }

    /// Handler identity used for deduplication and removal
    pub fn is_same(a: &HandlerRef, b: &HandlerRef) -> bool {
        Arc::ptr_eq(a, b) || (same_fn(&a.eval, &b.eval) && same_fn(&a.handler, &b.handler))
    }
}

impl fmt::Debug for DashboardEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardEventHandler")
            .field("eval", &Arc::as_ptr(&self.eval).cast::<()>())
            .field("handler", &Arc::as_ptr(&self.handler).cast::<()>())
            .finish()
    }
}

/// Compares closure allocations by data address only; vtable addresses are
/// not stable across codegen units.
pub(crate) fn same_fn<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Per-registry cache of type matchers keyed by event type key
#[derive(Default)]
pub struct EventMatcherCache {
    matchers: DashMap<CompactString, EventMatcher>,
}

impl EventMatcherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the matcher for a type key, creating it on first use
    pub fn matcher_for(&self, type_key: &str) -> EventMatcher {
        self.matchers
            .entry(CompactString::new(type_key))
            .or_insert_with(|| build_matcher(type_key))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

fn build_matcher(type_key: &str) -> EventMatcher {
    if type_key == ANY_EVENT_TYPE {
        return Arc::new(|_event: &DashboardEvent| true);
    }

    let expected = CompactString::new(type_key);
    Arc::new(move |event: &DashboardEvent| event.event_type == expected)
}
