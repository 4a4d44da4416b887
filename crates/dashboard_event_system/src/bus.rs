//! In-process event source that honours the registry binding contract

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::EventingError;
use crate::event::{DashboardEvent, DashboardEventHandler, HandlerRef};
use crate::registry::EventHandlerRegistry;
use crate::state::{panic_message, StateChangeChain};

/// Statistics for event bus monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBusStats {
    pub events_emitted: u64,
    pub events_handled: u64,
    pub handler_failures: u64,
    pub total_handlers: usize,
}

/// Delivers dashboard events to registered handlers.
///
/// Handlers run synchronously in registration order. A panicking handler is
/// logged and counted as a failure; delivery continues with the next one.
#[derive(Default)]
pub struct DashboardEventBus {
    handlers: RwLock<Vec<HandlerRef>>,
    stats: RwLock<EventBusStats>,
}

impl DashboardEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering events to `handler`. Already registered handlers are ignored.
    pub fn register(&self, handler: HandlerRef) {
        let mut handlers = self.handlers.write();
        if handlers
            .iter()
            .any(|existing| DashboardEventHandler::is_same(existing, &handler))
        {
            debug!("Handler already attached to event bus");
            return;
        }
        handlers.push(handler);
        self.stats.write().total_handlers = handlers.len();
        debug!("📝 Registered event bus handler ({} total)", handlers.len());
    }

    /// Stop delivering events to `handler`. Returns whether it was attached.
    pub fn unregister(&self, handler: &HandlerRef) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|existing| !DashboardEventHandler::is_same(existing, handler));
        let removed = handlers.len() != before;
        if removed {
            self.stats.write().total_handlers = handlers.len();
        } else {
            warn!("⚠️ Tried to unregister a handler that is not attached to the event bus");
        }
        removed
    }

    /// Deliver an event to every matching handler.
    ///
    /// Returns the number of handlers that ran to completion.
    pub fn emit(&self, event: &DashboardEvent) -> usize {
        // Handlers may (un)register while the event is being delivered
        let handlers: Vec<HandlerRef> = self.handlers.read().clone();

        let mut handled = 0u64;
        let mut failures = 0u64;
        for handler in handlers.iter().filter(|handler| handler.matches(event)) {
            match catch_unwind(AssertUnwindSafe(|| handler.invoke(event))) {
                Ok(()) => handled += 1,
                Err(panic_info) => {
                    failures += 1;
                    error!(
                        "❌ Handler for {} failed: {}",
                        event.event_type,
                        panic_message(panic_info.as_ref())
                    );
                }
            }
        }

        if handled + failures == 0 {
            debug!("No handlers for event: {}", event.event_type);
        }

        let mut stats = self.stats.write();
        stats.events_emitted += 1;
        stats.events_handled += handled;
        stats.handler_failures += failures;

        handled as usize
    }

    /// Take over from `registry`: attach its snapshot handlers and bind the
    /// registry to this bus.
    ///
    /// Returns the state-change chain the caller should notify on every
    /// dashboard state transition.
    pub fn connect(self: &Arc<Self>, registry: &EventHandlerRegistry) -> Result<StateChangeChain, EventingError> {
        let snapshot = registry.take_initial_snapshot()?;
        for handler in snapshot.handlers {
            self.register(handler);
        }

        let register_bus = Arc::clone(self);
        let unregister_bus = Arc::clone(self);
        snapshot.binder.bind(
            move |handler| register_bus.register(handler),
            move |handler| {
                unregister_bus.unregister(&handler);
            },
        )?;

        Ok(snapshot.on_state_change)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn stats(&self) -> EventBusStats {
        self.stats.read().clone()
    }
}
