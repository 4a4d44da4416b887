//! Handler registration that works before the event source exists
//!
//! The registry moves through three phases:
//!
//! 1. **PreSnapshot** - adds and removes only edit the list of known handlers;
//!    everything still known at snapshot time is handed over in the snapshot.
//! 2. **Snapshotted** - entered once by [`EventHandlerRegistry::take_initial_snapshot`].
//!    Changes are queued into `to_register` / `to_unregister` until the event
//!    source binds.
//! 3. **Bound** - entered once by [`EventHandlerRegistry::bind`]. Queues are
//!    replayed in insertion order, then every change passes straight through
//!    to the source. Changes made while the replay runs, from a hook or from
//!    another thread, are queued behind it and replayed before `bind` returns.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::EventingError;
use crate::event::{DashboardEventHandler, EventCallback, EventMatcherCache, HandlerRef};
use crate::state::{StateChangeCallback, StateChangeChain};

/// Event source hook that starts delivering events to a handler
pub type RegisterFn = Arc<dyn Fn(HandlerRef) + Send + Sync>;

/// Event source hook that stops delivering events to a handler
pub type UnregisterFn = Arc<dyn Fn(HandlerRef) + Send + Sync>;

/// Observable lifecycle phase of a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventingPhase {
    PreSnapshot,
    Snapshotted,
    Bound,
}

enum Phase {
    PreSnapshot,
    Snapshotted,
    /// `bind` is draining the queues; changes keep queueing
    Replaying,
    Bound {
        register: RegisterFn,
        unregister: UnregisterFn,
    },
}

struct RegistryState {
    phase: Phase,
    /// Every handler currently considered registered
    handlers: Vec<HandlerRef>,
    to_register: Vec<HandlerRef>,
    to_unregister: Vec<HandlerRef>,
}

struct RegistryInner {
    state: Mutex<RegistryState>,
    matchers: EventMatcherCache,
    state_changes: StateChangeChain,
}

/// Buffers handler and state-change registrations until an event source binds.
///
/// Cloning yields another handle onto the same registry.
#[derive(Clone)]
pub struct EventHandlerRegistry {
    inner: Arc<RegistryInner>,
}

/// What the event source receives when it takes over
pub struct EventingSnapshot {
    /// Handlers registered before the snapshot, in registration order
    pub handlers: Vec<HandlerRef>,
    /// Chain to notify on every state transition
    pub on_state_change: StateChangeChain,
    /// One-time hook that completes the hand-over
    pub binder: EventingBinder,
}

/// Completes the hand-over from the registry to an event source
pub struct EventingBinder {
    registry: EventHandlerRegistry,
}

impl EventingBinder {
    /// Bind the registry to the event source. Consumes the binder.
    pub fn bind<R, U>(self, register: R, unregister: U) -> Result<(), EventingError>
    where
        R: Fn(HandlerRef) + Send + Sync + 'static,
        U: Fn(HandlerRef) + Send + Sync + 'static,
    {
        self.registry.bind(register, unregister)
    }
}

impl Default for EventHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandlerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState {
                    phase: Phase::PreSnapshot,
                    handlers: Vec::new(),
                    to_register: Vec::new(),
                    to_unregister: Vec::new(),
                }),
                matchers: EventMatcherCache::new(),
                state_changes: StateChangeChain::new(),
            }),
        }
    }

    /// Register `callback` for events of `event_type`.
    ///
    /// # Arguments
    ///
    /// * `event_type` - Event type to match, or `"*"` for all events
    /// * `callback` - Called with every matching event once the source binds
    ///
    /// # Returns
    ///
    /// The registry, so registrations can be chained.
    pub fn add_event_handler(&self, event_type: &str, callback: EventCallback) -> &Self {
        let handler = DashboardEventHandler::new(self.inner.matchers.matcher_for(event_type), callback);
        self.add_custom_event_handler(handler)
    }

    /// Reverse of [`add_event_handler`](Self::add_event_handler); needs the same type key and callback
    pub fn remove_event_handler(&self, event_type: &str, callback: EventCallback) -> &Self {
        let handler = DashboardEventHandler::new(self.inner.matchers.matcher_for(event_type), callback);
        self.remove_custom_event_handler(&handler)
    }

    /// Register a handler object. Registering the same handler twice is ignored.
    ///
    /// Before the snapshot the handler is only recorded; after it, the
    /// handler is queued until `bind` and passed straight to the event source
    /// once bound.
    pub fn add_custom_event_handler(&self, handler: HandlerRef) -> &Self {
        let register = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            if state
                .handlers
                .iter()
                .any(|existing| DashboardEventHandler::is_same(existing, &handler))
            {
                warn!("⚠️ Event handler is already registered; ignoring duplicate registration");
                return self;
            }
            state.handlers.push(handler.clone());

            match &state.phase {
                Phase::PreSnapshot => None,
                Phase::Snapshotted | Phase::Replaying => {
                    state
                        .to_unregister
                        .retain(|queued| !DashboardEventHandler::is_same(queued, &handler));
                    state.to_register.push(handler.clone());
                    None
                }
                Phase::Bound { register, .. } => Some(register.clone()),
            }
        };

        if let Some(register) = register {
            register(handler);
        }
        self
    }

    /// Remove a handler object. Removing an unknown handler is ignored.
    ///
    /// # Arguments
    ///
    /// * `handler` - A handler previously passed to
    ///   [`add_custom_event_handler`](Self::add_custom_event_handler); a queued
    ///   registration is cancelled instead of reaching the event source
    ///
    /// # Returns
    ///
    /// The registry, so changes can be chained.
    pub fn remove_custom_event_handler(&self, handler: &HandlerRef) -> &Self {
        let unregister = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let Some(index) = state
                .handlers
                .iter()
                .position(|existing| DashboardEventHandler::is_same(existing, handler))
            else {
                warn!("⚠️ Attempted to remove an event handler that was never registered");
                return self;
            };
            let removed = state.handlers.remove(index);

            match &state.phase {
                Phase::PreSnapshot => None,
                Phase::Snapshotted | Phase::Replaying => {
                    let queued = state
                        .to_register
                        .iter()
                        .position(|queued| DashboardEventHandler::is_same(queued, &removed));
                    match queued {
                        // Never reached the event source
                        Some(position) => {
                            state.to_register.remove(position);
                        }
                        None => state.to_unregister.push(removed.clone()),
                    }
                    None
                }
                Phase::Bound { unregister, .. } => Some((unregister.clone(), removed)),
            }
        };

        if let Some((unregister, removed)) = unregister {
            unregister(removed);
        }
        self
    }

    /// Subscribe to state changes. Subscribing the same callback twice is ignored.
    pub fn subscribe_to_state_changes(&self, callback: StateChangeCallback) -> &Self {
        self.inner.state_changes.subscribe(callback);
        self
    }

    pub fn unsubscribe_from_state_changes(&self, callback: &StateChangeCallback) -> &Self {
        self.inner.state_changes.unsubscribe(callback);
        self
    }

    /// Hand the registered handlers over to the event source. Allowed once.
    ///
    /// # Returns
    ///
    /// The handlers known at this point, the state-change chain and the
    /// one-shot binder, or [`EventingError::AlreadySnapshotted`] on a second
    /// call.
    pub fn take_initial_snapshot(&self) -> Result<EventingSnapshot, EventingError> {
        let mut state = self.inner.state.lock();
        if !matches!(state.phase, Phase::PreSnapshot) {
            return Err(EventingError::AlreadySnapshotted);
        }
        state.phase = Phase::Snapshotted;

        debug!("📸 Initial eventing snapshot taken with {} handler(s)", state.handlers.len());

        Ok(EventingSnapshot {
            handlers: state.handlers.clone(),
            on_state_change: self.inner.state_changes.clone(),
            binder: EventingBinder {
                registry: self.clone(),
            },
        })
    }

    /// Bind to the real event source and replay queued changes. Allowed once, after the snapshot.
    ///
    /// The hooks are called without the registry lock held, so they may call
    /// back into the registry. Changes made during the replay are queued and
    /// replayed in turn, so the source sees every change in the order it was
    /// made.
    ///
    /// # Arguments
    ///
    /// * `register` - Starts delivering events to a handler
    /// * `unregister` - Stops delivering events to a handler
    ///
    /// # Returns
    ///
    /// [`EventingError::NotSnapshotted`] before the snapshot,
    /// [`EventingError::AlreadyBound`] if a bind already started.
    pub fn bind<R, U>(&self, register: R, unregister: U) -> Result<(), EventingError>
    where
        R: Fn(HandlerRef) + Send + Sync + 'static,
        U: Fn(HandlerRef) + Send + Sync + 'static,
    {
        let register: RegisterFn = Arc::new(register);
        let unregister: UnregisterFn = Arc::new(unregister);

        {
            let mut state = self.inner.state.lock();
            match state.phase {
                Phase::PreSnapshot => return Err(EventingError::NotSnapshotted),
                Phase::Replaying | Phase::Bound { .. } => return Err(EventingError::AlreadyBound),
                Phase::Snapshotted => {}
            }
            state.phase = Phase::Replaying;
            info!(
                "🔗 Eventing bound; replaying {} registration(s) and {} removal(s)",
                state.to_register.len(),
                state.to_unregister.len()
            );
        }

        loop {
            let (to_register, to_unregister) = {
                let mut state = self.inner.state.lock();
                if state.to_register.is_empty() && state.to_unregister.is_empty() {
                    state.phase = Phase::Bound {
                        register: register.clone(),
                        unregister: unregister.clone(),
                    };
                    return Ok(());
                }
                (
                    std::mem::take(&mut state.to_register),
                    std::mem::take(&mut state.to_unregister),
                )
            };

            for handler in to_register {
                register(handler);
            }
            for handler in to_unregister {
                unregister(handler);
            }
        }
    }

    pub fn phase(&self) -> EventingPhase {
        match self.inner.state.lock().phase {
            Phase::PreSnapshot => EventingPhase::PreSnapshot,
            Phase::Snapshotted => EventingPhase::Snapshotted,
            Phase::Replaying | Phase::Bound { .. } => EventingPhase::Bound,
        }
    }

    /// Number of handlers currently considered registered
    pub fn handler_count(&self) -> usize {
        self.inner.state.lock().handlers.len()
    }

    /// Number of queued (registrations, removals) awaiting `bind`
    pub fn pending_changes(&self) -> (usize, usize) {
        let state = self.inner.state.lock();
        (state.to_register.len(), state.to_unregister.len())
    }

    pub fn state_changes(&self) -> &StateChangeChain {
        &self.inner.state_changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DashboardEvent;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct SourceLog {
        registered: StdMutex<Vec<HandlerRef>>,
        unregistered: StdMutex<Vec<HandlerRef>>,
    }

    impl SourceLog {
        fn bind(self: &Arc<Self>, registry: &EventHandlerRegistry) -> Result<(), EventingError> {
            let registered = self.clone();
            let unregistered = self.clone();
            registry.bind(
                move |handler| registered.registered.lock().unwrap().push(handler),
                move |handler| unregistered.unregistered.lock().unwrap().push(handler),
            )
        }

        fn registered_count(&self, handler: &HandlerRef) -> usize {
            count(&self.registered.lock().unwrap(), handler)
        }

        fn unregistered_count(&self, handler: &HandlerRef) -> usize {
            count(&self.unregistered.lock().unwrap(), handler)
        }
    }

    fn count(list: &[HandlerRef], handler: &HandlerRef) -> usize {
        list.iter()
            .filter(|h| DashboardEventHandler::is_same(h, handler))
            .count()
    }

    fn callback() -> EventCallback {
        Arc::new(|_event: &DashboardEvent| {})
    }

    fn handler(registry: &EventHandlerRegistry, event_type: &str) -> HandlerRef {
        DashboardEventHandler::new(registry.inner.matchers.matcher_for(event_type), callback())
    }

    #[test]
    fn test_pre_snapshot_handlers_land_in_snapshot_once() {
        let registry = EventHandlerRegistry::new();
        let source = Arc::new(SourceLog::default());
        let h = handler(&registry, "*");

        registry.add_custom_event_handler(h.clone());
        registry.add_custom_event_handler(h.clone());

        let snapshot = registry.take_initial_snapshot().unwrap();
        assert_eq!(count(&snapshot.handlers, &h), 1);

        source.bind(&registry).unwrap();
        assert_eq!(source.registered_count(&h), 0);
        assert_eq!(source.unregistered_count(&h), 0);
    }

    #[test]
    fn test_pre_snapshot_removal_drops_handler_from_snapshot() {
        let registry = EventHandlerRegistry::new();
        let kept = handler(&registry, "a");
        let dropped = handler(&registry, "b");

        registry.add_custom_event_handler(kept.clone());
        registry.add_custom_event_handler(dropped.clone());
        registry.remove_custom_event_handler(&dropped);

        let snapshot = registry.take_initial_snapshot().unwrap();
        assert_eq!(snapshot.handlers.len(), 1);
        assert!(DashboardEventHandler::is_same(&snapshot.handlers[0], &kept));
    }

    #[test]
    fn test_added_and_removed_before_bind_never_reaches_source() {
        let registry = EventHandlerRegistry::new();
        let source = Arc::new(SourceLog::default());
        registry.take_initial_snapshot().unwrap();

        let h = handler(&registry, "GDC.DASH/EVT.SAVED");
        registry.add_custom_event_handler(h.clone());
        assert_eq!(registry.pending_changes(), (1, 0));
        registry.remove_custom_event_handler(&h);
        assert_eq!(registry.pending_changes(), (0, 0));

        source.bind(&registry).unwrap();
        assert_eq!(source.registered_count(&h), 0);
        assert_eq!(source.unregistered_count(&h), 0);
    }

    #[test]
    fn test_snapshot_handler_removed_before_bind_is_unregistered_on_bind() {
        let registry = EventHandlerRegistry::new();
        let source = Arc::new(SourceLog::default());
        let h = handler(&registry, "*");

        registry.add_custom_event_handler(h.clone());
        registry.take_initial_snapshot().unwrap();
        registry.remove_custom_event_handler(&h);
        assert_eq!(registry.pending_changes(), (0, 1));

        source.bind(&registry).unwrap();
        assert_eq!(source.unregistered_count(&h), 1);
        assert_eq!(source.registered_count(&h), 0);
    }

    #[test]
    fn test_readding_removed_snapshot_handler_clears_pending_removal() {
        let registry = EventHandlerRegistry::new();
        let h = handler(&registry, "*");

        registry.add_custom_event_handler(h.clone());
        registry.take_initial_snapshot().unwrap();
        registry.remove_custom_event_handler(&h);
        registry.add_custom_event_handler(h.clone());

        assert_eq!(registry.pending_changes(), (1, 0));
    }

    #[test]
    fn test_queued_changes_replay_in_insertion_order() {
        let registry = EventHandlerRegistry::new();
        let source = Arc::new(SourceLog::default());
        registry.take_initial_snapshot().unwrap();

        let first = handler(&registry, "first");
        let second = handler(&registry, "second");
        let third = handler(&registry, "third");
        registry
            .add_custom_event_handler(first.clone())
            .add_custom_event_handler(second.clone())
            .add_custom_event_handler(third.clone());

        source.bind(&registry).unwrap();

        let registered = source.registered.lock().unwrap();
        assert_eq!(registered.len(), 3);
        assert!(DashboardEventHandler::is_same(&registered[0], &first));
        assert!(DashboardEventHandler::is_same(&registered[1], &second));
        assert!(DashboardEventHandler::is_same(&registered[2], &third));
    }

    #[test]
    fn test_changes_during_replay_queue_behind_it() {
        let registry = EventHandlerRegistry::new();
        registry.take_initial_snapshot().unwrap();

        let first = handler(&registry, "first");
        let second = handler(&registry, "second");
        let late = handler(&registry, "late");
        registry
            .add_custom_event_handler(first.clone())
            .add_custom_event_handler(second.clone());

        // The register hook adds another handler while the replay is running
        let registered: Arc<StdMutex<Vec<HandlerRef>>> = Arc::default();
        let (log, hook_registry, hook_first, hook_late) =
            (registered.clone(), registry.clone(), first.clone(), late.clone());
        registry
            .bind(
                move |h| {
                    let adds_late = DashboardEventHandler::is_same(&h, &hook_first);
                    log.lock().unwrap().push(h);
                    if adds_late {
                        hook_registry.add_custom_event_handler(hook_late.clone());
                    }
                },
                |_handler| {},
            )
            .unwrap();

        let registered = registered.lock().unwrap();
        assert_eq!(registered.len(), 3);
        assert!(DashboardEventHandler::is_same(&registered[0], &first));
        assert!(DashboardEventHandler::is_same(&registered[1], &second));
        assert!(DashboardEventHandler::is_same(&registered[2], &late));
        assert_eq!(registry.pending_changes(), (0, 0));
        assert_eq!(registry.phase(), EventingPhase::Bound);
    }

    #[test]
    fn test_changes_after_bind_pass_straight_through() {
        let registry = EventHandlerRegistry::new();
        let source = Arc::new(SourceLog::default());
        let snapshot_handler = handler(&registry, "*");

        registry.add_custom_event_handler(snapshot_handler.clone());
        registry.take_initial_snapshot().unwrap();
        source.bind(&registry).unwrap();

        registry.remove_custom_event_handler(&snapshot_handler);
        assert_eq!(source.unregistered_count(&snapshot_handler), 1);

        let late = handler(&registry, "late");
        registry.add_custom_event_handler(late.clone());
        assert_eq!(source.registered_count(&late), 1);
        assert_eq!(registry.pending_changes(), (0, 0));
    }

    #[test]
    fn test_type_key_and_callback_registration_deduplicates() {
        let registry = EventHandlerRegistry::new();
        let cb = callback();

        registry
            .add_event_handler("GDC.DASH/EVT.SAVED", cb.clone())
            .add_event_handler("GDC.DASH/EVT.SAVED", cb.clone())
            .add_event_handler("*", cb.clone());
        assert_eq!(registry.handler_count(), 2);

        registry.remove_event_handler("GDC.DASH/EVT.SAVED", cb.clone());
        assert_eq!(registry.handler_count(), 1);

        // Removing again is absorbed
        registry.remove_event_handler("GDC.DASH/EVT.SAVED", cb);
        assert_eq!(registry.handler_count(), 1);
    }

    #[test]
    fn test_lifecycle_misuse_is_reported() {
        let registry = EventHandlerRegistry::new();
        let source = Arc::new(SourceLog::default());

        assert_eq!(source.bind(&registry), Err(EventingError::NotSnapshotted));

        let snapshot = registry.take_initial_snapshot().unwrap();
        assert!(matches!(
            registry.take_initial_snapshot(),
            Err(EventingError::AlreadySnapshotted)
        ));
        assert_eq!(registry.phase(), EventingPhase::Snapshotted);

        snapshot.binder.bind(|_handler| {}, |_handler| {}).unwrap();
        assert_eq!(registry.phase(), EventingPhase::Bound);
        assert_eq!(source.bind(&registry), Err(EventingError::AlreadyBound));
    }

    #[test]
    fn test_state_change_subscribers_survive_snapshot() {
        let registry = EventHandlerRegistry::new();
        let early: StateChangeCallback = Arc::new(|_state: &crate::DashboardState, _dispatch: &dyn crate::DashboardDispatch| {});
        registry.subscribe_to_state_changes(early.clone());
        registry.subscribe_to_state_changes(early.clone());

        let snapshot = registry.take_initial_snapshot().unwrap();
        assert_eq!(snapshot.on_state_change.len(), 1);

        let late: StateChangeCallback = Arc::new(|_state: &crate::DashboardState, _dispatch: &dyn crate::DashboardDispatch| {});
        registry.subscribe_to_state_changes(late);
        assert_eq!(snapshot.on_state_change.len(), 2);

        registry.unsubscribe_from_state_changes(&early);
        assert_eq!(snapshot.on_state_change.len(), 1);
    }
}
