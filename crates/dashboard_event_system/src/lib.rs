//! # Dashboard Event System
//!
//! Lets observers subscribe to dashboard lifecycle events before the object
//! that emits them exists.
//!
//! ## Key Features
//!
//! - **Out-of-order registration**: handlers and state-change subscribers can
//!   be added or removed at any time; the registry buffers changes until the
//!   event source binds and then replays them in order
//! - **Handler identity**: handlers registered for the same type key with the
//!   same callback compare equal, so duplicate registrations are ignored
//! - **Isolation**: a panicking handler or subscriber is logged and skipped
//!
//! ## Architecture
//!
//! - **EventHandlerRegistry**: three-phase buffer (pre-snapshot, snapshotted, bound)
//! - **StateChangeChain**: ordered, panic-isolated state-change subscribers
//! - **DashboardEventBus**: in-process event source that binds to a registry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dashboard_event_system::*;
//! use std::sync::Arc;
//!
//! let registry = EventHandlerRegistry::new();
//!
//! // Subscribers may exist before the event source does
//! registry.add_event_handler("GDC.DASH/EVT.INITIALIZED", Arc::new(|event: &DashboardEvent| {
//!     println!("dashboard initialized: {:?}", event.correlation_id);
//! }));
//!
//! // Later, once the dashboard is up
//! let bus = Arc::new(DashboardEventBus::new());
//! let state_changes = bus.connect(&registry)?;
//! bus.emit(&DashboardEvent::new("GDC.DASH/EVT.INITIALIZED"));
//! # Ok::<(), EventingError>(())
//! ```

pub mod bus;
pub mod error;
pub mod event;
pub mod registry;
pub mod state;

// Re-exports for convenience
pub use bus::{DashboardEventBus, EventBusStats};
pub use error::EventingError;
pub use event::{
    DashboardEvent, DashboardEventHandler, EventCallback, EventMatcher, EventMatcherCache,
    HandlerRef, ANY_EVENT_TYPE,
};
pub use registry::{
    EventHandlerRegistry, EventingBinder, EventingPhase, EventingSnapshot, RegisterFn, UnregisterFn,
};
pub use state::{
    DashboardCommand, DashboardDispatch, DashboardState, StateChangeCallback, StateChangeChain,
};

/// Version of the eventing contract
pub const DASHBOARD_EVENT_SYSTEM_VERSION: &str = env!("CARGO_PKG_VERSION");
