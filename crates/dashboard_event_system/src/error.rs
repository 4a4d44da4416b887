//! Error types for the dashboard event system

/// Errors raised by lifecycle misuse of the handler registry.
///
/// Duplicate registrations and removals of unknown handlers are not errors;
/// they are logged and absorbed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventingError {
    /// The initial snapshot was already handed out
    #[error("Initial handler snapshot has already been taken")]
    AlreadySnapshotted,

    /// `bind` was called before the initial snapshot was taken
    #[error("Cannot bind eventing before the initial handler snapshot is taken")]
    NotSnapshotted,

    /// `bind` was called a second time
    #[error("Eventing is already bound to an event source")]
    AlreadyBound,
}
