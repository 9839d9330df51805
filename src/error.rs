#![forbid(unsafe_code)]

//! Error types for subscription and dispatch failures.
//!
//! Handlers are fallible: instead of unwinding, a failing handler surfaces as
//! an [`EmitError`] naming the handler's position in the dispatch snapshot.
//! Handlers registered before the failing one have already run; later ones
//! are skipped. Nothing is retried or swallowed.

use thiserror::Error;

/// Failure produced by a subscribed handler.
///
/// Single-threaded crate, so no `Send`/`Sync` bounds.
pub type HandlerError = Box<dyn std::error::Error + 'static>;

/// Crate-wide result alias for subscription operations.
pub type Result<T> = std::result::Result<T, EmitterError>;

/// Errors from [`Emitter`](crate::Emitter) subscription operations.
#[derive(Debug, Error)]
pub enum EmitterError {
    /// The emitter was disposed; no further subscriptions are accepted.
    #[error("emitter has been disposed")]
    Disposed,
}

/// A handler failed during a synchronous [`emit`](crate::Emitter::emit).
///
/// Delivery to handlers after `handler_index` was aborted; handlers before it
/// had already run.
#[derive(Debug, Error)]
#[error("handler {handler_index} for event \"{event_name}\" failed: {source}")]
pub struct EmitError {
    /// Event name being dispatched.
    pub event_name: String,
    /// Position of the failing handler in the dispatch snapshot.
    pub handler_index: usize,
    /// The handler's own failure.
    #[source]
    pub source: HandlerError,
}
