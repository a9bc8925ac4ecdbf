//! Error types for Conduit.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`ConduitError`] - Top-level error type for all kernel operations
//! - [`ConfigurationError`] - Mis-wired handlers or stages
//! - [`RecursionError`] - Dispatch depth exceeded or cyclic re-entry
//! - [`HandlerExecutionError`] - A fan-out handler failed (isolated by the publisher)
//! - [`PipelineExecutionError`] - A pipeline stage failed

use crate::handler::HandlerId;
use std::time::Duration;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all Conduit operations.
#[derive(Error, Debug)]
pub enum ConduitError {
    /// Handlers or stages are wired incorrectly.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Request dispatch recursed too deeply or re-entered itself.
    #[error("recursion error: {0}")]
    Recursion(#[from] RecursionError),

    /// A handler failed while being invoked directly.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerExecutionError),

    /// A pipeline stage failed and did not recover.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineExecutionError),

    /// The operation observed a cancelled context.
    #[error("operation was cancelled")]
    Cancelled,

    /// The operation did not complete in time.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// A custom error raised by user code.
    #[error(transparent)]
    Custom(BoxError),
}

impl ConduitError {
    /// Returns `true` for errors that describe a programming mistake rather than
    /// a runtime failure. These are never offered to stage recovery.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Recursion(_))
    }

    /// Returns the recursion error, if this is one.
    pub fn as_recursion(&self) -> Option<&RecursionError> {
        match self {
            Self::Recursion(err) => Some(err),
            _ => None,
        }
    }
}

// Errors cross user code as `BoxError`; recover the kernel variant when possible.
impl From<BoxError> for ConduitError {
    fn from(err: BoxError) -> Self {
        match err.downcast::<ConduitError>() {
            Ok(err) => *err,
            Err(err) => ConduitError::Custom(err),
        }
    }
}

/// Errors caused by mis-wired handlers, stages or modules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A stage called its continuation more than once in one pass.
    #[error("stage `{stage}` invoked its continuation more than once")]
    ContinuationReused {
        /// Name of the offending stage.
        stage: String,
    },

    /// No handler is registered for the request or event type.
    #[error("no handler registered for `{target}`")]
    NoHandler {
        /// Type name of the request or event.
        target: &'static str,
    },

    /// A type-erased handler received an event of an unexpected type.
    #[error("handler expected an event of type `{expected}`")]
    EventTypeMismatch {
        /// Type name the handler was registered for.
        expected: &'static str,
    },

    /// A module with the same name is already registered on the bus.
    #[error("module `{0}` is already loaded")]
    ModuleAlreadyLoaded(String),
}

/// Errors raised by the dispatch guard.
///
/// Both variants carry the in-flight chain, outermost first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecursionError {
    /// The nesting depth reached the configured maximum.
    #[error("dispatch depth exceeded {max} while entering `{entering}`: {}", .chain.join(" -> "))]
    DepthExceeded {
        /// Configured maximum depth.
        max: usize,
        /// Type entering the guard.
        entering: &'static str,
        /// In-flight chain at the time of failure.
        chain: Vec<&'static str>,
    },

    /// A type already on the chain was dispatched again.
    #[error("recursive dispatch: {} -> {entering}", .chain.join(" -> "))]
    Cycle {
        /// Type entering the guard.
        entering: &'static str,
        /// In-flight chain at the time of failure.
        chain: Vec<&'static str>,
    },
}

impl RecursionError {
    /// The in-flight chain, outermost first.
    pub fn chain(&self) -> &[&'static str] {
        match self {
            Self::DepthExceeded { chain, .. } | Self::Cycle { chain, .. } => chain,
        }
    }

    /// The type whose dispatch was refused.
    pub fn entering(&self) -> &'static str {
        match self {
            Self::DepthExceeded { entering, .. } | Self::Cycle { entering, .. } => entering,
        }
    }
}

/// How a handler failed.
#[derive(Error, Debug)]
pub enum HandlerFailure {
    /// The handler returned an error.
    #[error("returned an error: {0}")]
    Error(#[source] BoxError),

    /// The handler panicked.
    #[error("panicked: {0}")]
    Panic(String),
}

/// A single handler failed during dispatch.
#[derive(Error, Debug)]
#[error("handler {handler} for `{event}` {cause}")]
pub struct HandlerExecutionError {
    /// Type name of the event being dispatched.
    pub event: &'static str,
    /// Id of the failing handler.
    pub handler: HandlerId,
    /// What went wrong.
    #[source]
    pub cause: HandlerFailure,
}

/// A pipeline stage failed.
#[derive(Error, Debug)]
#[error("stage `{stage}` failed: {source}")]
pub struct PipelineExecutionError {
    /// Name of the failing stage.
    pub stage: String,
    /// The error raised by the stage.
    #[source]
    pub source: BoxError,
}
