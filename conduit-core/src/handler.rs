//! Event handlers.
//!
//! An [`EventHandler`] is the terminal endpoint of a fan-out publish. Handlers
//! receive the event behind an [`Arc`] because one published value is shared by
//! every subscriber of the round.
//!
//! # Usage Patterns
//!
//! 1. **Direct closure**: `|event: Arc<MyEvent>| async move { ... }`
//! 2. **Struct implementation**: `impl EventHandler<MyEvent> for MyHandler`
//!
//! Registries store handlers as [`ErasedHandler`]: a closure keyed by the
//! event's type tag that downcasts before calling the typed handler.

use crate::error::{BoxError, ConduitError, ConfigurationError};
use crate::event::{DynEvent, Event};
use crate::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Registry-unique identity of a handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Conversion of a handler's output into the kernel's result shape.
///
/// # Default Implementations
///
/// - `()` → success
/// - `Result<(), E>` → propagates the error as a [`BoxError`]
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be returned from a handler",
    label = "expected `()` or `Result<(), E>`",
    note = "Handlers and stages must return `()` or `Result<(), E>` where `E: Into<BoxError>`."
)]
pub trait IntoHandlerResult {
    /// Convert into `Result<(), BoxError>`.
    fn into_handler_result(self) -> Result<(), BoxError>;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E: Into<BoxError>> IntoHandlerResult for Result<(), E> {
    fn into_handler_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

/// Handles one event type.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot handle events of type `{E}`",
    label = "missing `EventHandler<{E}>` implementation",
    note = "Closures must take `Arc<{E}>` and return a future of `()` or `Result<(), E>`."
)]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    /// Handle one delivered event.
    fn handle(&self, event: Arc<E>) -> impl Future<Output = Result<(), BoxError>> + Send;
}

// Blanket impl for closures
impl<E, F, Fut> EventHandler<E> for F
where
    E: Event,
    F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send,
    Fut::Output: IntoHandlerResult,
{
    fn handle(&self, event: Arc<E>) -> impl Future<Output = Result<(), BoxError>> + Send {
        let fut = (self)(event);
        async move { fut.await.into_handler_result() }
    }
}

/// A handler with its event type erased, as stored by registries.
pub type ErasedHandler = Arc<dyn Fn(DynEvent) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Erase a typed handler.
///
/// The returned closure fails with [`ConfigurationError::EventTypeMismatch`] if it
/// is handed an event of another type.
pub fn erase_handler<E, H>(handler: H) -> ErasedHandler
where
    E: Event,
    H: EventHandler<E>,
{
    let handler = Arc::new(handler);
    Arc::new(move |event: DynEvent| -> BoxFuture<'static, Result<(), BoxError>> {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let event = event.downcast_arc::<E>().map_err(|_| {
                ConduitError::from(ConfigurationError::EventTypeMismatch {
                    expected: std::any::type_name::<E>(),
                })
            })?;
            handler.handle(event).await
        })
    })
}
