//! Event and request marker traits, plus the type tags used to key dispatch tables.
//!
//! Events travel through the bus type-erased as [`DynEvent`]. Handlers are stored
//! under an [`EventKey`] derived from the concrete type at registration time, so
//! publishing only needs the event's runtime [`TypeId`] to find its bucket.

use crate::context::Context;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Upcasting helper so type-erased events can be downcast again.
///
/// Implemented automatically for every `Send + Sync + 'static` type.
pub trait AsAny: Send + Sync + 'static {
    /// Borrow `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared pointer into `Arc<dyn Any>`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A dispatchable payload.
///
/// Any `Send + Sync + 'static` type can be an event; implement the trait with an
/// empty body. Events that belong to a larger operation may expose the
/// [`Context`] they were created under.
///
/// # Example
///
/// ```rust,ignore
/// struct OrderPlaced { id: u64 }
///
/// impl Event for OrderPlaced {}
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid Event",
    label = "missing `Event` implementation",
    note = "Events must be `Send + Sync + 'static` and implement `Event` (an empty impl is enough)."
)]
pub trait Event: AsAny {
    /// Human-readable name of the event type, used in logs and errors.
    fn event_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// The context this event was emitted under, if it carries one.
    fn context(&self) -> Option<&Context> {
        None
    }
}

/// A type-erased, shareable event.
pub type DynEvent = Arc<dyn Event>;

impl dyn Event {
    /// The dispatch key of the concrete event type.
    pub fn key(&self) -> EventKey {
        EventKey {
            type_id: self.as_any().type_id(),
            name: self.event_name(),
        }
    }

    /// Returns `true` if the concrete type is `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }

    /// Borrow the concrete event, if it is an `E`.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Recover the concrete shared event, handing back the erased one on mismatch.
    pub fn downcast_arc<E: Event>(self: Arc<Self>) -> Result<Arc<E>, DynEvent> {
        match Arc::clone(&self).into_any().downcast::<E>() {
            Ok(event) => Ok(event),
            Err(_) => Err(self),
        }
    }
}

impl fmt::Debug for dyn Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.event_name())
            .finish_non_exhaustive()
    }
}

/// A request with exactly one responder.
///
/// Unlike events, requests are moved into their handler and produce a typed
/// response. They are resolved through the bus' request slots, never fanned out.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid Request",
    label = "missing `Request` implementation",
    note = "Requests declare their `Response` type: `impl Request for {Self} {{ type Response = ...; }}`"
)]
pub trait Request: Send + 'static {
    /// The value produced by the request's handler.
    type Response: Send + 'static;
}

/// Stable type tag used to key handler buckets and guard chains.
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct EventKey {
    type_id: TypeId,
    name: &'static str,
}

impl EventKey {
    /// The key for type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying type id.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The full type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EventKey {}

impl Hash for EventKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventKey").field(&self.name).finish()
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
