//! One responder per request type.

use crate::bus::DynRequestHandler;
use conduit_core::Request;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type SharedHandler<R> = Arc<dyn DynRequestHandler<R>>;

/// Request slots keyed by request type.
///
/// Setting a slot overwrites whatever was there; there is no fan-out.
#[derive(Default)]
pub struct RequestSlotRegistry {
    slots: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl RequestSlotRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the responder for `R`. Returns `true` if one was replaced.
    pub fn set_handler<R: Request>(&self, handler: SharedHandler<R>) -> bool {
        self.slots
            .write()
            .insert(TypeId::of::<R>(), Arc::new(handler))
            .is_some()
    }

    /// The responder for `R`, if any.
    pub fn get_handler<R: Request>(&self) -> Option<SharedHandler<R>> {
        let slot = self.slots.read().get(&TypeId::of::<R>()).cloned()?;
        slot.downcast_ref::<SharedHandler<R>>().cloned()
    }

    /// Clear the slot for `R`. Returns `true` if it was occupied.
    pub fn remove<R: Request>(&self) -> bool {
        self.slots.write().remove(&TypeId::of::<R>()).is_some()
    }

    /// Whether `R` has a responder.
    pub fn contains<R: Request>(&self) -> bool {
        self.slots.read().contains_key(&TypeId::of::<R>())
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}
