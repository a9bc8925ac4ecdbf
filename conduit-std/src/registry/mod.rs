//! Thread-safe handler stores.
//!
//! - [`HandlerRegistry`] - many handlers per event type, ordered for fan-out
//! - [`RequestSlotRegistry`] - exactly one responder per request type
//!
//! Both take short write locks for mutation and hand out point-in-time copies
//! for reads, so a dispatch in progress never holds a lock across an await.

mod handlers;
mod requests;

pub use handlers::{ErasedFilter, HandlerBucket, HandlerEntry, HandlerRegistry};
pub use requests::RequestSlotRegistry;
