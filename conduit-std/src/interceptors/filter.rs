//! Predicate-based event dropping.

use conduit_core::{ConduitError, Context, DynEvent, Event, Interceptor, PublishNext, PublishReport};
use tracing::trace;

/// Drops events the predicate rejects before they reach any handler.
///
/// A dropped publish succeeds with an empty report.
///
/// # Example
///
/// ```rust,ignore
/// // Only deliver events that belong to an authenticated user.
/// let auth = FilterInterceptor::new(|_event, ctx| ctx.user_id().is_some());
/// ```
pub struct FilterInterceptor<F> {
    predicate: F,
}

impl<F> FilterInterceptor<F>
where
    F: Fn(&dyn Event, &Context) -> bool + Send + Sync + 'static,
{
    /// Create a filter from a predicate over the event and its context.
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> Interceptor for FilterInterceptor<F>
where
    F: Fn(&dyn Event, &Context) -> bool + Send + Sync + 'static,
{
    async fn invoke(
        &self,
        event: DynEvent,
        ctx: Context,
        next: PublishNext,
    ) -> Result<PublishReport, ConduitError> {
        if !(self.predicate)(&*event, &ctx) {
            trace!(event = event.event_name(), "event dropped by filter");
            return Ok(PublishReport::default());
        }
        next.run(event, ctx).await
    }
}
