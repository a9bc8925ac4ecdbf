//! Timeout interceptor for time-limited publishes.

use conduit_core::{ConduitError, Context, DynEvent, Interceptor, PublishNext, PublishReport};
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Fails a publish with [`ConduitError::TimedOut`] if the rest of the chain,
/// fan-out included, does not finish in time.
///
/// Handlers still running when the limit expires are dropped at their next
/// suspension point.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutInterceptor {
    duration: Duration,
}

impl TimeoutInterceptor {
    /// Create a new timeout interceptor.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Interceptor for TimeoutInterceptor {
    async fn invoke(
        &self,
        event: DynEvent,
        ctx: Context,
        next: PublishNext,
    ) -> Result<PublishReport, ConduitError> {
        let name = event.event_name();
        match timeout(self.duration, next.run(event, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(event = name, limit = ?self.duration, "publish timed out");
                Err(ConduitError::TimedOut(self.duration))
            }
        }
    }
}
