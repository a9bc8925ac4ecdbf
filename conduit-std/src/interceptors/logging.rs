//! Logging interceptor for publish observation.

use conduit_core::{ConduitError, Context, DynEvent, Interceptor, PublishNext, PublishReport};
use std::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

/// Wraps every publish in an `info` span carrying the event name and the
/// context's trace and correlation ids, and logs its outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    async fn invoke(
        &self,
        event: DynEvent,
        ctx: Context,
        next: PublishNext,
    ) -> Result<PublishReport, ConduitError> {
        let span = info_span!(
            "publish",
            event = event.event_name(),
            trace_id = %ctx.trace_id(),
            correlation_id = %ctx.correlation_id()
        );

        async move {
            let started = Instant::now();
            debug!("publishing event");
            let result = next.run(event, ctx).await;
            match &result {
                Ok(report) => debug!(
                    matched = report.matched,
                    completed = report.completed,
                    failed = report.failures.len(),
                    elapsed = ?started.elapsed(),
                    "event published"
                ),
                Err(err) => warn!(error = %err, elapsed = ?started.elapsed(), "publish failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}
