//! Fan-out publishing through an interceptor chain.
//!
//! The chain is folded once, at construction: each interceptor wraps the rest,
//! and the innermost step takes a snapshot of matching handlers and runs them
//! all concurrently. One handler failing (or panicking) never stops its
//! siblings and never fails the publish; failures are logged and collected in
//! the returned [`PublishReport`].

use crate::registry::HandlerEntry;
use crate::subscription::{ClaimedRound, SubscriptionService};
use conduit_core::{
    BoxFuture, ConduitError, Context, Dispatch, DynEvent, DynInterceptor, Event, HandlerExecutionError,
    HandlerFailure, PublishNext, PublishReport,
};
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, trace};

/// Runs publishes through the interceptor chain and fans out to handlers.
pub struct Publisher {
    chain: Dispatch,
}

impl Publisher {
    /// Build the chain. Interceptors run in the order given.
    pub fn new(
        subscriptions: Arc<SubscriptionService>,
        interceptors: Vec<Arc<dyn DynInterceptor>>,
        catch_panics: bool,
    ) -> Self {
        let terminal: Dispatch = Arc::new(
            move |event: DynEvent, ctx: Context| -> BoxFuture<'static, Result<PublishReport, ConduitError>> {
                let subscriptions = Arc::clone(&subscriptions);
                Box::pin(async move { Ok(fan_out(&subscriptions, event, ctx, catch_panics).await) })
            },
        );

        let chain = interceptors
            .into_iter()
            .rev()
            .fold(terminal, |next: Dispatch, interceptor| -> Dispatch {
                Arc::new(
                    move |event: DynEvent, ctx: Context| -> BoxFuture<'static, Result<PublishReport, ConduitError>> {
                        let interceptor = Arc::clone(&interceptor);
                        let next = PublishNext::new(Arc::clone(&next));
                        Box::pin(async move { interceptor.invoke_dyn(event, ctx, next).await })
                    },
                )
            });

        Self { chain }
    }

    /// Publish under a fresh context, or the one the event carries.
    pub async fn publish<E: Event>(&self, event: E) -> Result<PublishReport, ConduitError> {
        let ctx = event.context().cloned().unwrap_or_default();
        self.publish_dyn(Arc::new(event), ctx).await
    }

    /// Publish under `ctx`.
    pub async fn publish_with<E: Event>(&self, event: E, ctx: Context) -> Result<PublishReport, ConduitError> {
        self.publish_dyn(Arc::new(event), ctx).await
    }

    /// Publish a type-erased event under `ctx`.
    ///
    /// Fails with [`ConduitError::Cancelled`] if `ctx` is already cancelled;
    /// otherwise only interceptors can fail the call.
    pub async fn publish_dyn(&self, event: DynEvent, ctx: Context) -> Result<PublishReport, ConduitError> {
        if ctx.is_cancelled() {
            return Err(ConduitError::Cancelled);
        }
        (self.chain)(event, ctx).await
    }

    /// Publish every event under one shared, fresh context.
    pub async fn publish_batch<I>(&self, events: I) -> Result<PublishReport, ConduitError>
    where
        I: IntoIterator<Item = DynEvent>,
    {
        self.publish_batch_with(events, Context::new()).await
    }

    /// Publish every event under `ctx`, concurrently.
    ///
    /// Reports are merged. If any publish fails, the first error (in input
    /// order) is returned once all of them have completed.
    pub async fn publish_batch_with<I>(&self, events: I, ctx: Context) -> Result<PublishReport, ConduitError>
    where
        I: IntoIterator<Item = DynEvent>,
    {
        let results = join_all(
            events
                .into_iter()
                .map(|event| self.publish_dyn(event, ctx.clone())),
        )
        .await;

        let mut report = PublishReport::default();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(partial) => report.merge(partial),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}

// ============================================================================
// Fan-out
// ============================================================================

enum Outcome {
    Completed,
    Skipped,
    Failed(HandlerFailure),
}

async fn fan_out(
    subscriptions: &SubscriptionService,
    event: DynEvent,
    ctx: Context,
    catch_panics: bool,
) -> PublishReport {
    let key = event.key();
    let snapshot = subscriptions.snapshot(&*event);
    if snapshot.is_empty() {
        trace!(event = key.name(), "no handlers matched");
        return PublishReport::default();
    }

    let round = ClaimedRound::new(subscriptions, key, &snapshot);
    let outcomes = join_all(
        snapshot
            .iter()
            .map(|entry| invoke_isolated(entry, &round, Arc::clone(&event), &ctx, catch_panics)),
    )
    .await;

    let mut report = PublishReport {
        matched: snapshot.len(),
        ..PublishReport::default()
    };
    for (entry, outcome) in snapshot.iter().zip(outcomes) {
        match outcome {
            Outcome::Completed => report.completed += 1,
            Outcome::Skipped => report.skipped += 1,
            Outcome::Failed(cause) => {
                let failure = HandlerExecutionError {
                    event: key.name(),
                    handler: entry.id(),
                    cause,
                };
                error!(
                    event = key.name(),
                    handler = %entry.id(),
                    trace_id = %ctx.trace_id(),
                    error = %failure,
                    "handler failed"
                );
                report.failures.push(failure);
            }
        }
    }
    report
}

// Skipped handlers are left unfinished so the round releases them.
async fn invoke_isolated(
    entry: &HandlerEntry,
    round: &ClaimedRound<'_>,
    event: DynEvent,
    ctx: &Context,
    catch_panics: bool,
) -> Outcome {
    if ctx.is_cancelled() {
        return Outcome::Skipped;
    }

    let call = entry.call(event);
    let result = if catch_panics {
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                round.finish(entry);
                return Outcome::Failed(HandlerFailure::Panic(panic_message(payload)));
            }
        }
    } else {
        call.await
    };
    round.finish(entry);

    match result {
        Ok(()) => Outcome::Completed,
        Err(err) => Outcome::Failed(HandlerFailure::Error(err)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map_or_else(|| "non-string panic payload".to_owned(), |message| (*message).to_owned()),
    }
}
