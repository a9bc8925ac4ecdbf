//! Publish interceptors.
//!
//! Interceptors wrap every publish with cross-cutting behavior (logging,
//! filtering, timeouts). The publisher folds them right-to-left at construction
//! into one chain that ends in the fan-out step; each interceptor decides whether
//! and how to hand the event to the rest of the chain via [`PublishNext`].

use crate::context::Context;
use crate::error::{ConduitError, HandlerExecutionError};
use crate::event::DynEvent;
use crate::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Outcome of one publish.
///
/// Handler failures are isolated: they are collected here instead of failing
/// the publish call.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Handlers in the snapshot taken for the round.
    pub matched: usize,
    /// Handlers that returned successfully.
    pub completed: usize,
    /// Handlers skipped because the context was cancelled.
    pub skipped: usize,
    /// Isolated handler failures, in snapshot order.
    pub failures: Vec<HandlerExecutionError>,
}

impl PublishReport {
    /// Returns `true` if every matched handler completed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: PublishReport) {
        self.matched += other.matched;
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }
}

/// The remainder of an interceptor chain, as a shareable function.
pub type Dispatch =
    Arc<dyn Fn(DynEvent, Context) -> BoxFuture<'static, Result<PublishReport, ConduitError>> + Send + Sync>;

/// Continuation handed to an [`Interceptor`].
///
/// Consumed on use, so an interceptor can forward an event at most once.
pub struct PublishNext {
    dispatch: Dispatch,
}

impl PublishNext {
    /// Wrap the rest of the chain.
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Forward the event to the rest of the chain.
    pub fn run(self, event: DynEvent, ctx: Context) -> BoxFuture<'static, Result<PublishReport, ConduitError>> {
        (self.dispatch)(event, ctx)
    }
}

/// Cross-cutting middleware around every publish.
///
/// Not calling `next` drops the event before fan-out.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an Interceptor",
    label = "missing `Interceptor` implementation",
    note = "Interceptors must implement `invoke(event, ctx, next)`."
)]
pub trait Interceptor: Send + Sync + 'static {
    /// Intercept one publish.
    fn invoke(
        &self,
        event: DynEvent,
        ctx: Context,
        next: PublishNext,
    ) -> impl Future<Output = Result<PublishReport, ConduitError>> + Send;
}

/// Dynamic object-safe version of [`Interceptor`].
pub trait DynInterceptor: Send + Sync + 'static {
    /// Intercept one publish (dynamic dispatch version).
    fn invoke_dyn(
        &self,
        event: DynEvent,
        ctx: Context,
        next: PublishNext,
    ) -> BoxFuture<'_, Result<PublishReport, ConduitError>>;
}

impl<T: Interceptor> DynInterceptor for T {
    fn invoke_dyn(
        &self,
        event: DynEvent,
        ctx: Context,
        next: PublishNext,
    ) -> BoxFuture<'_, Result<PublishReport, ConduitError>> {
        Box::pin(self.invoke(event, ctx, next))
    }
}

// Blanket impl for closures
impl<F, Fut> Interceptor for F
where
    F: Fn(DynEvent, Context, PublishNext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PublishReport, ConduitError>> + Send,
{
    fn invoke(
        &self,
        event: DynEvent,
        ctx: Context,
        next: PublishNext,
    ) -> impl Future<Output = Result<PublishReport, ConduitError>> + Send {
        (self)(event, ctx, next)
    }
}
