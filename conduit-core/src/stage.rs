//! Pipeline stages.
//!
//! A [`Stage`] receives the shared execution context and a [`Next`] continuation.
//! Calling `next.run(ctx)` advances to the rest of the chain; not calling it
//! short-circuits the pipeline, which is how terminal and guard stages work.
//!
//! A continuation may be run at most once per execution pass. A second call
//! does not run anything downstream: it returns
//! [`ConfigurationError::ContinuationReused`] and the executor fails the pass
//! even if the stage swallows that error.
//!
//! # Static vs Dynamic Dispatch
//!
//! `Stage` uses native `async fn` in traits. Pipelines store stages as
//! [`DynStage`] trait objects, implemented for every `Stage` automatically.

use crate::context::Context;
use crate::error::{BoxError, ConduitError, ConfigurationError};
use crate::handler::IntoHandlerResult;
use crate::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The state a pipeline threads through its stages.
pub trait PipelineContext: Send + Sync + 'static {
    /// Cancellation signal checked before every stage.
    fn cancellation(&self) -> Option<&CancellationToken> {
        None
    }
}

impl PipelineContext for Context {
    fn cancellation(&self) -> Option<&CancellationToken> {
        Context::cancellation(self)
    }
}

/// The rest of a pipeline, as a shareable function.
pub type Continuation<C> =
    Arc<dyn Fn(Arc<C>) -> BoxFuture<'static, Result<(), ConduitError>> + Send + Sync>;

/// Per-turn bookkeeping of one stage's continuation.
#[derive(Debug, Default)]
pub struct NextState {
    called: AtomicBool,
    reused: AtomicBool,
}

impl NextState {
    /// Fresh state for one stage turn.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether the continuation was run.
    pub fn was_called(&self) -> bool {
        self.called.load(Ordering::Acquire)
    }

    /// Whether the continuation was run more than once.
    pub fn was_reused(&self) -> bool {
        self.reused.load(Ordering::Acquire)
    }
}

/// Continuation handed to a [`Stage`].
pub struct Next<C> {
    rest: Continuation<C>,
    state: Arc<NextState>,
    stage: Arc<str>,
}

impl<C: PipelineContext> Next<C> {
    /// Wrap the rest of the chain for the stage named `stage`.
    pub fn new(rest: Continuation<C>, state: Arc<NextState>, stage: impl Into<Arc<str>>) -> Self {
        Self {
            rest,
            state,
            stage: stage.into(),
        }
    }

    /// Run the rest of the pipeline.
    ///
    /// The first call advances; any later call fails without running anything.
    pub fn run(&self, ctx: Arc<C>) -> BoxFuture<'static, Result<(), ConduitError>> {
        if self.state.called.swap(true, Ordering::AcqRel) {
            self.state.reused.store(true, Ordering::Release);
            let stage = self.stage.to_string();
            return Box::pin(async move {
                Err(ConfigurationError::ContinuationReused { stage }.into())
            });
        }
        (self.rest)(ctx)
    }

    /// The turn state shared by every clone of this continuation.
    pub fn state(&self) -> &Arc<NextState> {
        &self.state
    }
}

impl<C> Clone for Next<C> {
    fn clone(&self) -> Self {
        Self {
            rest: Arc::clone(&self.rest),
            state: Arc::clone(&self.state),
            stage: Arc::clone(&self.stage),
        }
    }
}

/// One unit of a pipeline.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a pipeline stage for `{C}`",
    label = "missing `Stage<{C}>` implementation",
    note = "Closures must take `(Arc<{C}>, Next<{C}>)` and return a future of `()` or `Result<(), E>`."
)]
pub trait Stage<C: PipelineContext>: Send + Sync + 'static {
    /// Process the context and optionally continue down the chain.
    fn invoke(&self, ctx: Arc<C>, next: Next<C>) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Offered every non-fatal error raised by this stage or the chain below it.
    ///
    /// Returning `true` reports the error handled and the pass completes
    /// successfully at this stage.
    fn recover(&self, ctx: &C, error: &ConduitError) -> impl Future<Output = bool> + Send {
        let _ = (ctx, error);
        async { false }
    }
}

// Blanket impl for closures
impl<C, F, Fut> Stage<C> for F
where
    C: PipelineContext,
    F: Fn(Arc<C>, Next<C>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send,
    Fut::Output: IntoHandlerResult,
{
    fn invoke(&self, ctx: Arc<C>, next: Next<C>) -> impl Future<Output = Result<(), BoxError>> + Send {
        let fut = (self)(ctx, next);
        async move { fut.await.into_handler_result() }
    }
}

/// Dynamic object-safe version of [`Stage`].
pub trait DynStage<C: PipelineContext>: Send + Sync + 'static {
    /// Process the context (dynamic dispatch version).
    fn invoke_dyn(&self, ctx: Arc<C>, next: Next<C>) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Recovery hook (dynamic dispatch version).
    fn recover_dyn<'a>(&'a self, ctx: &'a C, error: &'a ConduitError) -> BoxFuture<'a, bool>;

    /// Borrow the concrete stage for downcasting.
    fn as_stage_any(&self) -> &dyn Any;

    /// Type name of the concrete stage.
    fn stage_type_name(&self) -> &'static str;
}

impl<C: PipelineContext, S: Stage<C>> DynStage<C> for S {
    fn invoke_dyn(&self, ctx: Arc<C>, next: Next<C>) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(self.invoke(ctx, next))
    }

    fn recover_dyn<'a>(&'a self, ctx: &'a C, error: &'a ConduitError) -> BoxFuture<'a, bool> {
        Box::pin(self.recover(ctx, error))
    }

    fn as_stage_any(&self) -> &dyn Any {
        self
    }

    fn stage_type_name(&self) -> &'static str {
        std::any::type_name::<S>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx;
    impl PipelineContext for Ctx {}

    fn done() -> Continuation<Ctx> {
        Arc::new(|_: Arc<Ctx>| -> BoxFuture<'static, Result<(), ConduitError>> { Box::pin(async { Ok(()) }) })
    }

    #[tokio::test]
    async fn second_run_fails_without_advancing() {
        let next = Next::new(done(), NextState::new(), "twice");

        assert!(next.run(Arc::new(Ctx)).await.is_ok());
        let err = next.run(Arc::new(Ctx)).await.unwrap_err();

        assert!(matches!(
            err,
            ConduitError::Configuration(ConfigurationError::ContinuationReused { ref stage }) if stage == "twice"
        ));
        assert!(next.state().was_called());
        assert!(next.state().was_reused());
    }

    #[tokio::test]
    async fn clones_share_the_turn() {
        let next = Next::new(done(), NextState::new(), "cloned");
        let other = next.clone();

        assert!(next.run(Arc::new(Ctx)).await.is_ok());
        assert!(other.run(Arc::new(Ctx)).await.is_err());
    }
}
