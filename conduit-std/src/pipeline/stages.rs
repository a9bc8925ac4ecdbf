//! Wrapper stages produced by `use_when` and `use_branch`.

use super::compiler::CompiledPipeline;
use conduit_core::{BoxError, ConduitError, Next, PipelineContext, Stage};
use std::sync::Arc;

/// Runs `inner` only when the condition holds; otherwise continues directly.
pub struct Conditional<P, S> {
    condition: P,
    inner: S,
}

impl<P, S> Conditional<P, S> {
    /// Gate `inner` behind `condition`.
    pub fn new(condition: P, inner: S) -> Self {
        Self { condition, inner }
    }

    /// The gated stage.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<C, P, S> Stage<C> for Conditional<P, S>
where
    C: PipelineContext,
    P: Fn(&C) -> bool + Send + Sync + 'static,
    S: Stage<C>,
{
    async fn invoke(&self, ctx: Arc<C>, next: Next<C>) -> Result<(), BoxError> {
        if (self.condition)(&*ctx) {
            self.inner.invoke(ctx, next).await
        } else {
            next.run(ctx).await.map_err(Into::into)
        }
    }

    async fn recover(&self, ctx: &C, error: &ConduitError) -> bool {
        (self.condition)(ctx) && self.inner.recover(ctx, error).await
    }
}

/// Runs a nested pipeline to completion when the condition holds, then
/// continues the parent chain either way.
pub struct Branch<P, C> {
    condition: P,
    pipeline: CompiledPipeline<C>,
}

impl<P, C: PipelineContext> Branch<P, C> {
    /// Branch into `pipeline` when `condition` holds.
    pub fn new(condition: P, pipeline: CompiledPipeline<C>) -> Self {
        Self { condition, pipeline }
    }

    /// The nested pipeline.
    pub fn pipeline(&self) -> &CompiledPipeline<C> {
        &self.pipeline
    }
}

impl<C, P> Stage<C> for Branch<P, C>
where
    C: PipelineContext,
    P: Fn(&C) -> bool + Send + Sync + 'static,
{
    async fn invoke(&self, ctx: Arc<C>, next: Next<C>) -> Result<(), BoxError> {
        if (self.condition)(&*ctx) {
            self.pipeline.execute_shared(Arc::clone(&ctx)).await?;
        }
        next.run(ctx).await?;
        Ok(())
    }
}
