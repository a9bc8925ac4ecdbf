//! Drives one pipeline execution.
//!
//! Every stage turn goes through [`invoke_stage`], whether the chain is walked
//! live by [`PipelineExecutor`] or was folded ahead of time by the compiler:
//!
//! 1. Check cancellation.
//! 2. Hand the stage a fresh [`Next`] whose state records calls.
//! 3. Fail the pass if the continuation ran twice, even if the stage swallowed
//!    the error.
//! 4. Offer errors other than fatal ones and cancellation to the stage's
//!    recovery hook.

use super::builder::StageEntry;
use super::trace::DebugTrace;
use conduit_core::{
    BoxError, BoxFuture, CancellationToken, ConduitError, ConfigurationError, Continuation, DynStage, Next,
    NextState, PipelineContext, PipelineExecutionError,
};
use std::sync::Arc;
use tracing::{debug, error};

pub(crate) async fn invoke_stage<C: PipelineContext>(
    stage: Arc<dyn DynStage<C>>,
    name: Arc<str>,
    rest: Continuation<C>,
    ctx: Arc<C>,
) -> Result<(), ConduitError> {
    if ctx.cancellation().is_some_and(CancellationToken::is_cancelled) {
        return Err(ConduitError::Cancelled);
    }

    let state = NextState::new();
    let next = Next::new(rest, Arc::clone(&state), Arc::clone(&name));
    let step = DebugTrace::current().map(|trace| trace.begin(&name));

    let result = stage.invoke_dyn(Arc::clone(&ctx), next).await;

    if let Some(step) = step {
        step.finish(state.was_called());
    }

    if state.was_reused() {
        error!(stage = %name, "continuation invoked more than once");
        return Err(ConfigurationError::ContinuationReused {
            stage: name.to_string(),
        }
        .into());
    }

    let err = match result {
        Ok(()) => return Ok(()),
        Err(err) => classify(err, &name),
    };
    if err.is_fatal() || matches!(err, ConduitError::Cancelled) {
        return Err(err);
    }

    if stage.recover_dyn(&ctx, &err).await {
        debug!(stage = %name, error = %err, "stage recovered");
        return Ok(());
    }
    Err(err)
}

// Kernel errors from downstream pass through untouched; anything else is
// attributed to this stage.
fn classify(err: BoxError, stage: &str) -> ConduitError {
    match ConduitError::from(err) {
        ConduitError::Custom(source) => PipelineExecutionError {
            stage: stage.to_owned(),
            source,
        }
        .into(),
        other => other,
    }
}

/// Walks a live stage list.
///
/// Holds a snapshot of the list taken when it was created; later builder
/// changes do not affect it.
pub struct PipelineExecutor<C> {
    stages: Arc<[StageEntry<C>]>,
}

impl<C> Clone for PipelineExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
        }
    }
}

impl<C: PipelineContext> PipelineExecutor<C> {
    /// Executor over `stages`, in order.
    pub fn new(stages: Vec<StageEntry<C>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// Run one pass.
    pub async fn execute(&self, ctx: C) -> Result<(), ConduitError> {
        self.execute_shared(Arc::new(ctx)).await
    }

    /// Run one pass over an already shared context.
    pub async fn execute_shared(&self, ctx: Arc<C>) -> Result<(), ConduitError> {
        run_from(Arc::clone(&self.stages), 0, ctx).await
    }

    /// Run one pass under a fresh [`DebugTrace`] and return it.
    pub async fn execute_traced(&self, ctx: C) -> (Result<(), ConduitError>, DebugTrace) {
        let trace = DebugTrace::new();
        let result = trace.scope(self.execute(ctx)).await;
        (result, trace)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether there are no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

fn run_from<C: PipelineContext>(
    stages: Arc<[StageEntry<C>]>,
    index: usize,
    ctx: Arc<C>,
) -> BoxFuture<'static, Result<(), ConduitError>> {
    let Some(entry) = stages.get(index) else {
        return Box::pin(async { Ok(()) });
    };
    let stage = Arc::clone(entry.stage());
    let name = entry.shared_name();

    let rest: Continuation<C> = Arc::new(
        move |ctx: Arc<C>| -> BoxFuture<'static, Result<(), ConduitError>> {
            run_from(Arc::clone(&stages), index + 1, ctx)
        },
    );
    Box::pin(invoke_stage(stage, name, rest, ctx))
}
