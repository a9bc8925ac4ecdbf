//! Ahead-of-time folding of a stage list into one entry function.

use super::builder::StageEntry;
use super::executor::invoke_stage;
use super::trace::DebugTrace;
use conduit_core::{BoxFuture, ConduitError, Continuation, Descriptor, PipelineContext};
use std::sync::Arc;

/// Maps "the rest of the chain" to "this stage plus the rest".
pub type StageFactory<C> = Arc<dyn Fn(Continuation<C>) -> Continuation<C> + Send + Sync>;

/// A factory paired with the descriptor reported for it.
pub struct StageRegistration<C> {
    factory: StageFactory<C>,
    descriptor: Descriptor,
}

impl<C: PipelineContext> StageRegistration<C> {
    /// A raw registration.
    ///
    /// The factory builds its own continuation handling; it is not guarded
    /// against double calls the way stages from a builder are.
    pub fn new(factory: StageFactory<C>, descriptor: Descriptor) -> Self {
        Self { factory, descriptor }
    }

    /// A guarded registration for a builder entry.
    pub fn from_entry(entry: &StageEntry<C>) -> Self {
        let stage = Arc::clone(entry.stage());
        let name = entry.shared_name();

        let factory: StageFactory<C> = Arc::new(move |rest: Continuation<C>| -> Continuation<C> {
            let stage = Arc::clone(&stage);
            let name = Arc::clone(&name);
            Arc::new(
                move |ctx: Arc<C>| -> BoxFuture<'static, Result<(), ConduitError>> {
                    Box::pin(invoke_stage(
                        Arc::clone(&stage),
                        Arc::clone(&name),
                        Arc::clone(&rest),
                        ctx,
                    ))
                },
            )
        });

        Self {
            factory,
            descriptor: entry.descriptor(),
        }
    }

    /// The descriptor reported for this stage.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

/// Folds registrations right-to-left into a [`CompiledPipeline`].
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compose `registrations` once, starting from a no-op terminal.
    pub fn compile<C: PipelineContext>(registrations: Vec<StageRegistration<C>>) -> CompiledPipeline<C> {
        let terminal: Continuation<C> = Arc::new(
            |_ctx: Arc<C>| -> BoxFuture<'static, Result<(), ConduitError>> { Box::pin(async { Ok(()) }) },
        );

        let entry = registrations
            .iter()
            .rev()
            .fold(terminal, |rest, registration| (registration.factory)(rest));
        let descriptors = registrations
            .into_iter()
            .map(|registration| registration.descriptor)
            .collect();

        CompiledPipeline { entry, descriptors }
    }
}

/// An immutable, composed pipeline.
///
/// Cloning shares the composed chain; any number of executions may run
/// concurrently.
pub struct CompiledPipeline<C> {
    entry: Continuation<C>,
    descriptors: Arc<[Descriptor]>,
}

impl<C> Clone for CompiledPipeline<C> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            descriptors: Arc::clone(&self.descriptors),
        }
    }
}

impl<C: PipelineContext> CompiledPipeline<C> {
    /// Run one pass.
    pub async fn execute(&self, ctx: C) -> Result<(), ConduitError> {
        self.execute_shared(Arc::new(ctx)).await
    }

    /// Run one pass over an already shared context.
    pub async fn execute_shared(&self, ctx: Arc<C>) -> Result<(), ConduitError> {
        (self.entry)(ctx).await
    }

    /// Run one pass under a fresh [`DebugTrace`] and return it.
    pub async fn execute_traced(&self, ctx: C) -> (Result<(), ConduitError>, DebugTrace) {
        let trace = DebugTrace::new();
        let result = trace.scope(self.execute(ctx)).await;
        (result, trace)
    }

    /// Descriptors in stage order.
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether there are no stages.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
