//! Ordered, mutable stage lists.

use super::compiler::{CompiledPipeline, PipelineCompiler, StageRegistration};
use super::executor::PipelineExecutor;
use super::inspector::PipelineInspector;
use super::stages::{Branch, Conditional};
use conduit_core::{ConduitError, Descriptor, DynStage, PipelineContext, Stage, StageKind, short_type_name};
use std::fmt;
use std::sync::Arc;

/// One stage in a builder, with its explicitly registered descriptor, if any.
pub struct StageEntry<C> {
    stage: Arc<dyn DynStage<C>>,
    descriptor: Option<Descriptor>,
    name: Arc<str>,
}

impl<C> Clone for StageEntry<C> {
    fn clone(&self) -> Self {
        Self {
            stage: Arc::clone(&self.stage),
            descriptor: self.descriptor.clone(),
            name: Arc::clone(&self.name),
        }
    }
}

impl<C: PipelineContext> StageEntry<C> {
    /// An entry without a registered descriptor, named after the stage type.
    pub fn new<S: Stage<C>>(stage: S) -> Self {
        Self::from_dyn(Arc::new(stage), None)
    }

    /// An entry with an explicit descriptor.
    pub fn described<S: Stage<C>>(stage: S, descriptor: Descriptor) -> Self {
        Self::from_dyn(Arc::new(stage), Some(descriptor))
    }

    /// An entry around an already shared stage.
    pub fn from_dyn(stage: Arc<dyn DynStage<C>>, descriptor: Option<Descriptor>) -> Self {
        let name: Arc<str> = match &descriptor {
            Some(descriptor) => descriptor.name().into(),
            None => short_type_name(stage.stage_type_name()).into(),
        };
        Self {
            stage,
            descriptor,
            name,
        }
    }

    /// Descriptor name if registered, otherwise the short stage type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The registered descriptor, or a standard one named after the stage.
    pub fn descriptor(&self) -> Descriptor {
        self.descriptor
            .clone()
            .unwrap_or_else(|| Descriptor::new(self.name.as_ref()))
    }

    /// The descriptor supplied at registration, if any.
    pub fn registered_descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    /// Full type name of the stage.
    pub fn type_name(&self) -> &'static str {
        self.stage.stage_type_name()
    }

    /// Whether the stage is an `S`.
    pub fn is<S: 'static>(&self) -> bool {
        self.stage.as_stage_any().is::<S>()
    }

    /// Borrow the stage as an `S`.
    pub fn downcast_ref<S: 'static>(&self) -> Option<&S> {
        self.stage.as_stage_any().downcast_ref::<S>()
    }

    /// The shared stage.
    pub fn stage(&self) -> &Arc<dyn DynStage<C>> {
        &self.stage
    }
}

impl<C> fmt::Debug for StageEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageEntry")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Builds a pipeline as an ordered list of stages.
///
/// Order is exactly insertion order as adjusted by the positional methods.
/// The list stays mutable until [`compile`](Self::compile) or
/// [`executor`](Self::executor) takes a snapshot.
///
/// # Example
///
/// ```rust,ignore
/// let mut builder = PipelineBuilder::<Request>::new();
/// builder
///     .use_stage(Log)
///     .use_when(|req: &Request| req.needs_validation, Validate)
///     .use_branch(|req: &Request| req.is_admin, |admin| {
///         admin.use_stage(Audit);
///     })
///     .use_stage(Respond);
///
/// let pipeline = builder.compile();
/// pipeline.execute(request).await?;
/// ```
pub struct PipelineBuilder<C> {
    stages: Vec<StageEntry<C>>,
}

impl<C: PipelineContext> Default for PipelineBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PipelineContext> PipelineBuilder<C> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage.
    pub fn use_stage<S: Stage<C>>(&mut self, stage: S) -> &mut Self {
        self.use_entry(StageEntry::new(stage))
    }

    /// Append a stage with an explicit descriptor.
    pub fn use_described<S: Stage<C>>(&mut self, stage: S, descriptor: Descriptor) -> &mut Self {
        self.use_entry(StageEntry::described(stage, descriptor))
    }

    /// Append a prepared entry.
    pub fn use_entry(&mut self, entry: StageEntry<C>) -> &mut Self {
        self.stages.push(entry);
        self
    }

    /// Prepend a stage.
    pub fn use_first<S: Stage<C>>(&mut self, stage: S) -> &mut Self {
        self.stages.insert(0, StageEntry::new(stage));
        self
    }

    /// Insert right after the last stage matching `predicate`, or at the end if
    /// none matches.
    pub fn use_after<P, S>(&mut self, predicate: P, stage: S) -> &mut Self
    where
        P: Fn(&StageEntry<C>) -> bool,
        S: Stage<C>,
    {
        let at = self
            .stages
            .iter()
            .rposition(|entry| predicate(entry))
            .map_or(self.stages.len(), |index| index + 1);
        self.stages.insert(at, StageEntry::new(stage));
        self
    }

    /// Insert right before the first stage matching `predicate`, or at the start
    /// if none matches.
    pub fn use_before<P, S>(&mut self, predicate: P, stage: S) -> &mut Self
    where
        P: Fn(&StageEntry<C>) -> bool,
        S: Stage<C>,
    {
        let at = self
            .stages
            .iter()
            .position(|entry| predicate(entry))
            .unwrap_or(0);
        self.stages.insert(at, StageEntry::new(stage));
        self
    }

    /// Append a stage that only runs when `condition` holds. When it does not,
    /// the stage is skipped and the chain continues.
    pub fn use_when<P, S>(&mut self, condition: P, stage: S) -> &mut Self
    where
        P: Fn(&C) -> bool + Send + Sync + 'static,
        S: Stage<C>,
    {
        let name = short_type_name(std::any::type_name::<S>());
        let descriptor = Descriptor::new(name).kind(StageKind::Conditional);
        self.use_described(Conditional::new(condition, stage), descriptor)
    }

    /// Append a nested pipeline, configured by `configure`, that runs to
    /// completion when `condition` holds before the chain continues.
    pub fn use_branch<P, F>(&mut self, condition: P, configure: F) -> &mut Self
    where
        P: Fn(&C) -> bool + Send + Sync + 'static,
        F: FnOnce(&mut PipelineBuilder<C>),
    {
        let mut nested = PipelineBuilder::new();
        configure(&mut nested);
        let pipeline = nested.compile();

        let descriptor = Descriptor::new("Branch")
            .kind(StageKind::Branch)
            .conditional(true)
            .with_metadata("stages", pipeline.len());
        self.use_described(Branch::new(condition, pipeline), descriptor)
    }

    /// Read, resolve and remove stages in place.
    pub fn inspect(&mut self) -> PipelineInspector<'_, C> {
        PipelineInspector::new(&mut self.stages)
    }

    /// The current stages, in order.
    pub fn stages(&self) -> &[StageEntry<C>] {
        &self.stages
    }

    /// Fold the current stages into a reusable pipeline.
    pub fn compile(&self) -> CompiledPipeline<C> {
        PipelineCompiler::compile(self.stages.iter().map(StageRegistration::from_entry).collect())
    }

    /// An executor that walks a snapshot of the current stages.
    pub fn executor(&self) -> PipelineExecutor<C> {
        PipelineExecutor::new(self.stages.clone())
    }

    /// Run the current stages once without compiling.
    pub async fn execute(&self, ctx: C) -> Result<(), ConduitError> {
        self.executor().execute(ctx).await
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
