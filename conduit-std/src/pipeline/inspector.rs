//! In-place inspection and removal on a builder's stage list.

use super::builder::StageEntry;
use conduit_core::{Descriptor, PipelineContext};

/// Borrowed view over a live stage list.
///
/// Obtained from [`PipelineBuilder::inspect`](super::PipelineBuilder::inspect);
/// the mutable borrow keeps the list from changing under the inspector.
pub struct PipelineInspector<'a, C> {
    stages: &'a mut Vec<StageEntry<C>>,
}

impl<'a, C: PipelineContext> PipelineInspector<'a, C> {
    pub(crate) fn new(stages: &'a mut Vec<StageEntry<C>>) -> Self {
        Self { stages }
    }

    /// The stages, in order.
    pub fn list(&self) -> &[StageEntry<C>] {
        self.stages
    }

    /// Resolved descriptor per stage, in order.
    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.stages.iter().map(StageEntry::descriptor).collect()
    }

    /// Remove every stage matching `predicate`. Returns whether any was removed.
    pub fn remove<P>(&mut self, mut predicate: P) -> bool
    where
        P: FnMut(&StageEntry<C>) -> bool,
    {
        let before = self.stages.len();
        self.stages.retain(|entry| !predicate(entry));
        self.stages.len() != before
    }

    /// Remove every stage.
    pub fn clear(&mut self) {
        self.stages.clear();
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
