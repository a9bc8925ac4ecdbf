//! Per-execution debug trace of stage timings.
//!
//! Wrap an execution in [`DebugTrace::scope`] and every stage it runs, nested
//! branch pipelines included, records a [`TraceStep`]. Outside a scope the
//! executor records nothing.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

tokio::task_local! {
    static CURRENT: DebugTrace;
}

/// One stage turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceStep {
    /// Resolved stage name.
    pub stage: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Time until the stage returned, downstream stages included. `None` while running.
    pub duration: Option<Duration>,
    /// Whether the stage ran its continuation.
    pub continuation_called: bool,
}

/// Ordered log of stage turns for one execution.
#[derive(Debug, Clone, Default)]
pub struct DebugTrace {
    steps: Arc<Mutex<Vec<TraceStep>>>,
}

impl DebugTrace {
    /// Create an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` with this trace installed. The previous trace, if any, is
    /// restored when `fut` completes or is dropped.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT.scope(self.clone(), fut).await
    }

    /// The trace installed on the current task, if any.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Recorded steps in start order.
    pub fn steps(&self) -> Vec<TraceStep> {
        self.steps.lock().clone()
    }

    /// Names of the recorded stages in start order.
    pub fn stage_names(&self) -> Vec<String> {
        self.steps.lock().iter().map(|step| step.stage.clone()).collect()
    }

    pub(crate) fn begin(&self, stage: &str) -> StepHandle {
        let mut steps = self.steps.lock();
        steps.push(TraceStep {
            stage: stage.to_owned(),
            started_at: Utc::now(),
            duration: None,
            continuation_called: false,
        });
        StepHandle {
            trace: self.clone(),
            index: steps.len() - 1,
            started: Instant::now(),
        }
    }
}

/// Completes one [`TraceStep`].
pub(crate) struct StepHandle {
    trace: DebugTrace,
    index: usize,
    started: Instant,
}

impl StepHandle {
    pub(crate) fn finish(self, continuation_called: bool) {
        if let Some(step) = self.trace.steps.lock().get_mut(self.index) {
            step.duration = Some(self.started.elapsed());
            step.continuation_called = continuation_called;
        }
    }
}
