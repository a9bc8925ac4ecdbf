//! Testing utilities for Conduit.
//!
//! This module provides utilities to make testing handlers and pipelines easier.
//!
//! # Features
//!
//! - [`CallLog`]: A shared, ordered log of labels
//! - [`EventRecorder`]: A handler that records every event it receives
//! - [`CountingHandler`]: A handler that counts invocations
//! - [`RecordingStage`], [`TerminalStage`], [`FailingStage`]: Stages with
//!   observable behavior

use conduit_core::{BoxError, ConduitError, Event, EventHandler, Next, PipelineContext, Stage};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

// ============================================================================
// Call Log
// ============================================================================

/// A cloneable, ordered log of labels.
///
/// Clones share the same log, so one can be handed to several handlers or
/// stages and inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a label.
    pub fn push(&self, label: impl Into<String>) {
        self.entries.lock().push(label.into());
    }

    /// Snapshot of the labels in append order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Clear all labels.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// Event Recorder
// ============================================================================

/// A handler that records all events it receives.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = EventRecorder::<OrderPlaced>::new();
/// bus.subscribe(recorder.clone());
///
/// bus.publish(OrderPlaced { id: 7 }).await?;
/// assert_eq!(recorder.count(), 1);
/// ```
pub struct EventRecorder<E> {
    events: Arc<Mutex<Vec<Arc<E>>>>,
}

impl<E> EventRecorder<E> {
    /// Create a new recorder.
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The recorded events, in delivery order.
    pub fn events(&self) -> Vec<Arc<E>> {
        self.events.lock().clone()
    }

    /// Number of recorded events.
    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    /// Clear all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl<E> Default for EventRecorder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventRecorder<E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<E: Event> EventHandler<E> for EventRecorder<E> {
    async fn handle(&self, event: Arc<E>) -> Result<(), BoxError> {
        self.events.lock().push(event);
        Ok(())
    }
}

// ============================================================================
// Counting Handler
// ============================================================================

/// A handler that counts invocations of any event type.
#[derive(Debug, Clone, Default)]
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    /// Create a new counting handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

impl<E: Event> EventHandler<E> for CountingHandler {
    async fn handle(&self, _event: Arc<E>) -> Result<(), BoxError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Logs its label, then continues.
#[derive(Debug, Clone)]
pub struct RecordingStage {
    label: String,
    log: CallLog,
}

impl RecordingStage {
    /// A stage that pushes `label` onto `log` before continuing.
    pub fn new(label: impl Into<String>, log: CallLog) -> Self {
        Self {
            label: label.into(),
            log,
        }
    }
}

impl<C: PipelineContext> Stage<C> for RecordingStage {
    async fn invoke(&self, ctx: Arc<C>, next: Next<C>) -> Result<(), BoxError> {
        self.log.push(self.label.clone());
        next.run(ctx).await?;
        Ok(())
    }
}

/// Logs its label and ends the pipeline.
#[derive(Debug, Clone)]
pub struct TerminalStage {
    label: String,
    log: CallLog,
}

impl TerminalStage {
    /// A stage that pushes `label` onto `log` and never continues.
    pub fn new(label: impl Into<String>, log: CallLog) -> Self {
        Self {
            label: label.into(),
            log,
        }
    }
}

impl<C: PipelineContext> Stage<C> for TerminalStage {
    async fn invoke(&self, _ctx: Arc<C>, _next: Next<C>) -> Result<(), BoxError> {
        self.log.push(self.label.clone());
        Ok(())
    }
}

/// Fails with a fixed message without continuing.
#[derive(Debug, Clone)]
pub struct FailingStage {
    message: String,
    recovers: bool,
}

impl FailingStage {
    /// A stage that fails with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recovers: false,
        }
    }

    /// Also report every non-fatal error as recovered.
    pub fn recovering(mut self) -> Self {
        self.recovers = true;
        self
    }
}

impl<C: PipelineContext> Stage<C> for FailingStage {
    async fn invoke(&self, _ctx: Arc<C>, _next: Next<C>) -> Result<(), BoxError> {
        Err(self.message.clone().into())
    }

    async fn recover(&self, _ctx: &C, _error: &ConduitError) -> bool {
        self.recovers
    }
}
