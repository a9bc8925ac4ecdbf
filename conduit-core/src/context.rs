//! Per-operation correlation and tracing context.
//!
//! A [`Context`] is created once per top-level operation (`send`, `publish`) and
//! then flows by value into everything that operation emits. It is never mutated
//! after creation; the `with_*` builders consume and return it.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Immutable correlation context for one logical operation.
#[derive(Clone)]
pub struct Context {
    trace_id: Uuid,
    span_id: u64,
    correlation_id: Uuid,
    request_id: Uuid,
    user_id: Option<Arc<str>>,
    trace_state: Option<Arc<str>>,
    timestamp: DateTime<Utc>,
    cancellation: Option<CancellationToken>,
}

impl Context {
    /// Start a new trace.
    pub fn new() -> Self {
        Self::with_trace_id(Uuid::new_v4())
    }

    fn with_trace_id(trace_id: Uuid) -> Self {
        Self {
            trace_id,
            span_id: new_span_id(),
            correlation_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            user_id: None,
            trace_state: None,
            timestamp: Utc::now(),
            cancellation: None,
        }
    }

    /// Continue the trace of an inbound W3C `traceparent` header.
    ///
    /// Returns `None` if the header is malformed or carries an all-zero trace id.
    pub fn continue_trace(traceparent: &str) -> Option<Self> {
        let mut parts = traceparent.trim().split('-');
        let version = parts.next()?;
        let trace = parts.next()?;
        let parent = parts.next()?;
        let flags = parts.next()?;

        if parts.next().is_some()
            || version.len() != 2
            || trace.len() != 32
            || parent.len() != 16
            || flags.len() != 2
        {
            return None;
        }
        u64::from_str_radix(parent, 16).ok()?;
        let trace_id = u128::from_str_radix(trace, 16).ok()?;
        if trace_id == 0 {
            return None;
        }

        Some(Self::with_trace_id(Uuid::from_u128(trace_id)))
    }

    /// Derive a context for nested work in the same trace.
    ///
    /// Keeps the trace, correlation, user, trace state and cancellation; issues a
    /// fresh span and request id.
    pub fn child(&self) -> Self {
        Self {
            span_id: new_span_id(),
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    /// Attach the user responsible for the operation.
    pub fn with_user(mut self, user_id: impl Into<Arc<str>>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach a W3C `tracestate` value.
    pub fn with_trace_state(mut self, trace_state: impl Into<Arc<str>>) -> Self {
        self.trace_state = Some(trace_state.into());
        self
    }

    /// Attach a cancellation signal, checked at every handler and stage boundary.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The trace id shared by every context in this trace.
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// The span id of this context.
    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    /// Correlates every event emitted by the same operation.
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Identifies the individual request.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The user responsible for the operation, if known.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The W3C `tracestate` value, if any.
    pub fn trace_state(&self) -> Option<&str> {
        self.trace_state.as_deref()
    }

    /// When this context was created.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The cancellation signal, if one was attached.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Returns `true` if the attached cancellation signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Render this context as a W3C `traceparent` header.
    pub fn traceparent(&self) -> String {
        format!("00-{:032x}-{:016x}-01", self.trace_id.as_u128(), self.span_id)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("traceparent", &self.traceparent())
            .field("correlation_id", &self.correlation_id)
            .field("request_id", &self.request_id)
            .field("user_id", &self.user_id)
            .field("timestamp", &self.timestamp)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

fn new_span_id() -> u64 {
    // W3C forbids an all-zero parent id.
    (Uuid::new_v4().as_u128() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_keeps_trace_and_correlation() {
        let root = Context::new().with_user("alice");
        let child = root.child();

        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.correlation_id(), root.correlation_id());
        assert_eq!(child.user_id(), Some("alice"));
        assert_ne!(child.request_id(), root.request_id());
    }

    #[test]
    fn traceparent_round_trips_the_trace_id() {
        let root = Context::new();
        let header = root.traceparent();
        assert_eq!(header.len(), 55);

        let continued = Context::continue_trace(&header).unwrap();
        assert_eq!(continued.trace_id(), root.trace_id());
        assert_ne!(continued.correlation_id(), root.correlation_id());
    }

    #[test]
    fn malformed_traceparent_is_rejected() {
        assert!(Context::continue_trace("garbage").is_none());
        assert!(Context::continue_trace("00-abc-def-01").is_none());
        assert!(
            Context::continue_trace(
                "00-00000000000000000000000000000000-0000000000000001-01"
            )
            .is_none()
        );
    }

    #[test]
    fn cancellation_is_observed() {
        let token = CancellationToken::new();
        let ctx = Context::new().with_cancellation(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.child().is_cancelled());
    }
}
