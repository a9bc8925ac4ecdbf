//! # conduit - In-Process Handler Dispatch
//!
//! `conduit` composes independently-authored async handlers inside one process.
//! It offers three surfaces over the same building blocks:
//!
//! - **Fan-out publish**: every matching subscriber receives the event, in
//!   priority order, with failures isolated per handler
//! - **Request/response**: exactly one responder per request type, with
//!   nested requests guarded against runaway recursion
//! - **Pipelines**: ordered middleware stages with positional, conditional
//!   and branching composition
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::prelude::*;
//!
//! struct OrderPlaced { id: u64 }
//! impl Event for OrderPlaced {}
//!
//! let bus = EventBus::builder()
//!     .interceptor(LoggingInterceptor)
//!     .build();
//!
//! bus.subscribe(|order: Arc<OrderPlaced>| async move {
//!     println!("order {}", order.id);
//! });
//! bus.publish(OrderPlaced { id: 7 }).await?;
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use conduit_core::{
    // Errors
    BoxError,
    BoxFuture,
    CancellationToken,
    ConduitError,
    ConfigurationError,
    // Context
    Context,
    // Pipelines
    Continuation,
    Descriptor,
    Dispatch,
    DynEvent,
    DynInterceptor,
    DynStage,
    ErasedHandler,
    // Events
    Event,
    EventHandler,
    EventKey,
    HandlerExecutionError,
    HandlerFailure,
    HandlerId,
    Interceptor,
    IntoHandlerResult,
    Next,
    PipelineContext,
    PipelineExecutionError,
    PublishNext,
    PublishReport,
    RecursionError,
    Request,
    Stage,
    StageKind,
    erase_handler,
};

pub use conduit_std::bus::{CallContext, EventBus, EventBusBuilder, RequestHandler, SignalModule};
pub use conduit_std::config::{BusConfig, ConfigError};
pub use conduit_std::guard::{DispatchGuard, DispatchScope};
pub use conduit_std::pipeline::{
    Branch, CompiledPipeline, Conditional, DebugTrace, PipelineBuilder, PipelineCompiler, PipelineExecutor,
    PipelineInspector, StageEntry, StageFactory, StageRegistration, TraceStep,
};
pub use conduit_std::subscription::{SubscribeOptions, SubscriptionToken};

/// Standard publish interceptors.
pub mod interceptors {
    pub use conduit_std::interceptors::{FilterInterceptor, LoggingInterceptor, TimeoutInterceptor};
}

/// Testing utilities.
pub mod testing {
    pub use conduit_std::testing::{
        CallLog, CountingHandler, EventRecorder, FailingStage, RecordingStage, TerminalStage,
    };
}

#[cfg(feature = "logging")]
pub mod logging;

/// Prelude module - common imports for Conduit.
///
/// # Usage
///
/// ```rust,ignore
/// use conduit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::interceptors::{FilterInterceptor, LoggingInterceptor, TimeoutInterceptor};
    pub use crate::{
        BoxError, CallContext, ConduitError, Context, Descriptor, Event, EventBus, EventHandler, Next,
        PipelineBuilder, PipelineContext, PublishReport, Request, RequestHandler, SignalModule, Stage,
        SubscribeOptions, SubscriptionToken,
    };
    pub use std::sync::Arc;
}
