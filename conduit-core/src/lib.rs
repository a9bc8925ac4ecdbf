//! # conduit-core
//!
//! Core traits and value types for the Conduit handler-dispatch kernel.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! modules and extensions that register handlers without needing the full
//! `conduit-std` implementation.
//!
//! # Dispatch Surfaces
//!
//! Conduit composes independently-authored async handlers in three ways that
//! share the same building blocks:
//!
//! ## Fan-out ([`EventHandler`], [`Interceptor`])
//!
//! An [`Event`] is published to every matching handler. Publishes pass
//! through a chain of interceptors first; handler failures are isolated and
//! reported in a [`PublishReport`].
//!
//! - **Type-tagged**: handlers are keyed by [`EventKey`], no reflection at publish time
//! - **Erased**: registries hold [`ErasedHandler`]s that downcast on delivery
//!
//! ## Request/Response ([`Request`])
//!
//! A request resolves to exactly one responder and yields a typed response.
//! Nested requests are guarded against runaway recursion.
//!
//! ## Pipelines ([`Stage`])
//!
//! An ordered chain of stages, each receiving the shared context and a
//! [`Next`] continuation that may run at most once.
//!
//! - **Short-circuit**: a stage that does not call `next` ends the pass
//! - **Described**: stages can carry an explicit [`Descriptor`]
//!
//! # Error Types
//!
//! - [`ConduitError`] - Top-level error type
//! - [`ConfigurationError`] - Mis-wired handlers or stages
//! - [`RecursionError`] - Dispatch depth exceeded or cyclic re-entry
//! - [`HandlerExecutionError`] - Isolated fan-out handler failure
//! - [`PipelineExecutionError`] - Stage failure

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

use std::future::Future;
use std::pin::Pin;

mod context;
mod descriptor;
mod error;
mod event;
mod handler;
mod interceptor;
mod stage;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Re-exports
pub use context::Context;
pub use descriptor::{Descriptor, StageKind, short_type_name};
pub use error::{
    BoxError, ConduitError, ConfigurationError, HandlerExecutionError, HandlerFailure,
    PipelineExecutionError, RecursionError,
};
pub use event::{AsAny, DynEvent, Event, EventKey, Request};
pub use handler::{ErasedHandler, EventHandler, HandlerId, IntoHandlerResult, erase_handler};
pub use interceptor::{Dispatch, DynInterceptor, Interceptor, PublishNext, PublishReport};
pub use stage::{Continuation, DynStage, Next, NextState, PipelineContext, Stage};

pub use tokio_util::sync::CancellationToken;
