//! # conduit-std
//!
//! Standard implementations for the Conduit handler-dispatch kernel.
//!
//! This crate provides:
//! - **Event bus**: [`EventBus`](bus::EventBus), with fan-out publish,
//!   request/response and signal modules
//! - **Registries**: [`HandlerRegistry`](registry::HandlerRegistry),
//!   [`RequestSlotRegistry`](registry::RequestSlotRegistry)
//! - **Dispatch guard**: [`DispatchGuard`](guard::DispatchGuard)
//! - **Standard interceptors**: Logging, Filter, Timeout
//! - **Pipelines**: [`PipelineBuilder`](pipeline::PipelineBuilder) and
//!   [`CompiledPipeline`](pipeline::CompiledPipeline)
//! - **Configuration**: [`BusConfig`](config::BusConfig), loaded from the environment

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use conduit_core;

// Modules
pub mod bus;
pub mod config;
pub mod guard;
pub mod interceptors;
pub mod pipeline;
pub mod publisher;
pub mod registry;
pub mod subscription;
pub mod testing;
