//! Middleware pipelines.
//!
//! - [`PipelineBuilder`] - ordered, mutable stage list with positional and
//!   conditional insertion
//! - [`PipelineCompiler`] / [`CompiledPipeline`] - fold once, reuse concurrently
//! - [`PipelineExecutor`] - walk a live stage list
//! - [`PipelineInspector`] - list, describe and remove stages in place
//! - [`DebugTrace`] - per-execution stage timings
//!
//! Both execution paths share one stage-turn routine, so continuation
//! checking, cancellation, recovery and tracing behave identically.

mod builder;
mod compiler;
mod executor;
mod inspector;
mod stages;
mod trace;

pub use builder::{PipelineBuilder, StageEntry};
pub use compiler::{CompiledPipeline, PipelineCompiler, StageFactory, StageRegistration};
pub use executor::PipelineExecutor;
pub use inspector::PipelineInspector;
pub use stages::{Branch, Conditional};
pub use trace::{DebugTrace, TraceStep};
