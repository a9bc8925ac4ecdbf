#![allow(dead_code)]

use conduit::{CancellationToken, Event, PipelineContext, Request};

// ============================================================================
// Test Event Types
// ============================================================================

#[derive(Clone, Debug)]
pub struct Ping {
    pub n: u32,
}

impl Event for Ping {}

#[derive(Clone, Debug)]
pub struct Greeted {
    pub name: String,
}

impl Event for Greeted {}

// ============================================================================
// Test Request Types
// ============================================================================

pub struct Echo(pub String);

impl Request for Echo {
    type Response = String;
}

/// Re-sends itself from inside its own handler.
pub struct Recurse;

impl Request for Recurse {
    type Response = u32;
}

pub struct Outer;

impl Request for Outer {
    type Response = u32;
}

pub struct Middle;

impl Request for Middle {
    type Response = u32;
}

pub struct Inner;

impl Request for Inner {
    type Response = u32;
}

// ============================================================================
// Pipeline Context
// ============================================================================

#[derive(Default)]
pub struct Job {
    pub validate: bool,
    pub admin: bool,
    pub cancellation: Option<CancellationToken>,
}

impl PipelineContext for Job {
    fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }
}
