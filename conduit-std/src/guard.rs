//! Recursion protection for nested request dispatch.
//!
//! Each logical call-flow carries the chain of request types currently in
//! flight. The chain lives in a Tokio task-local that is re-scoped for every
//! nested dispatch, so:
//!
//! - entering pushes by running the nested future under an extended chain,
//! - leaving restores the outer chain on every exit path (return, error, drop),
//! - concurrent dispatches never observe each other's entries.
//!
//! Work spawned onto a new task starts a fresh chain.

use conduit_core::{EventKey, RecursionError};
use std::future::Future;

/// Default bound on nested dispatch depth.
pub const DEFAULT_MAX_DEPTH: usize = 50;

tokio::task_local! {
    static IN_FLIGHT: Vec<EventKey>;
}

/// Bounds dispatch depth and rejects cyclic re-entry.
#[derive(Debug, Clone, Copy)]
pub struct DispatchGuard {
    max_depth: usize,
}

impl Default for DispatchGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl DispatchGuard {
    /// A guard allowing at most `max_depth` nested dispatches (at least one).
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    /// The configured bound.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// The chain in flight on the current call-flow, outermost first.
    pub fn current_chain() -> Vec<EventKey> {
        IN_FLIGHT.try_with(Clone::clone).unwrap_or_default()
    }

    /// Try to enter a dispatch of `key`.
    ///
    /// Fails if the chain is already at the bound or already contains `key`.
    pub fn enter(&self, key: EventKey) -> Result<DispatchScope, RecursionError> {
        let mut chain = Self::current_chain();

        if chain.len() >= self.max_depth {
            return Err(RecursionError::DepthExceeded {
                max: self.max_depth,
                entering: key.name(),
                chain: names(&chain),
            });
        }
        if chain.contains(&key) {
            return Err(RecursionError::Cycle {
                entering: key.name(),
                chain: names(&chain),
            });
        }

        chain.push(key);
        Ok(DispatchScope { chain })
    }
}

fn names(chain: &[EventKey]) -> Vec<&'static str> {
    chain.iter().map(EventKey::name).collect()
}

/// An admitted dispatch. The extended chain is active only inside [`run`].
///
/// [`run`]: DispatchScope::run
#[derive(Debug)]
pub struct DispatchScope {
    chain: Vec<EventKey>,
}

impl DispatchScope {
    /// Run `fut` with this scope's chain in flight.
    pub async fn run<F: Future>(self, fut: F) -> F::Output {
        IN_FLIGHT.scope(self.chain, fut).await
    }

    /// Nesting depth including this dispatch.
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// The chain including this dispatch.
    pub fn chain(&self) -> &[EventKey] {
        &self.chain
    }
}
