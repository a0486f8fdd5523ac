// src/rules/handler.rs

//! The callable seams between the engine and user-supplied build logic.
//!
//! Handlers and probes are trait objects so that any host can supply them:
//! the TOML script host wraps shell commands, tests plug in recording
//! closures.

use tokio::sync::mpsc;

use crate::errors::Result;

/// Boxed future type used across the handler/probe seams.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Everything a handler receives when its target is built.
///
/// The argument shape is fixed: the target plus the rule's bound `depends`,
/// in declaration order. `uses` prerequisites are never passed.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub target: String,
    pub depends: Vec<String>,
    /// The stem the rule's `%` bound to, when the rule matched via a pattern.
    pub stem: Option<String>,
    deferred: mpsc::UnboundedSender<String>,
}

impl Invocation {
    pub(crate) fn new(
        target: String,
        depends: Vec<String>,
        stem: Option<String>,
        deferred: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            target,
            depends,
            stem,
            deferred,
        }
    }

    /// Enqueue another target for building.
    ///
    /// The request is deferred: it is drained as a fresh wave after the
    /// current one completes, never mid-run.
    pub fn enqueue(&self, target: impl Into<String>) {
        // The receiver only closes once the engine is done; a failed send
        // means there will be no further wave to pick the request up anyway.
        let _ = self.deferred.send(target.into());
    }
}

/// A rule's build action.
pub trait Handler: Send + Sync {
    fn run(&self, inv: Invocation) -> BoxFuture<Result<()>>;
}

impl<F> Handler for F
where
    F: Fn(Invocation) -> BoxFuture<Result<()>> + Send + Sync,
{
    fn run(&self, inv: Invocation) -> BoxFuture<Result<()>> {
        self(inv)
    }
}

/// A staleness probe for virtual resources.
///
/// The returned value is opaque to the engine; it is only compared against
/// the value persisted from the previous run.
pub trait Probe: Send + Sync {
    fn probe(&self, resource: &str) -> BoxFuture<Result<String>>;
}

impl<F> Probe for F
where
    F: Fn(&str) -> BoxFuture<Result<String>> + Send + Sync,
{
    fn probe(&self, resource: &str) -> BoxFuture<Result<String>> {
        self(resource)
    }
}
