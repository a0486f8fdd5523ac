// src/rules/mod.rs

//! Rule and check registration.
//!
//! - [`registry`] stores rules and checks and selects the best rule for a
//!   target, binding concrete dependency lists.
//! - [`handler`] defines the seams the execution layer plugs into: the
//!   [`handler::Handler`] a rule runs and the [`handler::Probe`] a check
//!   evaluates.

pub mod handler;
pub mod registry;

pub use handler::{BoxFuture, Handler, Invocation, Probe};
pub use registry::{Check, Depends, Registry, Rule, RuleKind, Selection};
