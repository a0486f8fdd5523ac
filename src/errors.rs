// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Errors fall into two classes with distinct process exit codes:
//!
//! - *configuration* errors (bad rules, cycles, unknown targets) abort before
//!   any handler runs and map to exit code 2;
//! - *build* errors (failed handlers, missing outputs, interrupts) mark nodes
//!   failed and map to exit code 1.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no rule to make target '{target}'{}", required_by_suffix(.required_by))]
    NoRuleForTarget {
        target: String,
        required_by: Option<String>,
    },

    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("tasks '{0}' and '{1}' are both marked as the default task")]
    MultipleDefaults(String, String),

    #[error("handler for '{target}' failed: {reason}")]
    HandlerFailed { target: String, reason: String },

    #[error("rule for '{0}' succeeded but did not produce the output file")]
    TargetNotProduced(String),

    #[error("check probe for '{resource}' failed: {reason}")]
    CheckProbeFailed { resource: String, reason: String },

    #[error("build interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Script loading / parsing problems, with `anyhow` context attached by
    /// the loader. Always a configuration error.
    #[error(transparent)]
    Script(#[from] anyhow::Error),
}

impl Error {
    /// Process exit code for this error: 2 for configuration errors, 1 for
    /// build errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NoRuleForTarget { .. }
            | Error::CycleDetected(_)
            | Error::InvalidPattern { .. }
            | Error::MultipleDefaults(_, _)
            | Error::Script(_) => 2,
            Error::HandlerFailed { .. }
            | Error::TargetNotProduced(_)
            | Error::CheckProbeFailed { .. }
            | Error::Interrupted
            | Error::Io(_) => 1,
        }
    }
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(parent) => format!(" (required by '{parent}')"),
        None => String::new(),
    }
}
