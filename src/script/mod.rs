// src/script/mod.rs

//! The TOML build-script host.
//!
//! The core engine only consumes a [`crate::rules::Registry`]; this module
//! is the default host that produces one from a `Ruledag.toml` file, with
//! shell commands as handlers and probes.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_script_path, load_and_validate, registry_from_script};
pub use model::{CheckSection, RuleSection, ScriptFile, TaskSection};
