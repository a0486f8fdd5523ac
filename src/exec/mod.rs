// src/exec/mod.rs

//! Process execution layer.
//!
//! The TOML script host describes handlers and probes as shell command
//! templates; this module turns them into [`crate::rules::Handler`] and
//! [`crate::rules::Probe`] implementations backed by
//! `tokio::process::Command`.

pub mod command;

pub use command::{validate_template, CommandProbe, ShellHandler, TemplateKind};
