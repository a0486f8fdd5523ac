// src/exec/command.rs

//! Shell command handlers and probes.
//!
//! Command templates substitute `{target}`, `{deps}`, `{dep:N}`, `{stem}`,
//! `{resource}` and `{params.KEY}` placeholders before the command runs
//! through the platform shell. `{{` and `}}` escape literal braces. Missing
//! params expand to the empty string; every other unresolvable placeholder
//! is an error, caught at load time by [`validate_template`].

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::rules::{BoxFuture, Handler, Invocation, Probe};

/// Which placeholders a template may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Rule or task commands: `{target}`, `{deps}`, `{dep:N}`, `{stem}`.
    Rule,
    /// Check commands: `{resource}`.
    Check,
}

/// A rule handler that runs a shell command template.
pub struct ShellHandler {
    template: String,
    params: Arc<HashMap<String, String>>,
}

impl ShellHandler {
    pub fn new(template: impl Into<String>, params: Arc<HashMap<String, String>>) -> Self {
        Self {
            template: template.into(),
            params,
        }
    }
}

impl Handler for ShellHandler {
    fn run(&self, inv: Invocation) -> BoxFuture<Result<()>> {
        let template = self.template.clone();
        let params = Arc::clone(&self.params);
        Box::pin(async move {
            let ctx = ExpandCtx {
                target: Some(&inv.target),
                deps: Some(&inv.depends),
                stem: inv.stem.as_deref(),
                resource: None,
                params: &params,
            };
            let cmd = expand(&template, &ctx).map_err(|reason| Error::HandlerFailed {
                target: inv.target.clone(),
                reason,
            })?;

            info!(target = %inv.target, cmd = %cmd, "run");
            let status = shell_command(&cmd)
                .status()
                .await
                .map_err(|e| Error::HandlerFailed {
                    target: inv.target.clone(),
                    reason: format!("spawning shell: {e}"),
                })?;
            if !status.success() {
                return Err(Error::HandlerFailed {
                    target: inv.target.clone(),
                    reason: format!("command exited with {}", status),
                });
            }
            Ok(())
        })
    }
}

/// A check probe that runs a shell command and reports its stdout as the
/// probed value.
pub struct CommandProbe {
    template: String,
    params: Arc<HashMap<String, String>>,
}

impl CommandProbe {
    pub fn new(template: impl Into<String>, params: Arc<HashMap<String, String>>) -> Self {
        Self {
            template: template.into(),
            params,
        }
    }
}

impl Probe for CommandProbe {
    fn probe(&self, resource: &str) -> BoxFuture<Result<String>> {
        let template = self.template.clone();
        let params = Arc::clone(&self.params);
        let resource = resource.to_string();
        Box::pin(async move {
            let ctx = ExpandCtx {
                target: None,
                deps: None,
                stem: None,
                resource: Some(&resource),
                params: &params,
            };
            let cmd = expand(&template, &ctx).map_err(|reason| Error::CheckProbeFailed {
                resource: resource.clone(),
                reason,
            })?;

            debug!(resource = %resource, cmd = %cmd, "probe");
            let output = shell_command(&cmd)
                .stdout(Stdio::piped())
                .output()
                .await
                .map_err(|e| Error::CheckProbeFailed {
                    resource: resource.clone(),
                    reason: format!("spawning shell: {e}"),
                })?;
            if !output.status.success() {
                return Err(Error::CheckProbeFailed {
                    resource,
                    reason: format!("command exited with {}", output.status),
                });
            }
            let value = String::from_utf8_lossy(&output.stdout)
                .trim_end_matches('\n')
                .to_string();
            Ok(value)
        })
    }
}

fn shell_command(cmd: &str) -> Command {
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };
    command.kill_on_drop(true);
    command
}

/// Check a template's syntax and placeholder names without running it.
pub fn validate_template(template: &str, kind: TemplateKind) -> std::result::Result<(), String> {
    for name in placeholder_names(template)? {
        let known = match kind {
            TemplateKind::Rule => {
                name == "target"
                    || name == "deps"
                    || name == "stem"
                    || name.starts_with("dep:")
                    || name.starts_with("params.")
            }
            TemplateKind::Check => name == "resource" || name.starts_with("params."),
        };
        if !known {
            return Err(format!("unknown placeholder '{{{name}}}'"));
        }
        if let Some(index) = name.strip_prefix("dep:") {
            if index.parse::<usize>().is_err() {
                return Err(format!("bad dependency index in '{{{name}}}'"));
            }
        }
    }
    Ok(())
}

struct ExpandCtx<'a> {
    target: Option<&'a str>,
    deps: Option<&'a [String]>,
    stem: Option<&'a str>,
    resource: Option<&'a str>,
    params: &'a HashMap<String, String>,
}

impl ExpandCtx<'_> {
    fn lookup(&self, name: &str) -> std::result::Result<String, String> {
        if let Some(key) = name.strip_prefix("params.") {
            // Unset params expand empty so scripts can use optional flags.
            return Ok(self.params.get(key).cloned().unwrap_or_default());
        }
        match name {
            "target" => self
                .target
                .map(str::to_string)
                .ok_or_else(|| "'{target}' is not available here".to_string()),
            "deps" => self
                .deps
                .map(|d| d.join(" "))
                .ok_or_else(|| "'{deps}' is not available here".to_string()),
            "stem" => self
                .stem
                .map(str::to_string)
                .ok_or_else(|| "'{stem}' requires a pattern-matched rule".to_string()),
            "resource" => self
                .resource
                .map(str::to_string)
                .ok_or_else(|| "'{resource}' is only available in checks".to_string()),
            other => {
                if let Some(index) = other.strip_prefix("dep:") {
                    let index: usize = index
                        .parse()
                        .map_err(|_| format!("bad dependency index in '{{{other}}}'"))?;
                    let deps = self
                        .deps
                        .ok_or_else(|| "'{dep:N}' is not available here".to_string())?;
                    return deps
                        .get(index)
                        .cloned()
                        .ok_or_else(|| format!("rule has no dependency {index}"));
                }
                Err(format!("unknown placeholder '{{{other}}}'"))
            }
        }
    }
}

fn expand(template: &str, ctx: &ExpandCtx<'_>) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err("unterminated '{' placeholder".to_string()),
                    }
                }
                out.push_str(&ctx.lookup(&name)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Placeholder names appearing in a template, validating brace syntax.
fn placeholder_names(template: &str) -> std::result::Result<Vec<String>, String> {
    let mut names = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err("unterminated '{' placeholder".to_string()),
                    }
                }
                names.push(name);
            }
            _ => {}
        }
    }
    Ok(names)
}
