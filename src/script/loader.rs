// src/script/loader.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::errors::Result;
use crate::exec::{CommandProbe, ShellHandler};
use crate::rules::{Depends, Registry};
use crate::script::model::ScriptFile;
use crate::script::validate::validate_script;

/// The script looked for when `-f` is not given.
pub fn default_script_path() -> PathBuf {
    PathBuf::from("Ruledag.toml")
}

/// Read and deserialize a script file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ScriptFile> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading build script at {path:?}"))?;
    let script: ScriptFile = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML build script at {path:?}"))?;
    Ok(script)
}

/// Read, deserialize and semantically validate a script file.
///
/// This is the entry point the rest of the application uses; everything it
/// rejects is a configuration error (exit code 2) surfaced before any
/// handler runs.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ScriptFile> {
    let script = load_from_path(&path)?;
    validate_script(&script).with_context(|| {
        format!("validating build script at {:?}", path.as_ref())
    })?;
    Ok(script)
}

/// Turn a validated script into a rule registry with shell-command handlers
/// and probes. `params` values come from `-D KEY=VAL` flags and feed the
/// `{params.*}` placeholders.
pub fn registry_from_script(
    script: &ScriptFile,
    params: HashMap<String, String>,
) -> Result<Registry> {
    let params = Arc::new(params);
    let mut registry = Registry::new();

    for rule in &script.rules {
        let targets = rule.effective_targets();
        registry.add_rule(
            &targets,
            rule.pattern.as_deref(),
            Depends::from(rule.depends.iter().cloned()),
            &rule.uses.iter().map(String::as_str).collect::<Vec<_>>(),
            Arc::new(ShellHandler::new(&rule.cmd, Arc::clone(&params))),
        )?;
    }

    for task in &script.tasks {
        registry.add_task(
            &task.name,
            task.default,
            Depends::from(task.depends.iter().cloned()),
            &task.uses.iter().map(String::as_str).collect::<Vec<_>>(),
            Arc::new(ShellHandler::new(&task.cmd, Arc::clone(&params))),
            task.description.as_deref(),
        )?;
    }

    for check in &script.checks {
        let resources = check.effective_resources();
        registry.add_check(
            &resources,
            Arc::new(CommandProbe::new(&check.cmd, Arc::clone(&params))),
        )?;
    }

    Ok(registry)
}
