// src/script/validate.rs

use anyhow::{anyhow, Result};

use crate::exec::{validate_template, TemplateKind};
use crate::script::model::ScriptFile;

/// Semantic validation of a loaded script, before any registry is built.
///
/// This checks the things TOML deserialization cannot:
/// - every rule names at least one target and a non-empty command
/// - command templates use known placeholders with valid syntax
/// - at most one task is marked default
/// - checks name at least one resource pattern
///
/// Pattern-level errors (multiple `%`, bad static-pattern templates) are
/// reported by the registry during registration, with their structured
/// error kinds.
pub fn validate_script(script: &ScriptFile) -> Result<()> {
    if script.jobs == Some(0) {
        return Err(anyhow!("jobs must be >= 1 (got 0)"));
    }

    for (i, rule) in script.rules.iter().enumerate() {
        if rule.effective_targets().is_empty() {
            return Err(anyhow!("[[rule]] #{} has no target", i + 1));
        }
        if rule.cmd.trim().is_empty() {
            return Err(anyhow!("[[rule]] #{} has an empty cmd", i + 1));
        }
        validate_template(&rule.cmd, TemplateKind::Rule)
            .map_err(|e| anyhow!("[[rule]] #{}: {e}", i + 1))?;
    }

    for task in &script.tasks {
        if task.name.trim().is_empty() {
            return Err(anyhow!("a [[task]] has an empty name"));
        }
        if task.cmd.trim().is_empty() {
            return Err(anyhow!("task '{}' has an empty cmd", task.name));
        }
        validate_template(&task.cmd, TemplateKind::Rule)
            .map_err(|e| anyhow!("task '{}': {e}", task.name))?;
    }

    let defaults: Vec<&str> = script
        .tasks
        .iter()
        .filter(|t| t.default)
        .map(|t| t.name.as_str())
        .collect();
    if defaults.len() > 1 {
        return Err(anyhow!(
            "tasks {} are all marked default; only one may be",
            defaults.join(", ")
        ));
    }

    for (i, check) in script.checks.iter().enumerate() {
        if check.effective_resources().is_empty() {
            return Err(anyhow!("[[check]] #{} has no resource pattern", i + 1));
        }
        validate_template(&check.cmd, TemplateKind::Check)
            .map_err(|e| anyhow!("[[check]] #{}: {e}", i + 1))?;
    }

    Ok(())
}
