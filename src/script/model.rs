// src/script/model.rs

use serde::Deserialize;

/// Top-level build script as read from a TOML file.
///
/// ```toml
/// jobs = 4
///
/// [[rule]]
/// target = "hello.exe"
/// depends = ["hello.o", "main.o"]
/// cmd = "cc -o {target} {deps}"
///
/// [[rule]]
/// target = "%.o"
/// depends = ["%.c", "hello.h"]
/// cmd = "cc -c -o {target} {dep:0}"
///
/// [[task]]
/// name = "clean"
/// cmd = "rm -f *.o hello.exe"
/// default = true
///
/// [[check]]
/// resource = "https://example.com/data"
/// cmd = "curl -sI {resource} | grep -i etag"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptFile {
    /// Default parallelism; the `-j` flag overrides it.
    #[serde(default)]
    pub jobs: Option<usize>,

    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleSection>,

    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskSection>,

    #[serde(default, rename = "check")]
    pub checks: Vec<CheckSection>,
}

/// One `[[rule]]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSection {
    /// Single target form; merged with `targets`.
    #[serde(default)]
    pub target: Option<String>,

    /// Enumerated target list. With `pattern` set this becomes a
    /// static-pattern rule.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Static-pattern template mapping each enumerated target to its stem.
    #[serde(default)]
    pub pattern: Option<String>,

    #[serde(default)]
    pub depends: Vec<String>,

    /// Order-only prerequisites: must exist before the rule runs, never
    /// trigger rebuilds.
    #[serde(default)]
    pub uses: Vec<String>,

    /// Shell command template.
    pub cmd: String,
}

impl RuleSection {
    pub fn effective_targets(&self) -> Vec<&str> {
        self.target
            .iter()
            .map(String::as_str)
            .chain(self.targets.iter().map(String::as_str))
            .collect()
    }
}

/// One `[[task]]` section: a file-less, always-stale rule.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSection {
    pub name: String,

    #[serde(default)]
    pub default: bool,

    #[serde(default)]
    pub depends: Vec<String>,

    #[serde(default)]
    pub uses: Vec<String>,

    pub cmd: String,

    /// One-line description shown by `--list`.
    #[serde(default)]
    pub description: Option<String>,
}

/// One `[[check]]` section: a staleness probe for virtual resources. The
/// command's stdout is the probed value.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckSection {
    #[serde(default)]
    pub resource: Option<String>,

    #[serde(default)]
    pub resources: Vec<String>,

    pub cmd: String,
}

impl CheckSection {
    pub fn effective_resources(&self) -> Vec<&str> {
        self.resource
            .iter()
            .map(String::as_str)
            .chain(self.resources.iter().map(String::as_str))
            .collect()
    }
}
