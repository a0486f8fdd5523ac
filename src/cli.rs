// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::Parser;

/// Command-line arguments for `ruledag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ruledag",
    version,
    about = "Build targets from declared rules, in parallel, rebuilding only what is stale.",
    long_about = None
)]
pub struct CliArgs {
    /// Targets to build. Empty means the default task.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Maximum number of handlers running concurrently.
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Watch these directories and re-run the build on change.
    #[arg(short = 'w', long = "watch", value_name = "DIR", num_args = 1..)]
    pub watch: Vec<String>,

    /// Prefer commit timestamps over file modification times for files
    /// whose worktree copy matches the committed snapshot.
    #[arg(short = 'g', long = "commit-time")]
    pub commit_time: bool,

    /// Define a parameter available to command templates as {params.KEY}.
    #[arg(short = 'D', long = "define", value_name = "KEY=VAL")]
    pub defines: Vec<String>,

    /// Path to the build script.
    #[arg(short = 'f', long = "file", value_name = "FILE", default_value = "Ruledag.toml")]
    pub file: String,

    /// List tasks and exit.
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Verbose logging (debug level).
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
