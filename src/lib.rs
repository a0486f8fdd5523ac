// src/lib.rs

pub mod canon;
pub mod cli;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod pattern;
pub mod rules;
pub mod sched;
pub mod script;
pub mod stale;
pub mod watch;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch as watch_channel};
use tracing::{error, info, warn};

use crate::cli::CliArgs;
use crate::errors::{Error, Result};
use crate::graph::GraphBuilder;
use crate::rules::Registry;
use crate::sched::Scheduler;
use crate::stale::{CheckStore, Oracle};

/// Directory holding persisted engine state (the check-value store).
pub const STATE_DIR: &str = ".ruledag";

/// Knobs for one engine invocation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Maximum concurrent handlers.
    pub jobs: usize,
    /// Prefer commit timestamps for clean worktree files.
    pub commit_time: bool,
    /// Where the check-value store lives.
    pub state_dir: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            commit_time: false,
            state_dir: PathBuf::from(STATE_DIR),
        }
    }
}

/// Counts across all waves of one invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildReport {
    pub built: usize,
    pub skipped: usize,
    pub waves: usize,
}

/// Resolve and build the requested targets with the given registry.
///
/// This is the core entry point: resolution happens first (configuration
/// errors surface before any handler runs), then waves execute until the
/// deferred-build queue is drained. The check store is flushed at
/// completion, including on a failure exit.
pub async fn build_targets<S: AsRef<str>>(
    registry: &Registry,
    options: &BuildOptions,
    targets: &[S],
) -> Result<BuildReport> {
    // No external interrupt source; keep the sender alive for the duration.
    let (_interrupt_tx, interrupt_rx) = watch_channel::channel(0u32);
    build_targets_with_interrupts(registry, options, targets, interrupt_rx).await
}

/// [`build_targets`] with an external interrupt counter (one bump cancels
/// dispatch, a second aborts running handlers).
pub async fn build_targets_with_interrupts<S: AsRef<str>>(
    registry: &Registry,
    options: &BuildOptions,
    targets: &[S],
    interrupts: watch_channel::Receiver<u32>,
) -> Result<BuildReport> {
    let store = CheckStore::load(&options.state_dir);
    let oracle = Oracle::new(store, options.commit_time);
    let mut builder = GraphBuilder::new(registry);
    let (deferred_tx, mut deferred_rx) = mpsc::unbounded_channel::<String>();

    let mut report = BuildReport::default();
    let mut roots = builder.resolve_all(targets)?;

    let mut result = loop {
        let scheduler = Scheduler::new(
            builder.graph(),
            registry,
            &oracle,
            options.jobs,
            &roots,
            deferred_tx.clone(),
            interrupts.clone(),
        );
        match scheduler.run().await {
            Ok(summary) => {
                report.built += summary.built;
                report.skipped += summary.skipped;
                report.waves += 1;

                let mut next: Vec<String> = Vec::new();
                while let Ok(name) = deferred_rx.try_recv() {
                    if !next.contains(&name) {
                        next.push(name);
                    }
                }
                if next.is_empty() {
                    break Ok(());
                }
                info!(targets = ?next, "running deferred build requests");
                match builder.resolve_all(&next) {
                    Ok(ids) => roots = ids,
                    Err(err) => break Err(err),
                }
            }
            Err(err) => break Err(err),
        }
    };

    if let Err(flush_err) = oracle.flush().await {
        warn!(error = %flush_err, "failed to flush check store");
        if result.is_ok() {
            result = Err(flush_err);
        }
    }

    result.map(|()| report)
}

/// High-level entry point used by `main.rs`.
///
/// Wires together the script host, the registry, interrupt handling, the
/// engine itself, and (optionally) the file watcher.
pub async fn run(args: CliArgs) -> Result<()> {
    let params = parse_defines(&args.defines)?;
    let script = script::load_and_validate(&args.file)?;
    let registry = script::registry_from_script(&script, params)?;

    if args.list {
        print_tasks(&registry);
        return Ok(());
    }

    let options = BuildOptions {
        jobs: args.jobs.or(script.jobs).unwrap_or(1).max(1),
        commit_time: args.commit_time,
        state_dir: PathBuf::from(STATE_DIR),
    };

    let targets: Vec<String> = if args.targets.is_empty() {
        match registry.default_target() {
            Some(target) => vec![target],
            None => {
                return Err(Error::Script(anyhow!(
                    "no targets requested and the script declares no default"
                )))
            }
        }
    } else {
        args.targets.clone()
    };

    // Ctrl-C → interrupt counter. The first bump stops new dispatch; the
    // second aborts running handlers and their subprocesses.
    let (interrupt_tx, interrupt_rx) = watch_channel::channel(0u32);
    tokio::spawn(async move {
        let mut count = 0u32;
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            count += 1;
            if interrupt_tx.send(count).is_err() {
                return;
            }
        }
    });

    if args.watch.is_empty() {
        let report =
            build_targets_with_interrupts(&registry, &options, &targets, interrupt_rx).await?;
        report_outcome(&report);
        return Ok(());
    }

    // Watch mode: build, then re-run on every batch of filesystem changes.
    let dirs: Vec<PathBuf> = args.watch.iter().map(PathBuf::from).collect();
    let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(16);
    let _watcher = watch::spawn_watcher(&dirs, options.state_dir.clone(), trigger_tx)?;

    loop {
        let outcome =
            build_targets_with_interrupts(&registry, &options, &targets, interrupt_rx.clone())
                .await;
        match outcome {
            Ok(report) => report_outcome(&report),
            Err(err @ Error::Interrupted) => return Err(err),
            Err(err) if err.exit_code() == 1 => {
                error!(error = %err, "build failed; watching for changes");
            }
            Err(err) => return Err(err),
        }

        if trigger_rx.recv().await.is_none() {
            return Ok(());
        }
        // Settle, then coalesce the burst of events one save tends to emit.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        while trigger_rx.try_recv().is_ok() {}
    }
}

fn report_outcome(report: &BuildReport) {
    if report.built == 0 {
        info!(skipped = report.skipped, "nothing to do; everything is up to date");
    } else {
        info!(
            built = report.built,
            skipped = report.skipped,
            "build finished"
        );
    }
}

fn print_tasks(registry: &Registry) {
    println!("tasks:");
    for (name, default, description) in registry.tasks() {
        let marker = if default { "*" } else { " " };
        match description {
            Some(desc) => println!("  {marker} {name}  {desc}"),
            None => println!("  {marker} {name}"),
        }
    }
}

fn parse_defines(defines: &[String]) -> Result<HashMap<String, String>> {
    let mut params = HashMap::new();
    for define in defines {
        match define.split_once('=') {
            Some((key, value)) => {
                params.insert(key.to_string(), value.to_string());
            }
            None => {
                return Err(Error::Script(anyhow!(
                    "bad -D flag '{define}': expected KEY=VAL"
                )))
            }
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defines_parse_into_params() {
        let params =
            parse_defines(&["mode=release".to_string(), "empty=".to_string()]).unwrap();
        assert_eq!(params.get("mode").map(String::as_str), Some("release"));
        assert_eq!(params.get("empty").map(String::as_str), Some(""));
        assert!(parse_defines(&["oops".to_string()]).is_err());
    }
}
