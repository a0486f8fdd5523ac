// src/stale/oracle.rs

//! The staleness oracle.
//!
//! For every node the scheduler is about to dispatch, the oracle compares
//! the node's effective timestamp against those of its `depends` children.
//! Effective timestamps come from the filesystem for file nodes, from the
//! check probe (validated against the persisted store) for virtual nodes,
//! and from commit history for clean worktree files in commit-time mode.
//!
//! `uses` edges are never consulted here; they only order execution.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::graph::{Graph, Node, NodeId, NodeKind};
use crate::rules::Registry;
use crate::stale::commit::CommitTimes;
use crate::stale::store::CheckStore;

/// A node's effective timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// No artifact on disk (or a task, which has none by definition).
    Missing,
    At(SystemTime),
}

impl Stamp {
    pub fn newer_than(&self, other: &Stamp) -> bool {
        match (self, other) {
            (Stamp::At(a), Stamp::At(b)) => a > b,
            (Stamp::At(_), Stamp::Missing) => true,
            (Stamp::Missing, _) => false,
        }
    }
}

pub struct Oracle {
    /// The only mutable shared state during a run; one lock guards a whole
    /// probe-and-update sequence.
    store: Mutex<CheckStore>,
    commit_times: Option<Mutex<CommitTimes>>,
}

impl Oracle {
    pub fn new(store: CheckStore, commit_time_mode: bool) -> Self {
        Self {
            store: Mutex::new(store),
            commit_times: commit_time_mode.then(|| Mutex::new(CommitTimes::new())),
        }
    }

    /// Persist the check store. Called at completion, including on a clean
    /// failure exit.
    pub async fn flush(&self) -> Result<()> {
        self.store.lock().await.flush()
    }

    /// Decide whether `node` needs its handler run.
    ///
    /// Stamps for the node and all its `depends` children are always
    /// computed (and memoized in `stamps`), so probe values are refreshed in
    /// the store every run even when the decision is already made.
    pub async fn is_stale(
        &self,
        graph: &Graph,
        registry: &Registry,
        node: &Node,
        built: &HashSet<NodeId>,
        stamps: &mut HashMap<NodeId, Stamp>,
    ) -> Result<bool> {
        let self_stamp = self.stamp(registry, node, stamps).await?;
        let mut dep_stamps = Vec::with_capacity(node.depends.len());
        for &dep in &node.depends {
            let stamp = self.stamp(registry, graph.node(dep), stamps).await?;
            dep_stamps.push((dep, stamp));
        }

        if !node.has_rule() {
            // Source leaf; nothing to run.
            return Ok(false);
        }

        if node.kind == NodeKind::Task {
            return Ok(true);
        }

        if node.kind == NodeKind::File && self_stamp == Stamp::Missing {
            debug!(target = %node.name, "output missing; stale");
            return Ok(true);
        }

        for (dep, stamp) in dep_stamps {
            if built.contains(&dep) {
                debug!(target = %node.name, dep = %graph.node(dep).name, "dependency rebuilt this run; stale");
                return Ok(true);
            }
            if stamp.newer_than(&self_stamp) {
                debug!(target = %node.name, dep = %graph.node(dep).name, "dependency newer than target; stale");
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Effective timestamp for a node, memoized per run.
    async fn stamp(
        &self,
        registry: &Registry,
        node: &Node,
        stamps: &mut HashMap<NodeId, Stamp>,
    ) -> Result<Stamp> {
        if let Some(stamp) = stamps.get(&node.id) {
            return Ok(*stamp);
        }
        let stamp = match node.kind {
            NodeKind::Task => Stamp::Missing,
            NodeKind::Virtual => self.probe_stamp(registry, &node.name).await?,
            NodeKind::File => self.file_stamp(&node.name).await?,
        };
        stamps.insert(node.id, stamp);
        Ok(stamp)
    }

    async fn file_stamp(&self, name: &str) -> Result<Stamp> {
        if let Some(commit_times) = &self.commit_times {
            if let Some(time) = commit_times.lock().await.committed_time(name).await {
                return Ok(Stamp::At(time));
            }
        }
        match std::fs::metadata(name) {
            Ok(meta) => Ok(Stamp::At(meta.modified()?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Stamp::Missing),
            Err(err) => Err(err.into()),
        }
    }

    /// Probe a virtual resource and compare against the persisted value.
    ///
    /// A changed (or first-seen) value stamps the resource "just changed";
    /// an unchanged value keeps the time the store first saw it. A failing
    /// probe invalidates the stored entry and surfaces as a build error.
    async fn probe_stamp(&self, registry: &Registry, resource: &str) -> Result<Stamp> {
        let check = match registry.matching_check(resource) {
            Some(check) => check,
            // Node kinds are assigned from the same registry at graph
            // construction, so this cannot happen for a Virtual node.
            None => {
                return Err(Error::CheckProbeFailed {
                    resource: resource.to_string(),
                    reason: "no registered check matches this resource".to_string(),
                })
            }
        };

        let probe = check.probe();
        let mut store = self.store.lock().await;
        let value = match probe.probe(resource).await {
            Ok(value) => value,
            Err(err) => {
                store.invalidate(resource);
                return Err(match err {
                    already @ Error::CheckProbeFailed { .. } => already,
                    other => Error::CheckProbeFailed {
                        resource: resource.to_string(),
                        reason: other.to_string(),
                    },
                });
            }
        };

        match store.get(resource) {
            Some(entry) if entry.value == value => {
                Ok(Stamp::At(UNIX_EPOCH + Duration::from_secs(entry.recorded_at)))
            }
            _ => {
                // Full precision for this run's comparisons; the store keeps
                // seconds, which later runs only compare against files
                // written after this instant.
                let now = SystemTime::now();
                debug!(resource, value = %value, "probe value changed; recording");
                store.record(resource, value, epoch_secs(now));
                Ok(Stamp::At(now))
            }
        }
    }
}

fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
