// src/sched/scheduler.rs

//! The supervisory scheduler loop.
//!
//! A single task drives the whole wave: it promotes pending nodes whose
//! children have terminated, asks the oracle whether each newly-ready node
//! is stale, and dispatches stale nodes to spawned worker tasks, at most
//! `jobs` at a time. Workers report back over an mpsc channel; interrupts
//! arrive over a watch channel (first one cancels dispatch, the second
//! aborts running workers).

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};
use crate::graph::{Graph, NodeId, NodeKind};
use crate::rules::{Handler, Invocation, Registry};
use crate::sched::state::StateTable;
use crate::stale::{Oracle, Stamp};

/// Completion report from a worker task.
#[derive(Debug)]
pub enum WorkerEvent {
    Finished { node: NodeId, result: Result<()> },
}

/// What the supervisory loop woke up for.
enum Waited {
    Worker(WorkerEvent),
    Interrupt,
    InterruptsClosed,
    WorkersClosed,
}

/// Counts for one completed wave.
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    pub built: usize,
    pub skipped: usize,
}

pub struct Scheduler<'a> {
    graph: &'a Graph,
    registry: &'a Registry,
    oracle: &'a Oracle,
    jobs: usize,

    states: StateTable,
    stamps: HashMap<NodeId, Stamp>,
    levels: Vec<usize>,
    /// Stale ready nodes waiting for a worker slot.
    queue: Vec<NodeId>,
    running: HashMap<NodeId, JoinHandle<()>>,

    events_tx: mpsc::Sender<WorkerEvent>,
    events_rx: mpsc::Receiver<WorkerEvent>,
    deferred: mpsc::UnboundedSender<String>,
    interrupts: watch::Receiver<u32>,
    interrupts_closed: bool,

    cancelled: bool,
    first_error: Option<Error>,
    built_count: usize,
    skipped_count: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        graph: &'a Graph,
        registry: &'a Registry,
        oracle: &'a Oracle,
        jobs: usize,
        roots: &[NodeId],
        deferred: mpsc::UnboundedSender<String>,
        interrupts: watch::Receiver<u32>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            graph,
            registry,
            oracle,
            jobs: jobs.max(1),
            states: StateTable::for_roots(graph, roots),
            stamps: HashMap::new(),
            levels: topo_levels(graph),
            queue: Vec::new(),
            running: HashMap::new(),
            events_tx,
            events_rx,
            deferred,
            interrupts,
            interrupts_closed: false,
            cancelled: false,
            first_error: None,
            built_count: 0,
            skipped_count: 0,
        }
    }

    /// Run the wave to completion.
    pub async fn run(mut self) -> Result<Summary> {
        loop {
            let progressed = self.step().await;

            if self.states.all_terminal() && self.running.is_empty() {
                break;
            }
            if progressed {
                // Skipping or failing nodes may have unblocked parents;
                // promote again before waiting.
                continue;
            }
            if self.running.is_empty() {
                // Nothing running and nothing promotable: the graph is
                // acyclic, so this indicates a bookkeeping bug.
                return Err(Error::Script(anyhow::anyhow!(
                    "scheduler stalled with unfinished targets"
                )));
            }

            match self.wait_for_event().await {
                Waited::Worker(WorkerEvent::Finished { node, result }) => {
                    self.handle_finished(node, result);
                }
                Waited::Interrupt => self.handle_interrupt(),
                Waited::InterruptsClosed => self.interrupts_closed = true,
                Waited::WorkersClosed => {}
            }
        }

        match self.first_error.take() {
            Some(err) => Err(err),
            None => Ok(Summary {
                built: self.built_count,
                skipped: self.skipped_count,
            }),
        }
    }

    /// One promote / staleness / dispatch pass. Returns whether any node
    /// changed state.
    async fn step(&mut self) -> bool {
        let promotions = self.states.promote(self.graph);
        let mut progressed = promotions.failed > 0;

        for id in promotions.ready {
            progressed = true;
            if self.cancelled {
                self.states.fail(self.graph, id);
                continue;
            }
            let node = self.graph.node(id);
            let stale = self
                .oracle
                .is_stale(
                    self.graph,
                    self.registry,
                    node,
                    self.states.built(),
                    &mut self.stamps,
                )
                .await;
            match stale {
                Ok(true) => self.queue.push(id),
                Ok(false) => {
                    debug!(target = %node.name, "up to date");
                    self.states.skip(id);
                    self.skipped_count += 1;
                }
                Err(err) => self.fail_node(id, err),
            }
        }

        // Dispatch order: topological level, then registration ordinal.
        let levels = &self.levels;
        let graph = self.graph;
        self.queue.sort_by_key(|&id| {
            let node = graph.node(id);
            (levels[id.index()], node.rule.unwrap_or(usize::MAX), id)
        });

        while !self.cancelled && self.running.len() < self.jobs {
            let Some(pos) = self
                .queue
                .iter()
                .position(|&id| self.can_dispatch(id))
            else {
                break;
            };
            let id = self.queue.remove(pos);
            if !self.dispatch(id) {
                self.queue.push(id);
                break;
            }
            progressed = true;
        }

        if self.cancelled && !self.queue.is_empty() {
            for id in std::mem::take(&mut self.queue) {
                self.states.fail(self.graph, id);
                progressed = true;
            }
        }

        progressed
    }

    fn can_dispatch(&self, id: NodeId) -> bool {
        // The in-flight check happens again inside start_running; this only
        // avoids popping a node we would immediately have to push back.
        let name = &self.graph.node(id).name;
        !self
            .running
            .keys()
            .any(|rid| &self.graph.node(*rid).name == name)
    }

    /// Returns false when the target's canonical name is already in flight
    /// and the node must wait.
    fn dispatch(&mut self, id: NodeId) -> bool {
        let node = self.graph.node(id);
        let Some(ordinal) = node.rule else {
            // Leaves are never stale; keep the state machine honest anyway.
            self.states.skip(id);
            self.skipped_count += 1;
            return true;
        };
        if !self.states.start_running(node) {
            return false;
        }

        info!(target = %node.name, "building");
        let handler = self.registry.rule(ordinal).handler();
        let invocation = Invocation::new(
            node.name.clone(),
            node.bound_depends.clone(),
            node.stem.clone(),
            self.deferred.clone(),
        );
        let verify_output = node.kind == NodeKind::File;
        let target = node.name.clone();
        let events_tx = self.events_tx.clone();

        let handle = tokio::spawn(async move {
            let result = execute(handler, invocation, verify_output, target).await;
            let _ = events_tx.send(WorkerEvent::Finished { node: id, result }).await;
        });
        self.running.insert(id, handle);
        true
    }

    async fn wait_for_event(&mut self) -> Waited {
        tokio::select! {
            event = self.events_rx.recv() => match event {
                Some(event) => Waited::Worker(event),
                // Cannot happen while we hold a sender clone.
                None => Waited::WorkersClosed,
            },
            changed = self.interrupts.changed(), if !self.interrupts_closed => match changed {
                Ok(()) => Waited::Interrupt,
                Err(_) => Waited::InterruptsClosed,
            },
        }
    }

    fn handle_finished(&mut self, id: NodeId, result: Result<()>) {
        self.running.remove(&id);
        let node = self.graph.node(id);
        match result {
            Ok(()) => {
                debug!(target = %node.name, "built");
                if self.states.finish_built(node) {
                    self.built_count += 1;
                }
            }
            Err(err) => {
                warn!(target = %node.name, error = %err, "target failed");
                self.fail_node(id, err);
            }
        }
    }

    fn fail_node(&mut self, id: NodeId, err: Error) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
        self.states.fail(self.graph, id);
        self.cancelled = true;
    }

    fn handle_interrupt(&mut self) {
        let count = *self.interrupts.borrow_and_update();
        if !self.cancelled {
            warn!("interrupt received; finishing running targets, dispatching nothing new");
            self.cancelled = true;
            if self.first_error.is_none() {
                self.first_error = Some(Error::Interrupted);
            }
        }
        if count >= 2 && !self.running.is_empty() {
            warn!("second interrupt; aborting running targets");
            for (id, handle) in self.running.drain() {
                handle.abort();
                self.states.fail(self.graph, id);
            }
        }
    }
}

async fn execute(
    handler: std::sync::Arc<dyn Handler>,
    invocation: Invocation,
    verify_output: bool,
    target: String,
) -> Result<()> {
    match handler.run(invocation).await {
        Ok(()) => {
            if verify_output && tokio::fs::metadata(&target).await.is_err() {
                return Err(Error::TargetNotProduced(target));
            }
            Ok(())
        }
        Err(err @ Error::HandlerFailed { .. }) => Err(err),
        Err(err @ Error::Interrupted) => Err(err),
        Err(other) => Err(Error::HandlerFailed {
            target,
            reason: other.to_string(),
        }),
    }
}

/// Topological level per node: leaves at zero, parents above their deepest
/// child. Node insertion order is already topological, but deriving levels
/// from an explicit sort keeps dispatch order independent of how the graph
/// was grown across waves.
fn topo_levels(graph: &Graph) -> Vec<usize> {
    let mut dg: DiGraphMap<usize, ()> = DiGraphMap::new();
    for node in graph.nodes() {
        dg.add_node(node.id.index());
        for child in node.children() {
            dg.add_edge(child.index(), node.id.index(), ());
        }
    }
    let order = match toposort(&dg, None) {
        Ok(order) => order,
        // The builder rejects cycles; fall back to insertion order.
        Err(_) => (0..graph.len()).collect(),
    };

    let mut levels = vec![0usize; graph.len()];
    for index in order {
        let level = graph
            .node(NodeId(index))
            .children()
            .map(|c| levels[c.index()] + 1)
            .max()
            .unwrap_or(0);
        levels[index] = level;
    }
    levels
}
