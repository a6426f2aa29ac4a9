//! Ready-frontier scheduling, failure propagation and execution planning

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::graph::{Graph, SubGraph};
use crate::node::TargetId;

/// Lifecycle state of a node within one build session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Waiting on dependencies, or never started
    Pending,
    /// All dependencies succeeded; waiting to be dispatched
    Ready,
    /// Action is executing
    Running,
    /// Rebuilt or found up to date
    Succeeded,
    /// Action failed
    Failed,
    /// Not attempted because a dependency failed
    Skipped,
}

impl NodeState {
    /// Whether the node reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// In-degree scheduler over the reachable part of a graph.
///
/// Purely synchronous: the session decides what to run, this type only
/// tracks which nodes may start next. The frontier is ordered by
/// declaration index so simultaneously ready nodes come out in
/// declaration order.
#[derive(Debug)]
pub struct Scheduler<'g> {
    graph: &'g Graph,
    reachable: SubGraph,
    states: Vec<NodeState>,
    /// Unfinished dependencies per node
    remaining: Vec<usize>,
    frontier: BTreeSet<usize>,
    rebuilt: Vec<bool>,
    /// Skipped node -> failed ancestor
    skipped_because: BTreeMap<usize, usize>,
    halted: bool,
}

impl<'g> Scheduler<'g> {
    /// Initialise counters for the reachable sub-graph, which must be acyclic
    pub fn new(graph: &'g Graph, reachable: SubGraph) -> Self {
        let mut states = vec![NodeState::Pending; graph.len()];
        let mut remaining = vec![0; graph.len()];
        let mut frontier = BTreeSet::new();

        for idx in reachable.indices() {
            remaining[idx] = graph
                .dependency_indices(idx)
                .iter()
                .filter(|&&d| reachable.contains_index(d))
                .count();
            if remaining[idx] == 0 {
                states[idx] = NodeState::Ready;
                frontier.insert(idx);
            }
        }

        debug!(
            reachable = reachable.len(),
            initially_ready = frontier.len(),
            "scheduler initialised"
        );

        Self {
            graph,
            rebuilt: vec![false; graph.len()],
            reachable,
            states,
            remaining,
            frontier,
            skipped_because: BTreeMap::new(),
            halted: false,
        }
    }

    /// Take the next ready node, lowest declaration index first.
    ///
    /// Returns `None` once halted. The node stays `Ready` until
    /// [`mark_running`](Self::mark_running) or a completion.
    pub fn pop_ready(&mut self) -> Option<usize> {
        if self.halted {
            return None;
        }
        self.frontier.pop_first()
    }

    /// Record that a node's action was dispatched
    pub fn mark_running(&mut self, idx: usize) {
        self.states[idx] = NodeState::Running;
    }

    /// Record success and release dependents whose dependencies are all
    /// done. Returns the newly ready nodes.
    pub fn complete(&mut self, idx: usize, rebuilt: bool) -> Vec<usize> {
        self.states[idx] = NodeState::Succeeded;
        self.rebuilt[idx] = rebuilt;

        let mut released = Vec::new();
        for &dependent in self.graph.dependent_indices(idx) {
            if !self.reachable.contains_index(dependent) {
                continue;
            }
            self.remaining[dependent] -= 1;
            if self.remaining[dependent] == 0 && self.states[dependent] == NodeState::Pending {
                if self.halted {
                    continue;
                }
                self.states[dependent] = NodeState::Ready;
                self.frontier.insert(dependent);
                released.push(dependent);
            }
        }
        released
    }

    /// Record a failure and mark every transitive reachable dependent as
    /// skipped. Returns the skipped nodes in traversal order.
    pub fn fail(&mut self, idx: usize) -> Vec<usize> {
        self.states[idx] = NodeState::Failed;

        let mut skipped = Vec::new();
        let mut queue: VecDeque<usize> = VecDeque::from([idx]);
        while let Some(current) = queue.pop_front() {
            for &dependent in self.graph.dependent_indices(current) {
                if !self.reachable.contains_index(dependent) {
                    continue;
                }
                if self.states[dependent].is_terminal() {
                    continue;
                }
                self.states[dependent] = NodeState::Skipped;
                self.frontier.remove(&dependent);
                self.skipped_because.insert(dependent, idx);
                skipped.push(dependent);
                queue.push_back(dependent);
            }
        }
        skipped
    }

    /// Stop releasing work. Ready nodes that never started go back to
    /// `Pending`; returns them.
    pub fn halt(&mut self) -> Vec<usize> {
        self.halted = true;
        self.frontier.clear();

        let mut returned = Vec::new();
        for idx in self.reachable.indices() {
            if self.states[idx] == NodeState::Ready {
                self.states[idx] = NodeState::Pending;
                returned.push(idx);
            }
        }
        returned
    }

    /// Whether [`halt`](Self::halt) was called
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// State of a node by id, `None` if it is not part of the session
    pub fn state_of(&self, id: &str) -> Option<NodeState> {
        self.graph
            .index_of(id)
            .filter(|&i| self.reachable.contains_index(i))
            .map(|i| self.states[i])
    }

    /// Whether a node ran its action and succeeded in this session
    pub fn was_rebuilt(&self, idx: usize) -> bool {
        self.rebuilt[idx]
    }

    /// Failed ancestor that caused a node to be skipped
    pub fn skip_cause(&self, idx: usize) -> Option<usize> {
        self.skipped_because.get(&idx).copied()
    }

    /// Reachable node indices with their current state, in declaration order
    pub fn states(&self) -> impl Iterator<Item = (usize, NodeState)> + '_ {
        self.reachable.indices().map(|i| (i, self.states[i]))
    }

    /// The graph being scheduled
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }
}

/// Static topological order and parallel waves for a set of targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    /// Every node in a valid dependency order
    pub order: Vec<TargetId>,
    /// Nodes grouped by depth; a wave only depends on earlier waves
    pub waves: Vec<Vec<TargetId>>,
}

impl ExecutionPlan {
    /// Number of nodes in the plan
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the plan is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Compute the plan for the nodes reachable from `targets`.
///
/// Fails on unknown targets or when the reachable part contains a cycle.
pub fn plan(graph: &Graph, targets: &[TargetId]) -> Result<ExecutionPlan> {
    let reachable = graph.reachable_from(targets)?;
    graph.detect_cycles_within(&reachable).into_result()?;

    let mut scheduler = Scheduler::new(graph, reachable);
    let mut wave_of: Vec<usize> = vec![0; graph.len()];
    let mut order = Vec::new();

    while let Some(idx) = scheduler.pop_ready() {
        let wave = graph
            .dependency_indices(idx)
            .iter()
            .map(|&d| wave_of[d] + 1)
            .max()
            .unwrap_or(0);
        wave_of[idx] = wave;
        order.push(idx);
        scheduler.complete(idx, false);
    }

    let wave_count = order.iter().map(|&i| wave_of[i] + 1).max().unwrap_or(0);
    let mut waves: Vec<Vec<usize>> = vec![Vec::new(); wave_count];
    for &idx in &order {
        waves[wave_of[idx]].push(idx);
    }

    let id = |i: usize| graph.node_at(i).id.clone();
    Ok(ExecutionPlan {
        order: order.iter().map(|&i| id(i)).collect(),
        waves: waves
            .into_iter()
            .map(|mut wave| {
                wave.sort_unstable();
                wave.into_iter().map(id).collect()
            })
            .collect(),
    })
}

/// Render a plan with each node's action and dependencies
pub fn render_plan(graph: &Graph, plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    for (i, wave) in plan.waves.iter().enumerate() {
        out.push_str(&format!("Wave {} ({} targets):\n", i, wave.len()));
        for id in wave {
            let Some(node) = graph.get(id.as_str()) else {
                continue;
            };
            let action = match &node.action {
                Some(action) => action.to_string(),
                None if node.is_phony() => "<phony>".to_string(),
                None => "<source>".to_string(),
            };
            if node.dependencies.is_empty() {
                out.push_str(&format!("  {} -> {}\n", id, action));
            } else {
                let deps: Vec<&str> = node.dependencies.iter().map(TargetId::as_str).collect();
                out.push_str(&format!(
                    "  {} -> {} (after: {})\n",
                    id,
                    action,
                    deps.join(", ")
                ));
            }
        }
    }
    out
}
