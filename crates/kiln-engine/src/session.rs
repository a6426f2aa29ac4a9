//! Build session: one end-to-end invocation of the engine

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::error::{BuildError, FailureReason, Result};
use crate::executor::{ActionRunner, Completion, Executor};
use crate::graph::Graph;
use crate::metadata::ArtifactMetadata;
use crate::node::TargetId;
use crate::report::Report;
use crate::reporter::{BuildEvent, BuildReporter, HaltReason, TracingReporter};
use crate::scheduler::Scheduler;
use crate::staleness::{DependencyState, StaleReason, Staleness, StalenessOracle};

/// What to do after an action fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop dispatching new work; in-flight actions finish
    #[default]
    FailFast,
    /// Keep building everything that does not depend on a failure
    BestEffort,
}

/// Options for a single session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Maximum number of actions running at once
    pub max_parallelism: usize,
    /// Failure policy
    pub policy: FailurePolicy,
    /// Treat every node as stale
    pub always_make: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_parallelism: 1,
            policy: FailurePolicy::FailFast,
            always_make: false,
        }
    }
}

impl SessionOptions {
    /// Set the number of parallel actions
    pub fn jobs(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    /// Set the failure policy
    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Force every node stale
    pub fn always_make(mut self, always_make: bool) -> Self {
        self.always_make = always_make;
        self
    }
}

enum Wake {
    Cancelled,
    Finished(Option<Completion>),
}

/// Drives the scheduler, staleness oracle and executor for one build.
///
/// The session itself holds only collaborators, so it can be reused for
/// several runs against the same or different graphs.
pub struct BuildSession {
    runner: Arc<dyn ActionRunner>,
    metadata: Arc<dyn ArtifactMetadata>,
    reporter: Arc<dyn BuildReporter>,
    cancel: CancelToken,
}

impl BuildSession {
    /// Create a session reporting through tracing
    pub fn new(runner: Arc<dyn ActionRunner>, metadata: Arc<dyn ArtifactMetadata>) -> Self {
        Self {
            runner,
            metadata,
            reporter: Arc::new(TracingReporter),
            cancel: CancelToken::new(),
        }
    }

    /// Replace the reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn BuildReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this session
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Bring the requested targets up to date.
    ///
    /// Validation errors (bad options, unknown targets, cycles) are returned
    /// before any action runs. Action failures do not produce an `Err`; they
    /// are recorded in the report.
    #[instrument(skip_all, fields(targets = targets.len(), max_parallelism = options.max_parallelism))]
    pub async fn run(
        &self,
        graph: &Graph,
        targets: &[TargetId],
        options: &SessionOptions,
    ) -> Result<Report> {
        let started = Instant::now();

        if options.max_parallelism < 1 {
            return Err(BuildError::InvalidParallelism(options.max_parallelism));
        }
        let reachable = graph.reachable_from(targets)?;
        graph.detect_cycles_within(&reachable).into_result()?;

        self.reporter.report(&BuildEvent::SessionStarted {
            targets: targets.to_vec(),
            reachable: reachable.len(),
            max_parallelism: options.max_parallelism,
        });

        let oracle =
            StalenessOracle::new(self.metadata.as_ref()).always_make(options.always_make);
        let mut scheduler = Scheduler::new(graph, reachable);
        let mut executor = Executor::new(Arc::clone(&self.runner), options.max_parallelism);

        let mut reasons: HashMap<usize, StaleReason> = HashMap::new();
        let mut failures: BTreeMap<TargetId, FailureReason> = BTreeMap::new();
        let mut rebuilt: Vec<TargetId> = Vec::new();
        let mut cancelled = false;

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                cancelled = true;
                self.halt(&mut scheduler, &mut executor, HaltReason::Cancelled);
            }

            self.resolve_ready(&oracle, &mut scheduler, &mut executor, &mut reasons);

            for (idx, action) in executor.fill_slots() {
                scheduler.mark_running(idx);
                let reason = reasons.remove(&idx).unwrap_or(StaleReason::Missing);
                self.reporter.report(&BuildEvent::Started {
                    id: graph.node_at(idx).id.clone(),
                    action: self.runner.describe(&action),
                    reason,
                });
            }

            if executor.in_flight() == 0 {
                debug_assert!(!executor.has_queued());
                break;
            }

            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !cancelled => Wake::Cancelled,
                completion = executor.next_completion() => Wake::Finished(completion),
            };

            let done = match wake {
                Wake::Cancelled => continue,
                Wake::Finished(Some(done)) => done,
                Wake::Finished(None) => break,
            };

            let id = graph.node_at(done.idx).id.clone();
            match done.result {
                Ok(()) => {
                    scheduler.complete(done.idx, true);
                    self.reporter.report(&BuildEvent::Completed {
                        id: id.clone(),
                        duration: done.duration,
                    });
                    rebuilt.push(id);
                }
                Err(reason) => {
                    self.reporter.report(&BuildEvent::Failed {
                        id: id.clone(),
                        duration: done.duration,
                        reason: reason.clone(),
                    });
                    failures.insert(id.clone(), reason);

                    for skipped in scheduler.fail(done.idx) {
                        self.reporter.report(&BuildEvent::Skipped {
                            id: graph.node_at(skipped).id.clone(),
                            cause: id.clone(),
                        });
                    }

                    if options.policy == FailurePolicy::FailFast && !scheduler.is_halted() {
                        self.halt(&mut scheduler, &mut executor, HaltReason::FailFast);
                    }
                }
            }
        }

        let mut report = Report {
            failures,
            rebuilt,
            cancelled,
            ..Report::default()
        };
        for (idx, state) in scheduler.states() {
            let id = graph.node_at(idx).id.clone();
            if let Some(cause) = scheduler.skip_cause(idx) {
                report
                    .skipped_because
                    .insert(id.clone(), graph.node_at(cause).id.clone());
            }
            report.results.insert(id, state);
        }
        report.duration = started.elapsed();

        self.reporter.report(&BuildEvent::AllCompleted {
            total: report.results.len(),
            rebuilt: report.rebuilt.len(),
            up_to_date: report.up_to_date_count(),
            failed: report.failed_count(),
            skipped: report.skipped_count(),
            pending: report.pending_count(),
            duration: report.duration,
        });

        info!(
            success = report.is_success(),
            rebuilt = report.rebuilt.len(),
            failed = report.failed_count(),
            cancelled = report.cancelled,
            "build session finished"
        );

        Ok(report)
    }

    /// Drain the ready frontier: nodes with nothing to do succeed on the
    /// spot, stale nodes with an action are queued on the executor
    fn resolve_ready(
        &self,
        oracle: &StalenessOracle<'_>,
        scheduler: &mut Scheduler<'_>,
        executor: &mut Executor,
        reasons: &mut HashMap<usize, StaleReason>,
    ) {
        let graph = scheduler.graph();

        while let Some(idx) = scheduler.pop_ready() {
            let node = graph.node_at(idx);
            let dependencies: Vec<DependencyState<'_>> = graph
                .dependency_indices(idx)
                .iter()
                .map(|&d| DependencyState {
                    node: graph.node_at(d),
                    rebuilt: scheduler.was_rebuilt(d),
                })
                .collect();

            match (oracle.evaluate(node, &dependencies), &node.action) {
                (Staleness::Stale(reason), Some(action)) => {
                    debug!(target_id = %node.id, %reason, "queued");
                    if executor.enqueue(idx, action.clone()) {
                        reasons.insert(idx, reason);
                    }
                }
                (Staleness::Stale(_), None) => {
                    if node.artifacts().any(|a| !self.metadata.exists(a)) {
                        warn!(target_id = %node.id, "no action for missing artifact, assuming present");
                    }
                    scheduler.complete(idx, false);
                    self.reporter
                        .report(&BuildEvent::UpToDate { id: node.id.clone() });
                }
                (Staleness::Fresh, _) => {
                    scheduler.complete(idx, false);
                    self.reporter
                        .report(&BuildEvent::UpToDate { id: node.id.clone() });
                }
            }
        }
    }

    fn halt(&self, scheduler: &mut Scheduler<'_>, executor: &mut Executor, reason: HaltReason) {
        if scheduler.is_halted() {
            return;
        }
        let returned = scheduler.halt();
        let dropped = executor.clear_queue();
        debug!(
            returned = returned.len(),
            dropped = dropped.len(),
            running = executor.in_flight(),
            "halting"
        );
        self.reporter.report(&BuildEvent::Halted { reason });
    }
}

impl std::fmt::Debug for BuildSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildSession")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
