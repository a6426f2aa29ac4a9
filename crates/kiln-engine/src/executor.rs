//! Bounded worker pool for running actions

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::FailureReason;
use crate::node::ActionRef;

/// Result of running one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The action produced its target
    Success,
    /// The action failed, with a message for the report
    Failure(String),
}

impl Outcome {
    /// Whether the action succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Runs the opaque actions attached to nodes.
///
/// Called from blocking worker threads, possibly several at once.
pub trait ActionRunner: Send + Sync {
    /// Run an action to completion
    fn run_action(&self, action: &ActionRef) -> Outcome;

    /// Human-readable description of an action, for reporting
    fn describe(&self, action: &ActionRef) -> String {
        action.to_string()
    }
}

/// A finished action
#[derive(Debug)]
pub(crate) struct Completion {
    pub idx: usize,
    pub result: std::result::Result<(), FailureReason>,
    pub duration: Duration,
}

/// Dispatches queued actions onto at most `max_parallelism` blocking
/// workers and hands back their completions.
pub(crate) struct Executor {
    runner: Arc<dyn ActionRunner>,
    max_parallelism: usize,
    /// Stale nodes waiting for a slot, lowest declaration index first
    queued: BTreeMap<usize, ActionRef>,
    in_flight: JoinSet<Completion>,
    dispatched: HashSet<usize>,
}

impl Executor {
    pub fn new(runner: Arc<dyn ActionRunner>, max_parallelism: usize) -> Self {
        Self {
            runner,
            max_parallelism,
            queued: BTreeMap::new(),
            in_flight: JoinSet::new(),
            dispatched: HashSet::new(),
        }
    }

    /// Queue a node's action. A node is only ever dispatched once per
    /// session; returns `false` if it already was.
    pub fn enqueue(&mut self, idx: usize, action: ActionRef) -> bool {
        if self.dispatched.contains(&idx) || self.queued.contains_key(&idx) {
            return false;
        }
        self.queued.insert(idx, action);
        true
    }

    /// Start queued actions until every slot is busy. Returns the started
    /// node indices.
    pub fn fill_slots(&mut self) -> Vec<(usize, ActionRef)> {
        let mut started = Vec::new();
        while self.in_flight.len() < self.max_parallelism {
            let Some((idx, action)) = self.queued.pop_first() else {
                break;
            };
            self.dispatched.insert(idx);
            self.spawn(idx, action.clone());
            started.push((idx, action));
        }
        started
    }

    /// Drop queued actions that were never started
    pub fn clear_queue(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.queued).into_keys().collect()
    }

    /// Number of actions currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether actions are waiting for a slot
    pub fn has_queued(&self) -> bool {
        !self.queued.is_empty()
    }

    /// Wait for the next running action to finish
    pub async fn next_completion(&mut self) -> Option<Completion> {
        loop {
            match self.in_flight.join_next().await? {
                Ok(completion) => return Some(completion),
                Err(e) => error!(error = %e, "worker task aborted"),
            }
        }
    }

    fn spawn(&mut self, idx: usize, action: ActionRef) {
        let runner = Arc::clone(&self.runner);
        debug!(action = %action, slot = self.in_flight.len() + 1, "dispatching action");

        self.in_flight.spawn(async move {
            let started = Instant::now();
            let worker = tokio::task::spawn_blocking(move || run_guarded(runner.as_ref(), &action));
            let result = match worker.await {
                Ok(result) => result,
                Err(e) => Err(FailureReason::Panicked(e.to_string())),
            };
            Completion {
                idx,
                result,
                duration: started.elapsed(),
            }
        });
    }
}

/// Run an action, turning a panic into a failure
fn run_guarded(runner: &dyn ActionRunner, action: &ActionRef) -> std::result::Result<(), FailureReason> {
    match catch_unwind(AssertUnwindSafe(|| runner.run_action(action))) {
        Ok(Outcome::Success) => Ok(()),
        Ok(Outcome::Failure(message)) => Err(FailureReason::ActionFailed(message)),
        Err(payload) => Err(FailureReason::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;

    #[tokio::test]
    async fn test_executor_runs_queued_in_index_order() {
        let runner = Arc::new(RecordingRunner::new());
        let mut executor = Executor::new(runner.clone(), 1);

        assert!(executor.enqueue(2, ActionRef::new("c")));
        assert!(executor.enqueue(0, ActionRef::new("a")));
        assert!(executor.enqueue(1, ActionRef::new("b")));

        let mut finished = Vec::new();
        loop {
            executor.fill_slots();
            assert!(executor.in_flight() <= 1);
            match executor.next_completion().await {
                Some(done) => {
                    assert!(done.result.is_ok());
                    finished.push(done.idx);
                }
                None => break,
            }
        }

        assert_eq!(finished, vec![0, 1, 2]);
        assert_eq!(runner.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_executor_single_flight() {
        let runner = Arc::new(RecordingRunner::new());
        let mut executor = Executor::new(runner.clone(), 2);

        assert!(executor.enqueue(0, ActionRef::new("a")));
        assert!(!executor.enqueue(0, ActionRef::new("a")));
        executor.fill_slots();
        assert!(!executor.enqueue(0, ActionRef::new("a")));

        executor.next_completion().await.unwrap();
        assert!(executor.next_completion().await.is_none());
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_executor_failure_and_panic() {
        let runner = Arc::new(RecordingRunner::new().fail_on("bad").panic_on("boom"));
        let mut executor = Executor::new(runner, 2);

        executor.enqueue(0, ActionRef::new("bad"));
        executor.enqueue(1, ActionRef::new("boom"));
        executor.fill_slots();

        let mut results = BTreeMap::new();
        while let Some(done) = executor.next_completion().await {
            results.insert(done.idx, done.result);
        }

        assert_eq!(
            results[&0],
            Err(FailureReason::ActionFailed("bad failed".to_string()))
        );
        assert!(matches!(&results[&1], Err(FailureReason::Panicked(msg)) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_clear_queue() {
        let runner = Arc::new(RecordingRunner::new());
        let mut executor = Executor::new(runner.clone(), 1);

        executor.enqueue(0, ActionRef::new("a"));
        executor.enqueue(1, ActionRef::new("b"));
        executor.fill_slots();

        assert_eq!(executor.clear_queue(), vec![1]);
        assert!(!executor.has_queued());
        executor.next_completion().await.unwrap();
        assert_eq!(runner.calls(), vec!["a"]);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
