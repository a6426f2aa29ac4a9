//! Build session report

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::error::FailureReason;
use crate::node::TargetId;
use crate::scheduler::NodeState;

/// Final outcome of a build session.
///
/// Every node reachable from the requested targets appears in `results`
/// exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Final state per reachable node
    pub results: BTreeMap<TargetId, NodeState>,
    /// Failure reason per failed node
    pub failures: BTreeMap<TargetId, FailureReason>,
    /// Failed ancestor per skipped node
    pub skipped_because: BTreeMap<TargetId, TargetId>,
    /// Nodes whose action ran and succeeded, in completion order
    pub rebuilt: Vec<TargetId>,
    /// Whether the session was cancelled
    pub cancelled: bool,
    /// Wall-clock time of the session
    pub duration: Duration,
}

impl Report {
    /// Whether every reachable node succeeded
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.results.values().all(|s| *s == NodeState::Succeeded)
    }

    /// State of a node, `None` if it was not part of the session
    pub fn state_of(&self, id: &str) -> Option<NodeState> {
        self.results.get(id).copied()
    }

    /// Whether a node's action ran and succeeded
    pub fn was_rebuilt(&self, id: &str) -> bool {
        self.rebuilt.iter().any(|r| r.as_str() == id)
    }

    /// Number of nodes in a given state
    pub fn count(&self, state: NodeState) -> usize {
        self.results.values().filter(|s| **s == state).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(NodeState::Succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.count(NodeState::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(NodeState::Skipped)
    }

    pub fn pending_count(&self) -> usize {
        self.count(NodeState::Pending)
    }

    /// Succeeded nodes that needed no action
    pub fn up_to_date_count(&self) -> usize {
        self.succeeded_count().saturating_sub(self.rebuilt.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        let mut report = Report::default();
        report.results.insert("a".into(), NodeState::Succeeded);
        report.results.insert("b".into(), NodeState::Failed);
        report.results.insert("c".into(), NodeState::Skipped);
        report
            .failures
            .insert("b".into(), FailureReason::ActionFailed("exit code 1".into()));
        report.skipped_because.insert("c".into(), "b".into());
        report
    }

    #[test]
    fn test_report_counts() {
        let report = sample();
        assert!(!report.is_success());
        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.pending_count(), 0);
        assert_eq!(report.up_to_date_count(), 1);
        assert_eq!(report.state_of("c"), Some(NodeState::Skipped));
        assert_eq!(report.state_of("zzz"), None);
    }

    #[test]
    fn test_cancelled_report_is_not_success() {
        let mut report = Report::default();
        report.results.insert("a".into(), NodeState::Succeeded);
        assert!(report.is_success());

        report.cancelled = true;
        assert!(!report.is_success());
    }

    #[test]
    fn test_report_json() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["results"]["b"], "failed");
        assert_eq!(json["failures"]["b"]["kind"], "action_failed");
        assert_eq!(json["skipped_because"]["c"], "b");
    }
}
