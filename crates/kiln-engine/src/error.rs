//! Error types for the build engine

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::TargetId;

/// Result type alias using BuildError
pub type Result<T> = std::result::Result<T, BuildError>;

/// A dependency cycle, as the ordered chain of targets that closes on itself.
///
/// The first and last entries are the same target, e.g. `a -> b -> a`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle(pub Vec<TargetId>);

impl Cycle {
    /// Targets taking part in the cycle, without the closing repetition
    pub fn members(&self) -> &[TargetId] {
        match self.0.split_last() {
            Some((_, rest)) if !rest.is_empty() => rest,
            _ => &self.0,
        }
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", id)?;
        }
        Ok(())
    }
}

/// Errors that abort a build before any action runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Two declarations share the same target identifier
    #[error("Target '{0}' is declared more than once")]
    DuplicateTarget(TargetId),

    /// A dependency names a target that was never declared
    #[error("Target '{from}' depends on undeclared target '{missing}'")]
    UnresolvedDependency { from: TargetId, missing: TargetId },

    /// The requested sub-graph contains a dependency cycle
    #[error("Cyclic dependency detected: {0}")]
    CycleFound(Cycle),

    /// A requested target is not declared
    #[error("Unknown target '{0}'")]
    UnknownTarget(TargetId),

    /// `max_parallelism` must be at least one
    #[error("Invalid parallelism {0}: at least one job is required")]
    InvalidParallelism(usize),
}

/// Why a single target failed during execution
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// The action ran and reported failure
    #[error("{0}")]
    ActionFailed(String),

    /// The action panicked on its worker
    #[error("action panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let cycle = Cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(cycle.to_string(), "a -> b -> a");
        assert_eq!(cycle.members(), &[TargetId::from("a"), TargetId::from("b")]);
    }

    #[test]
    fn test_self_cycle_members() {
        let cycle = Cycle(vec!["a".into(), "a".into()]);
        assert_eq!(cycle.members(), &[TargetId::from("a")]);
    }

    #[test]
    fn test_error_messages() {
        let err = BuildError::UnresolvedDependency {
            from: "app".into(),
            missing: "lib.o".into(),
        };
        assert_eq!(
            err.to_string(),
            "Target 'app' depends on undeclared target 'lib.o'"
        );

        let err = BuildError::CycleFound(Cycle(vec!["x".into(), "x".into()]));
        assert_eq!(err.to_string(), "Cyclic dependency detected: x -> x");
    }

    #[test]
    fn test_failure_reason_serde() {
        let reason = FailureReason::ActionFailed("exit code 2".to_string());
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "action_failed");
        assert_eq!(json["message"], "exit code 2");
    }
}
