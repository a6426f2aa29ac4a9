//! Build progress reporting

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::FailureReason;
use crate::node::TargetId;
use crate::staleness::StaleReason;

/// Why a session stopped dispatching work early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A failure under the fail-fast policy
    FailFast,
    /// Cancellation was requested
    Cancelled,
}

/// Events emitted during a build session
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// A session validated its inputs and is about to schedule work
    SessionStarted {
        targets: Vec<TargetId>,
        reachable: usize,
        max_parallelism: usize,
    },
    /// An action was dispatched
    Started {
        id: TargetId,
        action: String,
        reason: StaleReason,
    },
    /// An action completed successfully
    Completed { id: TargetId, duration: Duration },
    /// A node needed no work
    UpToDate { id: TargetId },
    /// An action failed
    Failed {
        id: TargetId,
        duration: Duration,
        reason: FailureReason,
    },
    /// A node was not attempted because a dependency failed
    Skipped { id: TargetId, cause: TargetId },
    /// No further work will be dispatched
    Halted { reason: HaltReason },
    /// The session finished
    AllCompleted {
        total: usize,
        rebuilt: usize,
        up_to_date: usize,
        failed: usize,
        skipped: usize,
        pending: usize,
        duration: Duration,
    },
}

/// Trait for reporting build progress
pub trait BuildReporter: Send + Sync {
    /// Handle a build event
    fn report(&self, event: &BuildEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl BuildReporter for TracingReporter {
    fn report(&self, event: &BuildEvent) {
        match event {
            BuildEvent::SessionStarted {
                targets,
                reachable,
                max_parallelism,
            } => {
                tracing::info!(
                    targets = targets.len(),
                    reachable,
                    max_parallelism,
                    "build session started"
                );
            }
            BuildEvent::Started { id, action, reason } => {
                tracing::info!(target_id = %id, %reason, "building {}: {}", id, action);
            }
            BuildEvent::Completed { id, duration } => {
                tracing::info!("{} built in {:.1}s", id, duration.as_secs_f64());
            }
            BuildEvent::UpToDate { id } => {
                tracing::debug!("{} is up to date", id);
            }
            BuildEvent::Failed {
                id,
                duration,
                reason,
            } => {
                tracing::error!("{} failed after {:.1}s: {}", id, duration.as_secs_f64(), reason);
            }
            BuildEvent::Skipped { id, cause } => {
                tracing::warn!("{} skipped: dependency '{}' failed", id, cause);
            }
            BuildEvent::Halted { reason } => match reason {
                HaltReason::FailFast => tracing::warn!("stopping after first failure"),
                HaltReason::Cancelled => tracing::warn!("build cancelled"),
            },
            BuildEvent::AllCompleted {
                total,
                rebuilt,
                up_to_date,
                failed,
                skipped,
                pending,
                duration,
            } => {
                tracing::info!(
                    "Build finished: {} rebuilt, {} up to date, {} failed, {} skipped, {} not started of {} ({:.1}s)",
                    rebuilt,
                    up_to_date,
                    failed,
                    skipped,
                    pending,
                    total,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<BuildEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ids of `Started` events, in order
    pub fn started(&self) -> Vec<TargetId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BuildEvent::Started { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl BuildReporter for CollectingReporter {
    fn report(&self, event: &BuildEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Fans events out to several reporters
#[derive(Clone)]
pub struct ReporterRegistry {
    reporters: Vec<Arc<dyn BuildReporter>>,
}

impl ReporterRegistry {
    /// Registry with a [`TracingReporter`]
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    /// Registry with no reporters
    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: BuildReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    /// Register a reporter that is shared with the caller
    pub fn register_shared(&mut self, reporter: Arc<dyn BuildReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn BuildReporter>] {
        &self.reporters
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &BuildEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl BuildReporter for ReporterRegistry {
    fn report(&self, event: &BuildEvent) {
        self.broadcast(event);
    }
}

impl Default for ReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        let id = TargetId::from("app");

        reporter.report(&BuildEvent::Started {
            id: id.clone(),
            action: "cc -o app main.c".to_string(),
            reason: StaleReason::Missing,
        });
        reporter.report(&BuildEvent::Completed {
            id: id.clone(),
            duration: Duration::from_secs(2),
        });

        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.started(), vec![id]);
    }

    #[test]
    fn test_tracing_reporter() {
        let reporter = TracingReporter;

        // Just verify it doesn't panic
        reporter.report(&BuildEvent::Failed {
            id: "app".into(),
            duration: Duration::from_millis(300),
            reason: FailureReason::ActionFailed("exit code 1".to_string()),
        });
        reporter.report(&BuildEvent::Halted {
            reason: HaltReason::Cancelled,
        });
    }

    #[test]
    fn test_empty_registry() {
        let registry = ReporterRegistry::empty();
        assert!(registry.all().is_empty());
        assert_eq!(ReporterRegistry::new().all().len(), 1);
    }

    #[test]
    fn test_broadcast() {
        let collecting = Arc::new(CollectingReporter::default());
        let mut registry = ReporterRegistry::empty();
        registry.register_shared(collecting.clone());
        registry.register(TracingReporter);

        registry.report(&BuildEvent::UpToDate { id: "lib.o".into() });

        assert_eq!(registry.all().len(), 2);
        assert_eq!(collecting.events().len(), 1);
    }
}
