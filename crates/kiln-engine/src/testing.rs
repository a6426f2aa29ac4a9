//! In-memory collaborators for exercising build sessions in tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use crate::executor::{ActionRunner, Outcome};
use crate::metadata::ArtifactMetadata;
use crate::node::{ActionRef, TargetId};

/// Artifact timestamps held in memory
#[derive(Debug, Default)]
pub struct InMemoryMetadata {
    artifacts: Mutex<HashMap<TargetId, SystemTime>>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an artifact with an explicit modification time
    pub fn set(&self, id: impl Into<TargetId>, modified: SystemTime) {
        self.lock().insert(id.into(), modified);
    }

    /// Record an artifact as written now: one second after the newest
    /// known artifact
    pub fn touch(&self, id: impl Into<TargetId>) -> SystemTime {
        let mut artifacts = self.lock();
        let newest = artifacts
            .values()
            .max()
            .copied()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let modified = newest + Duration::from_secs(1);
        artifacts.insert(id.into(), modified);
        modified
    }

    /// Delete an artifact
    pub fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TargetId, SystemTime>> {
        self.artifacts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArtifactMetadata for InMemoryMetadata {
    fn exists(&self, id: &TargetId) -> bool {
        self.lock().contains_key(id)
    }

    fn modified_at(&self, id: &TargetId) -> Option<SystemTime> {
        self.lock().get(id).copied()
    }
}

/// Runner that records every action it is asked to run.
///
/// Action keys listed with [`fail_on`](Self::fail_on) fail and those listed
/// with [`panic_on`](Self::panic_on) panic. When built with
/// [`producing`](Self::producing), a successful action touches the artifact
/// named by its key.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Option<Duration>,
    delays: HashMap<String, Duration>,
    produces_into: Option<Arc<InMemoryMetadata>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an action fail
    pub fn fail_on(mut self, key: impl Into<String>) -> Self {
        self.failing.insert(key.into());
        self
    }

    /// Make an action panic
    pub fn panic_on(mut self, key: impl Into<String>) -> Self {
        self.panicking.insert(key.into());
        self
    }

    /// Sleep for a while inside every action
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep for a while inside one action, overriding `with_delay`
    pub fn delay_on(mut self, key: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(key.into(), delay);
        self
    }

    /// Touch the artifact named by the action key on success
    pub fn producing(mut self, metadata: Arc<InMemoryMetadata>) -> Self {
        self.produces_into = Some(metadata);
        self
    }

    /// Action keys in the order they started
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    /// Highest number of actions observed running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ActionRunner for RecordingRunner {
    fn run_action(&self, action: &ActionRef) -> Outcome {
        let key = action.as_str();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(key).copied().or(self.delay) {
            std::thread::sleep(delay);
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(key) {
            panic!("{} blew up", key);
        }
        if self.failing.contains(key) {
            return Outcome::Failure(format!("{} failed", key));
        }
        if let Some(metadata) = &self.produces_into {
            metadata.touch(key);
        }
        Outcome::Success
    }
}
