//! Cooperative cancellation for build sessions

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable cancellation signal.
///
/// Cancelling stops a session from dispatching new actions; actions already
/// running are allowed to finish and are recorded in the report.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
