//! Options for reconciliation runs

use std::sync::Arc;

/// Progress callback function type, receiving (completed, total)
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// What to do when a row cannot be geocoded or routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run at the first failing row (default)
    Abort,
    /// Record the failure, keep the row as far as it could be filled, go on
    Continue,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::Abort
    }
}

/// Options for reconciliation operations
#[derive(Clone, Default)]
pub struct EngineOptions {
    /// Optional progress callback
    pub progress: Option<ProgressCallback>,

    /// Behavior when a row fails
    pub failure_policy: FailurePolicy,
}

impl EngineOptions {
    pub(crate) fn report_progress(&self, done: u64, total: u64) {
        if let Some(ref progress) = self.progress {
            progress(done, total);
        }
    }
}
