use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The long-running pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Index,
    Metadata,
    Dedupe,
    Migration,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Index, Stage::Metadata, Stage::Dedupe, Stage::Migration];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Index => "index",
            Stage::Metadata => "metadata_extraction",
            Stage::Dedupe => "duplicate_detection",
            Stage::Migration => "migration",
        }
    }

    pub(crate) fn slot(&self) -> usize {
        match self {
            Stage::Index => 0,
            Stage::Metadata => 1,
            Stage::Dedupe => 2,
            Stage::Migration => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-specific counters carried alongside a progress update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    pub groups: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub operation: Stage,
    pub progress: usize,
    pub total: usize,
    pub message: String,
    pub counters: ProgressCounters,
}

/// Trait for reporting stage progress.
///
/// The CLI implements it with indicatif bars; all methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_stage_start(&self, _stage: Stage, _total: usize) {}
    fn on_progress(&self, _update: &ProgressUpdate) {}
    fn on_stage_complete(&self, _stage: Stage, _elapsed: Duration) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Cooperative stop signal shared between a running stage and whoever wants to stop it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
