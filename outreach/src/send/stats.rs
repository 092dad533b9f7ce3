//! Run-level delivery statistics.

use std::sync::Mutex;

use serde::Serialize;

/// Aggregate outcome of one dispatch run.
///
/// `sent + failed + skipped == total` once the run has returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    /// Tasks delivered
    pub sent: u64,
    /// Tasks that exhausted their attempts
    pub failed: u64,
    /// Extra attempts spent on tasks that were eventually delivered
    pub retries: u64,
    /// Tasks abandoned because of shutdown
    pub skipped: u64,
    /// Tasks enqueued
    pub total: u64,
}

/// Terminal result of one send task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Shared accumulator that every worker records into.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    inner: Mutex<RunStatistics>,
}

impl StatsRecorder {
    pub fn new(total: u64) -> Self {
        Self {
            inner: Mutex::new(RunStatistics {
                total,
                ..RunStatistics::default()
            }),
        }
    }

    /// Count exactly one terminal outcome.
    pub fn record(&self, outcome: DeliveryOutcome) {
        let mut stats = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match outcome {
            DeliveryOutcome::Delivered { attempts } => {
                stats.sent += 1;
                stats.retries += u64::from(attempts.saturating_sub(1));
            }
            DeliveryOutcome::Failed { .. } => stats.failed += 1,
            DeliveryOutcome::Cancelled { .. } => stats.skipped += 1,
        }
    }

    pub fn snapshot(&self) -> RunStatistics {
        *self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
