//! Observability metrics for compaction coordination.
//!
//! Metrics are exported through the `metrics` crate facade; recorder wiring
//! is left to the embedding service.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `strata_compaction_tasks_total` | Counter | `from_state`, `to_state` | Task state transitions |
//! | `strata_compaction_executing_tasks` | Gauge | - | Tasks holding admission slots |
//! | `strata_compaction_reconcile_duration_seconds` | Histogram | - | Reconcile tick processing time |
//! | `strata_compaction_compacted_segment_size_bytes` | Histogram | - | Byte size of committed results |
//! | `strata_compaction_completion_retries_total` | Counter | - | Completion attempts that failed and will retry |
//! | `strata_compaction_segments_compacted_total` | Counter | - | Source segments retired by committed merges |
//! | `strata_compaction_rows_compacted_total` | Counter | - | Rows written into compacted segments |

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: task state transitions.
    pub const TASKS_TOTAL: &str = "strata_compaction_tasks_total";
    /// Gauge: tasks currently holding admission slots.
    pub const EXECUTING_TASKS: &str = "strata_compaction_executing_tasks";
    /// Histogram: reconcile tick processing time in seconds.
    pub const RECONCILE_DURATION_SECONDS: &str = "strata_compaction_reconcile_duration_seconds";
    /// Histogram: byte size of committed compaction results.
    pub const COMPACTED_SEGMENT_SIZE_BYTES: &str = "strata_compaction_compacted_segment_size_bytes";
    /// Counter: failed completion attempts that stay queued for retry.
    pub const COMPLETION_RETRIES_TOTAL: &str = "strata_compaction_completion_retries_total";
    /// Counter: source segments retired by committed merges.
    pub const SEGMENTS_COMPACTED_TOTAL: &str = "strata_compaction_segments_compacted_total";
    /// Counter: rows written into compacted segments.
    pub const ROWS_COMPACTED_TOTAL: &str = "strata_compaction_rows_compacted_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Previous task state (for transitions).
    pub const FROM_STATE: &str = "from_state";
    /// Target task state (for transitions).
    pub const TO_STATE: &str = "to_state";
}

/// High-level interface for recording compaction metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionMetrics;

impl CompactionMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a task state transition.
    pub fn record_task_transition(&self, from_state: &'static str, to_state: &'static str) {
        counter!(
            names::TASKS_TOTAL,
            labels::FROM_STATE => from_state,
            labels::TO_STATE => to_state,
        )
        .increment(1);
    }

    /// Updates the gauge of tasks holding admission slots.
    #[allow(clippy::cast_precision_loss)] // gauge values are small
    pub fn set_executing_tasks(&self, count: usize) {
        gauge!(names::EXECUTING_TASKS).set(count as f64);
    }

    /// Observes the byte size of a committed compaction result.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe_compacted_segment_size(&self, bytes: i64) {
        histogram!(names::COMPACTED_SEGMENT_SIZE_BYTES).record(bytes.max(0) as f64);
    }

    /// Records a completion attempt that failed and will be retried on a
    /// later tick. Alert on this counter to catch tasks wedged in Executing.
    pub fn record_completion_retry(&self) {
        counter!(names::COMPLETION_RETRIES_TOTAL).increment(1);
    }

    /// Records the outcome of a committed merge.
    #[allow(clippy::cast_sign_loss)] // row count clamped to non-negative
    pub fn record_commit(&self, segments_compacted: usize, rows_compacted: i64) {
        counter!(names::SEGMENTS_COMPACTED_TOTAL).increment(segments_compacted as u64);
        counter!(names::ROWS_COMPACTED_TOTAL).increment(rows_compacted.max(0) as u64);
    }

    /// Creates a timing guard that records reconcile tick duration on drop.
    #[must_use]
    pub fn time_reconcile(&self) -> TimingGuard<impl FnOnce(Duration)> {
        TimingGuard::new(|duration| {
            histogram!(names::RECONCILE_DURATION_SECONDS).record(duration.as_secs_f64());
        })
    }
}

/// RAII guard for timing operations; records duration when dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a new timing guard that will call `on_drop` with the elapsed
    /// duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}
