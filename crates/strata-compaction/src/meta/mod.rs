//! Metadata store seam.
//!
//! The coordinator owns no segment metadata itself; it marks segments as
//! participating in compaction and asks the store to commit the metadata
//! mutation when a plan succeeds. The store is expected to be idempotent on
//! replay of the same `(plan, result)` pair, because a worker-sync failure
//! after a committed mutation makes the coordinator retry completion on the
//! next tick.

pub mod memory;

use serde::{Deserialize, Serialize};

use strata_core::id::SegmentId;

use crate::error::Result;
use crate::metrics::CompactionMetrics;
use crate::plan::{CompactionPlan, CompactionResult, FieldBinlog};

/// The new segment produced by a committed compaction mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentInfo {
    /// Id of the new segment.
    pub id: SegmentId,
    /// The source segments the new segment was compacted from.
    pub compaction_from: Vec<SegmentId>,
    /// Row count of the new segment.
    pub num_rows: i64,
    /// Statistics binlogs of the new segment.
    #[serde(default)]
    pub stats_logs: Vec<FieldBinlog>,
}

/// Pending metric updates prepared by a metadata mutation.
///
/// The mutation prepares these alongside the metadata change but they are
/// only committed after the worker acknowledges the sync, so a failed sync
/// does not skew counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricMutation {
    /// Source segments retired by the merge.
    pub segments_compacted: usize,
    /// Rows written into the new segment.
    pub rows_compacted: i64,
}

impl MetricMutation {
    /// Commits the prepared updates to the metrics facade.
    pub fn commit(self, metrics: &CompactionMetrics) {
        metrics.record_commit(self.segments_compacted, self.rows_compacted);
    }
}

/// Segment metadata store consumed by the coordinator.
///
/// Implementations are synchronous: the production store serves these calls
/// from in-memory state replicated off its write-ahead log, and the
/// coordinator invokes them under its table lock.
pub trait MetadataStore: Send + Sync {
    /// Marks or clears a segment's compacting flag.
    fn set_segment_compacting(&self, segment_id: SegmentId, compacting: bool);

    /// Commits the metadata mutation for a successful plan: retires the
    /// source segments, registers the result segment, and prepares the
    /// metric updates.
    ///
    /// Must be idempotent: replaying the same `(plan, result)` returns the
    /// previously-created segment without mutating state again.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation cannot be applied; the coordinator
    /// leaves the task in Executing and retries on a later tick.
    fn complete_compaction_mutation(
        &self,
        plan: &CompactionPlan,
        result: &CompactionResult,
    ) -> Result<(SegmentInfo, MetricMutation)>;
}
