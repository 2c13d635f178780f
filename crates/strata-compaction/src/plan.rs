//! Compaction plan and result payloads.
//!
//! These are the wire-shaped values exchanged with the trigger (which
//! produces plans) and the worker session layer (which executes them and
//! reports results). Payloads are plain data: the coordinator never mutates a
//! plan after submission except for its start timestamp and the log-path
//! trimming applied to completed tasks.

use serde::{Deserialize, Serialize};

use strata_core::id::{CollectionId, FieldId, PartitionId, PlanId, SegmentId, SignalId};
use strata_core::Timestamp;

/// The kind of merge a plan asks a worker to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompactionType {
    /// Segment-internal reorganization. Produced by older triggers; the
    /// coordinator cannot commit results of this type.
    Inner,
    /// Merge several small segments into one.
    Merge,
    /// Merge segments and fold accumulated deletes into the result.
    Mix,
}

impl CompactionType {
    /// Returns true if the coordinator knows how to commit results of this
    /// type.
    #[must_use]
    pub const fn is_mergeable(&self) -> bool {
        matches!(self, Self::Merge | Self::Mix)
    }
}

impl std::fmt::Display for CompactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inner => write!(f, "inner"),
            Self::Merge => write!(f, "merge"),
            Self::Mix => write!(f, "mix"),
        }
    }
}

/// A single binlog file reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binlog {
    /// Object-store path of the log file.
    pub log_path: String,
    /// Size of the log file in bytes.
    pub log_size: i64,
}

impl Binlog {
    /// Creates a new binlog reference.
    #[must_use]
    pub fn new(log_path: impl Into<String>, log_size: i64) -> Self {
        Self {
            log_path: log_path.into(),
            log_size,
        }
    }
}

/// Binlogs of one field within a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldBinlog {
    /// The field the logs belong to.
    pub field_id: FieldId,
    /// Log files, in write order.
    pub binlogs: Vec<Binlog>,
}

impl FieldBinlog {
    /// Creates a new field binlog group.
    #[must_use]
    pub fn new(field_id: FieldId, binlogs: Vec<Binlog>) -> Self {
        Self { field_id, binlogs }
    }

    /// Total byte size of the logs in this group.
    #[must_use]
    pub fn byte_size(&self) -> i64 {
        self.binlogs.iter().map(|b| b.log_size).sum()
    }
}

/// The binlogs of one source segment referenced by a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentBinlogs {
    /// The source segment.
    pub segment_id: SegmentId,
    /// Insert binlogs per field.
    #[serde(default)]
    pub insert_logs: Vec<FieldBinlog>,
    /// Delete binlogs per field.
    #[serde(default)]
    pub delta_logs: Vec<FieldBinlog>,
    /// Statistics binlogs per field.
    #[serde(default)]
    pub stats_logs: Vec<FieldBinlog>,
}

impl SegmentBinlogs {
    /// Creates an empty binlog listing for a segment.
    #[must_use]
    pub fn new(segment_id: SegmentId) -> Self {
        Self {
            segment_id,
            insert_logs: Vec::new(),
            delta_logs: Vec::new(),
            stats_logs: Vec::new(),
        }
    }

    /// Adds insert binlogs for one field.
    #[must_use]
    pub fn with_insert_logs(mut self, logs: FieldBinlog) -> Self {
        self.insert_logs.push(logs);
        self
    }

    /// Adds delete binlogs for one field.
    #[must_use]
    pub fn with_delta_logs(mut self, logs: FieldBinlog) -> Self {
        self.delta_logs.push(logs);
        self
    }

    /// Drops all log references, keeping only the segment id.
    pub fn clear_logs(&mut self) {
        self.insert_logs.clear();
        self.delta_logs.clear();
        self.stats_logs.clear();
    }
}

/// A compaction plan: a set of segments on one channel to merge into a new
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionPlan {
    /// Unique plan identifier.
    pub plan_id: PlanId,
    /// The channel all source segments live on.
    pub channel: String,
    /// The merge flavor requested.
    pub plan_type: CompactionType,
    /// Source segments with their binlogs.
    #[serde(default)]
    pub segment_binlogs: Vec<SegmentBinlogs>,
    /// Oracle timestamp at which execution started. Zero until dispatch.
    #[serde(default)]
    pub start_time: Timestamp,
    /// Seconds the worker may spend before the coordinator declares timeout.
    pub timeout_seconds: i64,
}

impl CompactionPlan {
    /// Creates a plan with no segments and the given timeout.
    #[must_use]
    pub fn new(
        plan_id: PlanId,
        channel: impl Into<String>,
        plan_type: CompactionType,
        timeout_seconds: i64,
    ) -> Self {
        Self {
            plan_id,
            channel: channel.into(),
            plan_type,
            segment_binlogs: Vec::new(),
            start_time: 0,
            timeout_seconds,
        }
    }

    /// Adds a source segment.
    #[must_use]
    pub fn with_segment(mut self, segment: SegmentBinlogs) -> Self {
        self.segment_binlogs.push(segment);
        self
    }

    /// Ids of all source segments, in plan order.
    #[must_use]
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.segment_binlogs.iter().map(|s| s.segment_id).collect()
    }
}

/// The trigger event a plan was produced from.
///
/// The coordinator stores the signal for grouping queries but never
/// interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionSignal {
    /// Signal identifier shared by all plans of one trigger event.
    pub id: SignalId,
    /// Collection the trigger fired for.
    pub collection_id: CollectionId,
    /// Partition the trigger fired for.
    pub partition_id: PartitionId,
    /// Channel the trigger fired for.
    pub channel: String,
    /// Whether the trigger was forced by an operator rather than heuristics.
    #[serde(default)]
    pub is_force: bool,
}

impl CompactionSignal {
    /// Creates a signal.
    #[must_use]
    pub fn new(
        id: SignalId,
        collection_id: CollectionId,
        partition_id: PartitionId,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            id,
            collection_id,
            partition_id,
            channel: channel.into(),
            is_force: false,
        }
    }
}

/// A worker-produced compaction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionResult {
    /// The plan this result belongs to.
    pub plan_id: PlanId,
    /// The new segment produced by the merge.
    pub segment_id: SegmentId,
    /// Row count of the new segment.
    pub num_rows: i64,
    /// Insert binlogs of the new segment, per field.
    #[serde(default)]
    pub insert_logs: Vec<FieldBinlog>,
    /// Delete binlogs of the new segment, per field.
    #[serde(default)]
    pub delta_logs: Vec<FieldBinlog>,
    /// Statistics binlogs of the new segment, per field.
    #[serde(default)]
    pub stats_logs: Vec<FieldBinlog>,
}

impl CompactionResult {
    /// Creates a result with no binlogs.
    #[must_use]
    pub fn new(plan_id: PlanId, segment_id: SegmentId, num_rows: i64) -> Self {
        Self {
            plan_id,
            segment_id,
            num_rows,
            insert_logs: Vec::new(),
            delta_logs: Vec::new(),
            stats_logs: Vec::new(),
        }
    }

    /// Adds insert binlogs for one field.
    #[must_use]
    pub fn with_insert_logs(mut self, logs: FieldBinlog) -> Self {
        self.insert_logs.push(logs);
        self
    }

    /// Drops all log references from the result.
    pub fn clear_logs(&mut self) {
        self.insert_logs.clear();
        self.delta_logs.clear();
        self.stats_logs.clear();
    }
}

/// Total byte size of a compacted result: insert, delete, and stats logs.
#[must_use]
pub fn compacted_segment_size(result: &CompactionResult) -> i64 {
    let insert: i64 = result.insert_logs.iter().map(FieldBinlog::byte_size).sum();
    let delta: i64 = result.delta_logs.iter().map(FieldBinlog::byte_size).sum();
    let stats: i64 = result.stats_logs.iter().map(FieldBinlog::byte_size).sum();
    insert + delta + stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> CompactionResult {
        CompactionResult::new(PlanId::new(1), SegmentId::new(30), 1000)
            .with_insert_logs(FieldBinlog::new(
                FieldId::new(100),
                vec![Binlog::new("files/100/1.log", 64), Binlog::new("files/100/2.log", 32)],
            ))
            .with_insert_logs(FieldBinlog::new(
                FieldId::new(101),
                vec![Binlog::new("files/101/1.log", 16)],
            ))
    }

    #[test]
    fn compacted_size_sums_all_log_groups() {
        let mut result = sample_result();
        result.delta_logs.push(FieldBinlog::new(
            FieldId::new(100),
            vec![Binlog::new("delta/100/1.log", 8)],
        ));
        assert_eq!(compacted_segment_size(&result), 64 + 32 + 16 + 8);
    }

    #[test]
    fn clear_logs_empties_every_group() {
        let mut result = sample_result();
        result.clear_logs();
        assert!(result.insert_logs.is_empty());
        assert!(result.delta_logs.is_empty());
        assert!(result.stats_logs.is_empty());
        assert_eq!(compacted_segment_size(&result), 0);
    }

    #[test]
    fn plan_collects_segment_ids_in_order() {
        let plan = CompactionPlan::new(PlanId::new(1), "by-dev-ch1", CompactionType::Merge, 60)
            .with_segment(SegmentBinlogs::new(SegmentId::new(10)))
            .with_segment(SegmentBinlogs::new(SegmentId::new(11)));
        assert_eq!(
            plan.segment_ids(),
            vec![SegmentId::new(10), SegmentId::new(11)]
        );
    }

    #[test]
    fn plan_serializes_round_trip() {
        let plan = CompactionPlan::new(PlanId::new(7), "by-dev-ch2", CompactionType::Mix, 180)
            .with_segment(
                SegmentBinlogs::new(SegmentId::new(21)).with_insert_logs(FieldBinlog::new(
                    FieldId::new(100),
                    vec![Binlog::new("files/100/7.log", 128)],
                )),
            );

        let json = serde_json::to_string(&plan).expect("serialize");
        let parsed: CompactionPlan = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, plan);
    }

    #[test]
    fn only_merge_and_mix_are_mergeable() {
        assert!(CompactionType::Merge.is_mergeable());
        assert!(CompactionType::Mix.is_mergeable());
        assert!(!CompactionType::Inner.is_mergeable());
    }
}
