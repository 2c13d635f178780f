//! In-memory metadata store for testing and local development.
//!
//! Tracks compacting flags and committed mutations without persistence.
//! Replayed completions return the originally-created segment, matching the
//! idempotence contract of the production store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use strata_core::id::{PlanId, SegmentId};

use super::{MetadataStore, MetricMutation, SegmentInfo};
use crate::error::{Error, Result};
use crate::plan::{CompactionPlan, CompactionResult};

#[derive(Debug, Default)]
struct MetaInner {
    compacting: HashMap<SegmentId, bool>,
    committed: HashMap<PlanId, SegmentInfo>,
    fail_completion: bool,
}

/// In-memory metadata store.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    inner: RwLock<MetaInner>,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a segment is currently flagged as compacting.
    #[must_use]
    pub fn is_compacting(&self, segment_id: SegmentId) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.compacting.get(&segment_id).copied().unwrap_or(false)
    }

    /// Number of committed compaction mutations.
    #[must_use]
    pub fn committed_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.committed.len()
    }

    /// Injects (or clears) a failure for subsequent completion mutations.
    pub fn set_fail_completion(&self, fail: bool) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.fail_completion = fail;
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn set_segment_compacting(&self, segment_id: SegmentId, compacting: bool) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.compacting.insert(segment_id, compacting);
    }

    fn complete_compaction_mutation(
        &self,
        plan: &CompactionPlan,
        result: &CompactionResult,
    ) -> Result<(SegmentInfo, MetricMutation)> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.fail_completion {
            return Err(Error::meta("injected completion failure"));
        }

        // Idempotent replay: the mutation already happened, hand back the
        // same segment with nothing left to commit.
        if let Some(existing) = inner.committed.get(&plan.plan_id) {
            return Ok((existing.clone(), MetricMutation::default()));
        }

        let compaction_from = plan.segment_ids();
        for segment_id in &compaction_from {
            inner.compacting.insert(*segment_id, false);
        }

        let info = SegmentInfo {
            id: result.segment_id,
            compaction_from: compaction_from.clone(),
            num_rows: result.num_rows,
            stats_logs: result.stats_logs.clone(),
        };
        inner.committed.insert(plan.plan_id, info.clone());

        let mutation = MetricMutation {
            segments_compacted: compaction_from.len(),
            rows_compacted: result.num_rows,
        };
        Ok((info, mutation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{CompactionType, SegmentBinlogs};

    fn sample_plan() -> CompactionPlan {
        CompactionPlan::new(PlanId::new(1), "by-dev-ch1", CompactionType::Merge, 60)
            .with_segment(SegmentBinlogs::new(SegmentId::new(10)))
            .with_segment(SegmentBinlogs::new(SegmentId::new(11)))
    }

    #[test]
    fn compacting_flags_round_trip() {
        let store = InMemoryMetadataStore::new();
        store.set_segment_compacting(SegmentId::new(10), true);
        assert!(store.is_compacting(SegmentId::new(10)));
        assert!(!store.is_compacting(SegmentId::new(11)));

        store.set_segment_compacting(SegmentId::new(10), false);
        assert!(!store.is_compacting(SegmentId::new(10)));
    }

    #[test]
    fn completion_retires_sources_and_registers_result() {
        let store = InMemoryMetadataStore::new();
        let plan = sample_plan();
        store.set_segment_compacting(SegmentId::new(10), true);
        store.set_segment_compacting(SegmentId::new(11), true);

        let result = CompactionResult::new(PlanId::new(1), SegmentId::new(30), 1000);
        let (info, mutation) = store
            .complete_compaction_mutation(&plan, &result)
            .expect("mutation succeeds");

        assert_eq!(info.id, SegmentId::new(30));
        assert_eq!(
            info.compaction_from,
            vec![SegmentId::new(10), SegmentId::new(11)]
        );
        assert_eq!(mutation.segments_compacted, 2);
        assert_eq!(mutation.rows_compacted, 1000);
        assert!(!store.is_compacting(SegmentId::new(10)));
        assert!(!store.is_compacting(SegmentId::new(11)));
    }

    #[test]
    fn replay_returns_same_segment_without_second_mutation() {
        let store = InMemoryMetadataStore::new();
        let plan = sample_plan();
        let result = CompactionResult::new(PlanId::new(1), SegmentId::new(30), 1000);

        let (first, _) = store
            .complete_compaction_mutation(&plan, &result)
            .expect("first mutation");
        let (second, replay_mutation) = store
            .complete_compaction_mutation(&plan, &result)
            .expect("replay");

        assert_eq!(first, second);
        assert_eq!(replay_mutation, MetricMutation::default());
        assert_eq!(store.committed_count(), 1);
    }

    #[test]
    fn injected_failure_surfaces_as_meta_error() {
        let store = InMemoryMetadataStore::new();
        store.set_fail_completion(true);

        let err = store
            .complete_compaction_mutation(
                &sample_plan(),
                &CompactionResult::new(PlanId::new(1), SegmentId::new(30), 1000),
            )
            .expect_err("injected failure");
        assert!(matches!(err, Error::Meta { .. }));
    }
}
