//! In-memory worker sessions for testing and local development.
//!
//! Tests script the worker side directly: `report` installs what the
//! "worker" answers on the next poll, `withdraw` makes a plan vanish (a
//! crashed or finished-and-cleared worker), and the failure toggles inject
//! RPC errors.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use strata_core::id::{NodeId, PlanId};

use super::{SyncSegmentsRequest, WorkerPlanResult, WorkerSessions};
use crate::error::{Error, Result};
use crate::plan::CompactionPlan;

#[derive(Debug, Default)]
struct SessionsInner {
    reported: HashMap<PlanId, WorkerPlanResult>,
    compact_calls: Vec<(NodeId, CompactionPlan)>,
    sync_calls: Vec<(NodeId, SyncSegmentsRequest)>,
    fail_compact: bool,
    fail_sync: bool,
}

/// Scriptable in-memory worker session layer.
#[derive(Debug, Default)]
pub struct InMemoryWorkerSessions {
    inner: RwLock<SessionsInner>,
}

impl InMemoryWorkerSessions {
    /// Creates a session layer with no live plans.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts what the worker side reports for `plan_id` on the next poll.
    pub fn report(&self, plan_id: PlanId, result: WorkerPlanResult) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.reported.insert(plan_id, result);
    }

    /// Removes a plan from worker reports, as if the worker dropped it.
    pub fn withdraw(&self, plan_id: PlanId) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.reported.remove(&plan_id);
    }

    /// Injects (or clears) failures for `compact` calls.
    pub fn set_fail_compact(&self, fail: bool) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.fail_compact = fail;
    }

    /// Injects (or clears) failures for `sync_segments` calls.
    pub fn set_fail_sync(&self, fail: bool) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.fail_sync = fail;
    }

    /// All `compact` calls observed so far.
    #[must_use]
    pub fn compact_calls(&self) -> Vec<(NodeId, CompactionPlan)> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.compact_calls.clone()
    }

    /// All `sync_segments` calls observed so far.
    #[must_use]
    pub fn sync_calls(&self) -> Vec<(NodeId, SyncSegmentsRequest)> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.sync_calls.clone()
    }
}

#[async_trait]
impl WorkerSessions for InMemoryWorkerSessions {
    async fn compact(&self, node_id: NodeId, plan: &CompactionPlan) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.compact_calls.push((node_id, plan.clone()));
        if inner.fail_compact {
            return Err(Error::rpc(format!(
                "node {node_id} rejected compaction plan {}",
                plan.plan_id
            )));
        }
        Ok(())
    }

    async fn sync_segments(&self, node_id: NodeId, request: SyncSegmentsRequest) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.fail_sync {
            return Err(Error::rpc(format!(
                "node {node_id} unreachable for sync of plan {}",
                request.plan_id
            )));
        }
        // A successful sync settles the plan on the worker side.
        inner.reported.remove(&request.plan_id);
        inner.sync_calls.push((node_id, request));
        Ok(())
    }

    async fn get_compaction_plan_results(&self) -> HashMap<PlanId, WorkerPlanResult> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.reported.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{CompactionResult, CompactionType};
    use crate::sessions::WorkerPlanState;
    use strata_core::SegmentId;

    #[tokio::test]
    async fn reported_plans_appear_in_polls() {
        let sessions = InMemoryWorkerSessions::new();
        sessions.report(PlanId::new(1), WorkerPlanResult::executing(NodeId::new(7)));

        let results = sessions.get_compaction_plan_results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[&PlanId::new(1)].state, WorkerPlanState::Executing);

        sessions.withdraw(PlanId::new(1));
        assert!(sessions.get_compaction_plan_results().await.is_empty());
    }

    #[tokio::test]
    async fn compact_records_calls_and_can_fail() {
        let sessions = InMemoryWorkerSessions::new();
        let plan = CompactionPlan::new(PlanId::new(1), "by-dev-ch1", CompactionType::Merge, 60);

        sessions
            .compact(NodeId::new(7), &plan)
            .await
            .expect("compact succeeds");
        assert_eq!(sessions.compact_calls().len(), 1);

        sessions.set_fail_compact(true);
        let err = sessions
            .compact(NodeId::new(7), &plan)
            .await
            .expect_err("injected failure");
        assert!(matches!(err, Error::Rpc { .. }));
        // The rejected call is still recorded.
        assert_eq!(sessions.compact_calls().len(), 2);
    }

    #[tokio::test]
    async fn successful_sync_settles_the_reported_plan() {
        let sessions = InMemoryWorkerSessions::new();
        let result = CompactionResult::new(PlanId::new(1), SegmentId::new(30), 100);
        sessions.report(
            PlanId::new(1),
            WorkerPlanResult::completed(NodeId::new(7), result),
        );

        sessions
            .sync_segments(NodeId::new(7), SyncSegmentsRequest::discard(PlanId::new(1)))
            .await
            .expect("sync succeeds");

        assert!(sessions.get_compaction_plan_results().await.is_empty());
        let calls = sessions.sync_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.is_discard());
    }

    #[tokio::test]
    async fn failed_sync_leaves_the_plan_reported() {
        let sessions = InMemoryWorkerSessions::new();
        sessions.report(PlanId::new(1), WorkerPlanResult::executing(NodeId::new(7)));
        sessions.set_fail_sync(true);

        let err = sessions
            .sync_segments(NodeId::new(7), SyncSegmentsRequest::discard(PlanId::new(1)))
            .await
            .expect_err("injected failure");
        assert!(matches!(err, Error::Rpc { .. }));
        assert_eq!(sessions.get_compaction_plan_results().await.len(), 1);
    }
}
