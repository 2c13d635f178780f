//! Worker session seam.
//!
//! The session layer multiplexes RPC stubs over the live worker connections.
//! The coordinator drives three calls: `compact` starts execution,
//! `sync_segments` commits or discards a result on the worker, and
//! `get_compaction_plan_results` polls the state every worker currently
//! reports for its plans.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strata_core::id::{NodeId, PlanId, SegmentId};

use crate::error::Result;
use crate::plan::{CompactionPlan, CompactionResult, FieldBinlog};

/// Instruction for a worker to commit or discard a finished plan.
///
/// With `compacted_from` populated the worker installs the new segment and
/// drops the sources; with it empty the worker clears the plan without any
/// metadata effect (used to discard results the coordinator rejected).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSegmentsRequest {
    /// The plan being settled.
    pub plan_id: PlanId,
    /// The new segment the worker should serve, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compacted_to: Option<SegmentId>,
    /// Source segments replaced by the new segment.
    #[serde(default)]
    pub compacted_from: Vec<SegmentId>,
    /// Row count of the new segment.
    #[serde(default)]
    pub num_rows: i64,
    /// Statistics binlogs of the new segment.
    #[serde(default)]
    pub stats_logs: Vec<FieldBinlog>,
}

impl SyncSegmentsRequest {
    /// Builds a discard request: the worker clears the plan without touching
    /// metadata.
    #[must_use]
    pub fn discard(plan_id: PlanId) -> Self {
        Self {
            plan_id,
            compacted_to: None,
            compacted_from: Vec::new(),
            num_rows: 0,
            stats_logs: Vec::new(),
        }
    }

    /// Returns true if this request discards the plan rather than committing
    /// a segment.
    #[must_use]
    pub fn is_discard(&self) -> bool {
        self.compacted_from.is_empty()
    }
}

/// Execution state a worker reports for one of its plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerPlanState {
    /// The worker is still executing the plan.
    Executing,
    /// The worker finished and holds a result.
    Completed,
}

/// One worker-reported plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPlanResult {
    /// The node reporting the plan.
    pub node_id: NodeId,
    /// Reported execution state.
    pub state: WorkerPlanState,
    /// The result payload, present when `state` is Completed.
    pub result: Option<CompactionResult>,
}

impl WorkerPlanResult {
    /// Builds an executing report.
    #[must_use]
    pub const fn executing(node_id: NodeId) -> Self {
        Self {
            node_id,
            state: WorkerPlanState::Executing,
            result: None,
        }
    }

    /// Builds a completed report carrying the result.
    #[must_use]
    pub const fn completed(node_id: NodeId, result: CompactionResult) -> Self {
        Self {
            node_id,
            state: WorkerPlanState::Completed,
            result: Some(result),
        }
    }
}

/// Worker session RPC surface consumed by the coordinator.
#[async_trait]
pub trait WorkerSessions: Send + Sync {
    /// Starts plan execution on a worker.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the worker rejects the plan or is
    /// unreachable.
    async fn compact(&self, node_id: NodeId, plan: &CompactionPlan) -> Result<()>;

    /// Commits or discards a finished plan on a worker.
    ///
    /// # Errors
    ///
    /// Returns an RPC error if the worker is unreachable.
    async fn sync_segments(&self, node_id: NodeId, request: SyncSegmentsRequest) -> Result<()>;

    /// Polls the plan states every live worker currently reports.
    ///
    /// Per-worker poll failures are absorbed by the session layer (a dead
    /// worker simply reports nothing, which the reconciler treats as the
    /// plan being gone).
    async fn get_compaction_plan_results(&self) -> HashMap<PlanId, WorkerPlanResult>;
}
