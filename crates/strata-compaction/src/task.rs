//! Compaction task state and lifecycle.
//!
//! A task is the coordinator's record of one submitted plan. Tasks are
//! immutable values: every mutation shadow-clones the record and swaps the
//! clone into the task table, so snapshot readers holding the previous value
//! never observe a partial update.

use serde::{Deserialize, Serialize};

use strata_core::NodeId;

use crate::plan::{CompactionPlan, CompactionResult, CompactionSignal};

/// Compaction task state machine.
///
/// States follow a directed graph:
///
/// ```text
/// ┌────────────┐ dispatched  ┌───────────┐ worker done ┌───────────┐
/// │ PIPELINING │────────────►│ EXECUTING │────────────►│ COMPLETED │
/// └────────────┘             └───────────┘             └───────────┘
///                                  │  │
///                         deadline │  │ worker lost
///                          passed  │  │
///                                  ▼  ▼
///                           ┌─────────┐  ┌────────┐
///                           │ TIMEOUT │─►│ FAILED │
///                           └─────────┘  └────────┘
///                           (worker stops reporting)
/// ```
///
/// A timed-out task is not failed immediately: the worker is still running
/// and must stop reporting the plan before the coordinator reclaims its
/// admission slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Enrolled, waiting for an admission slot and dispatch.
    Pipelining,
    /// Dispatched to a worker (or dispatch was attempted).
    Executing,
    /// Result committed to metadata.
    Completed,
    /// Terminal failure; resources reclaimed.
    Failed,
    /// Deadline passed while the worker still reported progress.
    Timeout,
}

impl TaskState {
    /// Returns true if this is a terminal state the janitor may evict.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }

    /// Returns true while the task occupies an admission slot and counts
    /// against the global parallelism cap.
    ///
    /// Timed-out tasks still hold their slot: the worker has not yet
    /// acknowledged the failure, so capacity is not reclaimed until it stops
    /// reporting the plan.
    #[must_use]
    pub const fn holds_slot(&self) -> bool {
        matches!(self, Self::Pipelining | Self::Executing | Self::Timeout)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Pipelining => matches!(target, Self::Executing),
            Self::Executing => matches!(target, Self::Completed | Self::Failed | Self::Timeout),
            Self::Timeout => matches!(target, Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Pipelining => "pipelining",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// The coordinator's record of one submitted plan.
#[derive(Debug, Clone)]
pub struct CompactionTask {
    /// The trigger event this plan came from.
    pub signal: CompactionSignal,
    /// The immutable plan payload (`start_time` is written once by dispatch).
    pub plan: CompactionPlan,
    /// Current lifecycle state.
    pub state: TaskState,
    /// The worker node that owns the plan's channel.
    pub node_id: NodeId,
    /// Worker-produced result, populated on success.
    pub result: Option<CompactionResult>,
}

impl CompactionTask {
    /// Creates a freshly-enrolled task.
    #[must_use]
    pub fn new(signal: CompactionSignal, plan: CompactionPlan, node_id: NodeId) -> Self {
        Self {
            signal,
            plan,
            state: TaskState::Pipelining,
            node_id,
            result: None,
        }
    }

    /// Drops the binlog payloads of the plan and result, keeping only ids
    /// and row counts. Applied when a task completes so terminal records
    /// waiting for the janitor stay small.
    pub fn trim_log_payloads(&mut self) {
        for segment in &mut self.plan.segment_binlogs {
            segment.clear_logs();
        }
        if let Some(result) = &mut self.result {
            result.clear_logs();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Binlog, CompactionType, FieldBinlog, SegmentBinlogs};
    use strata_core::id::{CollectionId, FieldId, PartitionId, PlanId, SegmentId, SignalId};

    fn sample_task() -> CompactionTask {
        let signal = CompactionSignal::new(
            SignalId::new(5),
            CollectionId::new(1),
            PartitionId::new(2),
            "by-dev-ch1",
        );
        let plan = CompactionPlan::new(PlanId::new(10), "by-dev-ch1", CompactionType::Merge, 60)
            .with_segment(
                SegmentBinlogs::new(SegmentId::new(100)).with_insert_logs(FieldBinlog::new(
                    FieldId::new(1),
                    vec![Binlog::new("files/1/1.log", 128)],
                )),
            );
        CompactionTask::new(signal, plan, NodeId::new(7))
    }

    #[test]
    fn new_tasks_start_pipelining() {
        let task = sample_task();
        assert_eq!(task.state, TaskState::Pipelining);
        assert!(task.result.is_none());
    }

    #[test]
    fn transition_graph_is_enforced() {
        use TaskState::{Completed, Executing, Failed, Pipelining, Timeout};

        assert!(Pipelining.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Completed));
        assert!(Executing.can_transition_to(Failed));
        assert!(Executing.can_transition_to(Timeout));
        assert!(Timeout.can_transition_to(Failed));

        assert!(!Pipelining.can_transition_to(Completed));
        assert!(!Pipelining.can_transition_to(Failed));
        assert!(!Timeout.can_transition_to(Executing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Executing));
    }

    #[test]
    fn terminal_states_include_timeout() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Timeout.is_terminal());
        assert!(!TaskState::Executing.is_terminal());
        assert!(!TaskState::Pipelining.is_terminal());
    }

    #[test]
    fn timeout_still_holds_its_slot() {
        assert!(TaskState::Pipelining.holds_slot());
        assert!(TaskState::Executing.holds_slot());
        assert!(TaskState::Timeout.holds_slot());
        assert!(!TaskState::Completed.holds_slot());
        assert!(!TaskState::Failed.holds_slot());
    }

    #[test]
    fn trim_log_payloads_clears_plan_and_result() {
        let mut task = sample_task();
        task.result = Some(
            CompactionResult::new(PlanId::new(10), SegmentId::new(200), 1000).with_insert_logs(
                FieldBinlog::new(FieldId::new(1), vec![Binlog::new("files/1/2.log", 256)]),
            ),
        );

        task.trim_log_payloads();

        assert!(task.plan.segment_binlogs[0].insert_logs.is_empty());
        assert!(task
            .result
            .as_ref()
            .is_some_and(|r| r.insert_logs.is_empty()));
        // Ids survive trimming.
        assert_eq!(task.plan.segment_binlogs[0].segment_id, SegmentId::new(100));
    }
}
