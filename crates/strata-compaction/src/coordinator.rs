//! The compaction plan coordinator.
//!
//! [`CompactionCoordinator`] accepts plans from the trigger, dispatches them
//! to the worker nodes that own their channels, tracks their lifecycle in an
//! in-memory task table, and commits the metadata mutation when a worker
//! reports success.
//!
//! Three flows mutate the shared table:
//!
//! - **Submission** enrolls a task under the table lock, then hands off to a
//!   detached dispatch task so a full admission queue never blocks the
//!   caller.
//! - **Reconciliation** runs on a tick: it compares the table against the
//!   state workers report, completes finished plans, times out overdue ones,
//!   fails vanished ones, and tells workers to discard results the
//!   coordinator cannot accept.
//! - **The janitor** periodically evicts terminal tasks once they age past
//!   their plan timeout plus a grace period.
//!
//! Task records are copy-on-write: a mutation clones the record and swaps
//! the clone into the table, so snapshot readers keep a consistent view
//! without holding the lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use strata_core::id::{NodeId, PlanId, SegmentId, SignalId};
use strata_core::timestamp::{compose_now, parse_ts, Timestamp};

use crate::admission::NodeAdmissionQueues;
use crate::channels::ChannelRegistry;
use crate::config::CompactionConfig;
use crate::error::{Error, Result};
use crate::meta::MetadataStore;
use crate::metrics::CompactionMetrics;
use crate::plan::{compacted_segment_size, CompactionPlan, CompactionResult, CompactionSignal};
use crate::sessions::{SyncSegmentsRequest, WorkerPlanState, WorkerSessions};
use crate::task::{CompactionTask, TaskState};
use crate::tso::{TimestampAllocator, TS_TIMEOUT};

/// Interval between janitor sweeps.
const CLEAN_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Grace period a terminal task survives past its plan timeout before the
/// janitor evicts it.
const CLEAN_GRACE_SECONDS: i64 = 60 * 60;

#[derive(Debug, Default)]
struct TaskTable {
    plans: HashMap<PlanId, Arc<CompactionTask>>,
    /// Number of tasks in slot-holding states (see [`TaskState::holds_slot`]).
    executing_count: usize,
}

struct Loops {
    token: CancellationToken,
    reconciler: JoinHandle<()>,
    janitor: JoinHandle<()>,
}

struct Inner {
    table: RwLock<TaskTable>,
    admission: NodeAdmissionQueues,
    sessions: Arc<dyn WorkerSessions>,
    channels: Arc<dyn ChannelRegistry>,
    meta: Arc<dyn MetadataStore>,
    tso: Arc<dyn TimestampAllocator>,
    flush_tx: mpsc::UnboundedSender<SegmentId>,
    config: CompactionConfig,
    metrics: CompactionMetrics,
    loops: StdMutex<Option<Loops>>,
}

/// Control-plane coordinator for compaction plans.
///
/// Cheap to clone; clones share the task table and background loops.
#[derive(Clone)]
pub struct CompactionCoordinator {
    inner: Arc<Inner>,
}

impl CompactionCoordinator {
    /// Creates a coordinator wired to its collaborators.
    ///
    /// Completed segment ids are emitted on `flush_tx`; the receiving side is
    /// expected to drain it for the lifetime of the coordinator.
    #[must_use]
    pub fn new(
        config: CompactionConfig,
        sessions: Arc<dyn WorkerSessions>,
        channels: Arc<dyn ChannelRegistry>,
        meta: Arc<dyn MetadataStore>,
        tso: Arc<dyn TimestampAllocator>,
        flush_tx: mpsc::UnboundedSender<SegmentId>,
    ) -> Self {
        let admission = NodeAdmissionQueues::new(config.worker_parallel_tasks);
        Self {
            inner: Arc::new(Inner {
                table: RwLock::default(),
                admission,
                sessions,
                channels,
                meta,
                tso,
                flush_tx,
                config,
                metrics: CompactionMetrics::new(),
                loops: StdMutex::new(None),
            }),
        }
    }

    /// Launches the reconcile and janitor loops.
    ///
    /// Ticks coalesce: if one tick's work runs past the interval, the missed
    /// tick is skipped rather than queued. Calling `start` on a running
    /// coordinator is a no-op.
    pub fn start(&self) {
        let mut loops = self
            .inner
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if loops.is_some() {
            warn!("compaction coordinator already started");
            return;
        }

        let token = CancellationToken::new();
        let reconciler = tokio::spawn(Self::reconcile_loop(self.clone(), token.clone()));
        let janitor = tokio::spawn(Self::clean_loop(self.clone(), token.clone()));
        *loops = Some(Loops {
            token,
            reconciler,
            janitor,
        });
        info!(
            check_interval_secs = self.inner.config.check_interval.as_secs(),
            "compaction coordinator started"
        );
    }

    /// Signals shutdown and waits for both background loops to finish.
    ///
    /// In-flight dispatch tasks are not awaited: their worker RPCs carry
    /// their own timeouts and their table updates become no-ops once the
    /// janitor has evicted the task.
    pub async fn stop(&self) {
        let loops = {
            let mut guard = self
                .inner
                .loops
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };
        let Some(loops) = loops else {
            return;
        };

        loops.token.cancel();
        let _ = loops.reconciler.await;
        let _ = loops.janitor.await;
        info!("compaction coordinator stopped");
    }

    /// Enrolls a plan and returns once it is tracked.
    ///
    /// The synchronous part resolves the channel owner, flags the plan's
    /// segments as compacting, and installs the task in Pipelining state.
    /// Admission, start-time allocation, and the worker RPC happen on a
    /// detached task; their failures surface as state transitions observed
    /// by the reconciler, never as a `submit` error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotWatched`] or [`Error::ChannelInBuffer`]
    /// when the plan's channel has no usable owner; no task is enrolled.
    pub async fn submit(&self, signal: CompactionSignal, plan: CompactionPlan) -> Result<()> {
        let mut table = self.inner.table.write().await;

        let node_id = match self.inner.channels.find_watcher(&plan.channel) {
            Ok(node_id) => node_id,
            Err(err) => {
                warn!(
                    plan_id = %plan.plan_id,
                    channel = %plan.channel,
                    error = %err,
                    "cannot place compaction plan"
                );
                return Err(err);
            }
        };

        self.set_segments_compacting(&plan, true);

        let plan_id = plan.plan_id;
        let dispatch_plan = plan.clone();
        table
            .plans
            .insert(plan_id, Arc::new(CompactionTask::new(signal, plan, node_id)));
        table.executing_count += 1;
        self.inner.metrics.set_executing_tasks(table.executing_count);
        drop(table);

        info!(plan_id = %plan_id, node_id = %node_id, "compaction plan enrolled");

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.dispatch(dispatch_plan, node_id).await;
        });
        Ok(())
    }

    /// Async half of submission: waits for an admission slot, stamps the
    /// start time, and starts execution on the worker.
    async fn dispatch(&self, mut plan: CompactionPlan, node_id: NodeId) {
        let plan_id = plan.plan_id;
        debug!(plan_id = %plan_id, node_id = %node_id, "acquiring admission slot");
        self.inner.admission.acquire(node_id).await;

        let start_time = match self.alloc_timestamp_bounded().await {
            Ok(ts) => ts,
            Err(err) => {
                warn!(
                    plan_id = %plan_id,
                    node_id = %node_id,
                    error = %err,
                    "failed to allocate start time; plan will time out"
                );
                // The sentinel start time reads as already expired, so the
                // reconciler retires the plan on its next tick.
                self.update_task(plan_id, |task| task.plan.start_time = TS_TIMEOUT)
                    .await;
                self.transition_now(plan_id, TaskState::Executing).await;
                return;
            }
        };

        plan.start_time = start_time;
        self.update_task(plan_id, |task| task.plan.start_time = start_time)
            .await;

        let rpc = self.inner.sessions.compact(node_id, &plan).await;
        self.transition_now(plan_id, TaskState::Executing).await;
        if let Err(err) = rpc {
            // The admission slot is deliberately not released here: the
            // reconciler observes the missing worker state and releases it,
            // which keeps the release single-sited.
            warn!(
                plan_id = %plan_id,
                node_id = %node_id,
                error = %err,
                "worker rejected compaction plan"
            );
            return;
        }
        info!(plan_id = %plan_id, node_id = %node_id, "compaction started");
    }

    /// Reconciles the task table against worker-reported state.
    ///
    /// `now` is an oracle timestamp; deadlines are judged against its
    /// physical component. The background loop allocates one per tick; tests
    /// may pass any value directly.
    ///
    /// # Errors
    ///
    /// Returns an error only when instructing a worker to discard an unknown
    /// plan fails; the remainder of that tick is aborted and retried on the
    /// next one.
    pub async fn reconcile(&self, now: Timestamp) -> Result<()> {
        let _timer = self.inner.metrics.time_reconcile();

        // Snapshot the active sets before polling workers: a plan submitted
        // while the poll is in flight must not read as dropped.
        let executing = self.tasks_by_state(TaskState::Executing).await;
        let timed_out = self.tasks_by_state(TaskState::Timeout).await;
        let worker_results = self.inner.sessions.get_compaction_plan_results().await;

        let mut table = self.inner.table.write().await;
        let mut seen = HashSet::with_capacity(executing.len() + timed_out.len());

        for task in &executing {
            let plan_id = task.plan.plan_id;
            seen.insert(plan_id);

            let Some(reported) = worker_results.get(&plan_id) else {
                self.fail_task(&mut table, task, "worker no longer reports the plan");
                continue;
            };

            match reported.state {
                WorkerPlanState::Completed => {
                    if !self.inner.channels.matches(task.node_id, &task.plan.channel) {
                        // The channel was rebalanced away mid-execution; the
                        // result must not reach metadata. The worker clears
                        // the plan via an empty sync.
                        warn!(
                            plan_id = %plan_id,
                            node_id = %task.node_id,
                            channel = %task.plan.channel,
                            "channel moved during execution; discarding result"
                        );
                        let discard = SyncSegmentsRequest::discard(plan_id);
                        if let Err(err) =
                            self.inner.sessions.sync_segments(task.node_id, discard).await
                        {
                            warn!(
                                plan_id = %plan_id,
                                node_id = %task.node_id,
                                error = %err,
                                "failed to discard stale result"
                            );
                            continue;
                        }
                        self.fail_task(&mut table, task, "channel affinity violated");
                    }
                    // Completion is still attempted after an affinity
                    // failure; its state precondition rejects the now-Failed
                    // task. Kept until the fall-through question is settled
                    // with the storage owners.
                    let Some(result) = reported.result.as_ref() else {
                        warn!(
                            plan_id = %plan_id,
                            node_id = %task.node_id,
                            "completed plan reported without a result"
                        );
                        continue;
                    };
                    if let Err(err) = self.complete(&mut table, result).await {
                        self.inner.metrics.record_completion_retry();
                        warn!(
                            plan_id = %plan_id,
                            node_id = %task.node_id,
                            error = %err,
                            "failed to complete compaction"
                        );
                    }
                }
                WorkerPlanState::Executing => {
                    if deadline_exceeded(now, task.plan.start_time, task.plan.timeout_seconds) {
                        warn!(
                            plan_id = %plan_id,
                            node_id = %task.node_id,
                            channel = %task.plan.channel,
                            timeout_seconds = task.plan.timeout_seconds,
                            start_time = task.plan.start_time,
                            now,
                            "compaction deadline exceeded"
                        );
                        self.transition(&mut table, plan_id, TaskState::Timeout);
                    }
                }
            }
        }

        // A timed-out plan keeps its slot until the worker stops reporting
        // it; the worker-side timeout has not fired yet and failing earlier
        // would race a still-running execution.
        for task in &timed_out {
            let plan_id = task.plan.plan_id;
            seen.insert(plan_id);

            match worker_results.get(&plan_id) {
                Some(reported) if reported.state == WorkerPlanState::Executing => {
                    debug!(
                        plan_id = %plan_id,
                        node_id = %task.node_id,
                        "timed out in coordinator, worker still running"
                    );
                }
                Some(_) => {}
                None => self.fail_task(&mut table, task, "timed out and dropped by worker"),
            }
        }

        // Completed plans the coordinator has no record of are discarded on
        // the worker so results do not pile up there. An RPC failure aborts
        // the tick; the next tick retries the remainder.
        for (plan_id, reported) in &worker_results {
            if reported.state != WorkerPlanState::Completed || seen.contains(plan_id) {
                continue;
            }
            info!(
                plan_id = %plan_id,
                node_id = %reported.node_id,
                "instructing worker to drop unknown plan"
            );
            self.inner
                .sessions
                .sync_segments(reported.node_id, SyncSegmentsRequest::discard(*plan_id))
                .await?;
        }

        Ok(())
    }

    /// Commits one worker-reported result.
    ///
    /// Two-phase: the metadata mutation lands first, then the worker sync.
    /// If the sync fails the task stays Executing and the next tick replays
    /// the mutation (idempotent) and retries the sync. Metrics commit only
    /// after the sync succeeds.
    async fn complete(&self, table: &mut TaskTable, result: &CompactionResult) -> Result<()> {
        let plan_id = result.plan_id;
        let task = table
            .plans
            .get(&plan_id)
            .cloned()
            .ok_or(Error::PlanNotFound { plan_id })?;

        if task.state != TaskState::Executing {
            return Err(Error::UnexpectedState {
                plan_id,
                state: task.state,
                expected: TaskState::Executing,
            });
        }
        if !task.plan.plan_type.is_mergeable() {
            return Err(Error::UnknownCompactionType {
                plan_type: task.plan.plan_type,
            });
        }

        let (new_segment, metric_mutation) = self
            .inner
            .meta
            .complete_compaction_mutation(&task.plan, result)?;

        let request = SyncSegmentsRequest {
            plan_id,
            compacted_to: Some(new_segment.id),
            compacted_from: new_segment.compaction_from.clone(),
            num_rows: new_segment.num_rows,
            stats_logs: new_segment.stats_logs.clone(),
        };
        self.inner.sessions.sync_segments(task.node_id, request).await?;

        metric_mutation.commit(&self.inner.metrics);
        self.inner
            .metrics
            .observe_compacted_segment_size(compacted_segment_size(result));

        replace_task(table, plan_id, |next| {
            next.result = Some(result.clone());
            next.trim_log_payloads();
        });
        self.transition(table, plan_id, TaskState::Completed);

        if self.inner.flush_tx.send(new_segment.id).is_err() {
            warn!(
                plan_id = %plan_id,
                segment_id = %new_segment.id,
                "flush notifier closed; compacted segment will not be flushed"
            );
        }
        self.inner.admission.release(task.node_id);

        info!(
            plan_id = %plan_id,
            node_id = %task.node_id,
            segment_id = %new_segment.id,
            "compaction completed"
        );
        Ok(())
    }

    /// Evicts terminal tasks older than their plan timeout plus the grace
    /// period.
    pub async fn clean(&self, now: Timestamp) {
        let mut table = self.inner.table.write().await;
        let before = table.plans.len();
        table.plans.retain(|_, task| {
            !task.state.is_terminal()
                || !deadline_exceeded(
                    now,
                    task.plan.start_time,
                    task.plan.timeout_seconds + CLEAN_GRACE_SECONDS,
                )
        });
        let evicted = before - table.plans.len();
        if evicted > 0 {
            info!(evicted, "evicted terminal compaction tasks");
        }
    }

    /// Returns the task for `plan_id`, if tracked.
    pub async fn get(&self, plan_id: PlanId) -> Option<Arc<CompactionTask>> {
        let table = self.inner.table.read().await;
        table.plans.get(&plan_id).cloned()
    }

    /// Snapshot of all tasks currently in `state`.
    pub async fn tasks_by_state(&self, state: TaskState) -> Vec<Arc<CompactionTask>> {
        let table = self.inner.table.read().await;
        table
            .plans
            .values()
            .filter(|task| task.state == state)
            .cloned()
            .collect()
    }

    /// Snapshot of all tasks belonging to a trigger signal.
    ///
    /// The zero signal id is a wildcard returning every tracked task.
    pub async fn tasks_by_signal(&self, signal_id: SignalId) -> Vec<Arc<CompactionTask>> {
        let table = self.inner.table.read().await;
        table
            .plans
            .values()
            .filter(|task| signal_id == SignalId::new(0) || task.signal.id == signal_id)
            .cloned()
            .collect()
    }

    /// Returns true once the global parallelism cap is reached.
    pub async fn is_full(&self) -> bool {
        let table = self.inner.table.read().await;
        table.executing_count >= self.inner.config.max_parallel_tasks
    }

    /// Number of tasks currently holding admission slots.
    pub async fn executing_count(&self) -> usize {
        let table = self.inner.table.read().await;
        table.executing_count
    }

    /// Admission slots currently held on one worker node.
    #[must_use]
    pub fn admission_slots_in_use(&self, node_id: NodeId) -> usize {
        self.inner.admission.in_use(node_id)
    }

    async fn reconcile_loop(coordinator: Self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(coordinator.inner.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    info!("compaction reconciler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let now = match coordinator.alloc_timestamp_bounded().await {
                        Ok(ts) => ts,
                        Err(err) => {
                            warn!(error = %err, "unable to allocate reconcile timestamp");
                            continue;
                        }
                    };
                    if let Err(err) = coordinator.reconcile(now).await {
                        warn!(error = %err, "compaction reconcile tick failed");
                    }
                }
            }
        }
    }

    async fn clean_loop(coordinator: Self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(CLEAN_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    info!("compaction janitor stopped");
                    return;
                }
                _ = ticker.tick() => {
                    coordinator.clean(compose_now()).await;
                }
            }
        }
    }

    /// Allocates an oracle timestamp, bounded by the configured RPC timeout.
    async fn alloc_timestamp_bounded(&self) -> Result<Timestamp> {
        match tokio::time::timeout(
            self.inner.config.rpc_timeout,
            self.inner.tso.alloc_timestamp(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::timestamp("timestamp allocation timed out")),
        }
    }

    fn set_segments_compacting(&self, plan: &CompactionPlan, compacting: bool) {
        for segment_id in plan.segment_ids() {
            self.inner.meta.set_segment_compacting(segment_id, compacting);
        }
    }

    async fn update_task<F>(&self, plan_id: PlanId, mutate: F)
    where
        F: FnOnce(&mut CompactionTask),
    {
        let mut table = self.inner.table.write().await;
        replace_task(&mut table, plan_id, mutate);
    }

    async fn transition_now(&self, plan_id: PlanId, next: TaskState) {
        let mut table = self.inner.table.write().await;
        self.transition(&mut table, plan_id, next);
    }

    /// Moves a task along the state graph, keeping the slot-holder count and
    /// transition metrics consistent. Invalid transitions are refused.
    fn transition(&self, table: &mut TaskTable, plan_id: PlanId, next: TaskState) -> bool {
        let Some(task) = table.plans.get(&plan_id) else {
            return false;
        };
        let from = task.state;
        if !from.can_transition_to(next) {
            warn!(
                plan_id = %plan_id,
                from = %from,
                to = %next,
                "refusing invalid task state transition"
            );
            return false;
        }

        replace_task(table, plan_id, |task| task.state = next);
        self.inner
            .metrics
            .record_task_transition(from.as_label(), next.as_label());

        if from.holds_slot() && !next.holds_slot() {
            table.executing_count = table.executing_count.saturating_sub(1);
            self.inner.metrics.set_executing_tasks(table.executing_count);
        }
        true
    }

    /// Terminal failure path: fail the task, clear its compacting flags, and
    /// release its admission slot. All three happen only if the transition
    /// is actually taken, which keeps the slot release single-shot.
    fn fail_task(&self, table: &mut TaskTable, task: &CompactionTask, reason: &'static str) {
        info!(
            plan_id = %task.plan.plan_id,
            node_id = %task.node_id,
            channel = %task.plan.channel,
            reason,
            "compaction plan failed"
        );
        if self.transition(table, task.plan.plan_id, TaskState::Failed) {
            self.set_segments_compacting(&task.plan, false);
            self.inner.admission.release(task.node_id);
        }
    }
}

fn replace_task<F>(table: &mut TaskTable, plan_id: PlanId, mutate: F)
where
    F: FnOnce(&mut CompactionTask),
{
    if let Some(entry) = table.plans.get_mut(&plan_id) {
        let mut next = (**entry).clone();
        mutate(&mut next);
        *entry = Arc::new(next);
    }
}

/// Timeout predicate over oracle timestamps.
///
/// Both values are reduced to their physical wall-clock component; the plan
/// is overdue once the elapsed whole seconds reach its timeout. A sentinel
/// start time of `1` parses to the epoch and is therefore always overdue.
fn deadline_exceeded(now: Timestamp, start: Timestamp, timeout_seconds: i64) -> bool {
    let (now_physical, _) = parse_ts(now);
    let (start_physical, _) = parse_ts(start);
    (now_physical - start_physical).num_seconds() >= timeout_seconds
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use strata_core::timestamp::compose_ts;

    fn ts_at(secs: i64) -> Timestamp {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        compose_ts(base + chrono::Duration::seconds(secs), 0)
    }

    #[test]
    fn deadline_respects_whole_second_boundary() {
        let start = ts_at(0);
        assert!(!deadline_exceeded(ts_at(59), start, 60));
        assert!(deadline_exceeded(ts_at(60), start, 60));
        assert!(deadline_exceeded(ts_at(61), start, 60));
    }

    #[test]
    fn sentinel_start_time_is_always_overdue() {
        // Even a year-long plan timeout cannot outlast a start time parsed
        // back to the epoch.
        let one_year = 60 * 60 * 24 * 365;
        assert!(deadline_exceeded(ts_at(0), TS_TIMEOUT, one_year));
        assert!(deadline_exceeded(compose_now(), TS_TIMEOUT, 3600));
    }

    #[test]
    fn logical_bits_do_not_affect_deadlines() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let start = compose_ts(base, 5);
        let now = compose_ts(base + chrono::Duration::seconds(10), 200_000);
        assert!(!deadline_exceeded(now, start, 11));
        assert!(deadline_exceeded(now, start, 10));
    }
}
