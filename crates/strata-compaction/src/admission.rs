//! Per-node admission queues.
//!
//! Each worker node gets a bounded counting semaphore of the configured
//! capacity, created lazily on first use and never destroyed. The semaphore
//! is the only back-pressure surface toward workers: a dispatch task blocks
//! in [`NodeAdmissionQueues::acquire`] until a peer plan on the same node
//! releases its slot.
//!
//! Acquire and release deliberately happen in different contexts (the
//! dispatch task acquires, the reconciler or completion handler releases),
//! so permits are detached from RAII guards: `acquire` forgets the permit it
//! obtained and `release` restores one.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::sync::Arc;

use tokio::sync::Semaphore;

use strata_core::NodeId;

/// Lazily-created bounded admission queues, one per worker node.
#[derive(Debug)]
pub struct NodeAdmissionQueues {
    capacity: usize,
    nodes: Mutex<HashMap<NodeId, Arc<Semaphore>>>,
}

impl NodeAdmissionQueues {
    /// Creates admission queues with the given per-node capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Per-node slot capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn semaphore(&self, node_id: NodeId) -> Arc<Semaphore> {
        let mut nodes = self
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            nodes
                .entry(node_id)
                .or_insert_with(|| Arc::new(Semaphore::new(self.capacity))),
        )
    }

    /// Blocks until a slot for `node_id` is available, then holds it.
    ///
    /// The slot stays held until a matching [`release`](Self::release); it is
    /// not tied to any guard's lifetime. Callers must not hold the task
    /// table lock across this call.
    pub async fn acquire(&self, node_id: NodeId) {
        let semaphore = self.semaphore(node_id);
        if let Ok(permit) = semaphore.acquire_owned().await {
            // Detach the permit: release happens from another context.
            permit.forget();
        }
    }

    /// Releases one slot for `node_id`.
    ///
    /// A release for a node that has no queue, or with no slot held, is a
    /// coordination bug upstream; it is logged and dropped rather than
    /// inflating capacity.
    pub fn release(&self, node_id: NodeId) {
        let semaphore = {
            let nodes = self
                .nodes
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            nodes.get(&node_id).map(Arc::clone)
        };

        let Some(semaphore) = semaphore else {
            tracing::warn!(node_id = %node_id, "admission release for unknown node");
            return;
        };

        if semaphore.available_permits() >= self.capacity {
            tracing::warn!(node_id = %node_id, "admission release without matching acquire");
            return;
        }

        semaphore.add_permits(1);
    }

    /// Number of slots currently held for `node_id`.
    #[must_use]
    pub fn in_use(&self, node_id: NodeId) -> usize {
        let nodes = self
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        nodes
            .get(&node_id)
            .map_or(0, |s| self.capacity.saturating_sub(s.available_permits()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_holds_a_slot_until_release() {
        let queues = NodeAdmissionQueues::new(2);
        let node = NodeId::new(1);

        queues.acquire(node).await;
        assert_eq!(queues.in_use(node), 1);

        queues.release(node);
        assert_eq!(queues.in_use(node), 0);
    }

    #[tokio::test]
    async fn acquire_blocks_at_capacity() {
        let queues = Arc::new(NodeAdmissionQueues::new(1));
        let node = NodeId::new(1);

        queues.acquire(node).await;

        let blocked = {
            let queues = Arc::clone(&queues);
            tokio::spawn(async move {
                queues.acquire(node).await;
            })
        };

        // The second acquire cannot finish while the slot is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        queues.release(node);
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("acquire should unblock after release")
            .expect("task should not panic");
        assert_eq!(queues.in_use(node), 1);
    }

    #[tokio::test]
    async fn nodes_have_independent_capacity() {
        let queues = NodeAdmissionQueues::new(1);

        queues.acquire(NodeId::new(1)).await;
        queues.acquire(NodeId::new(2)).await;

        assert_eq!(queues.in_use(NodeId::new(1)), 1);
        assert_eq!(queues.in_use(NodeId::new(2)), 1);
    }

    #[tokio::test]
    async fn release_without_acquire_is_dropped() {
        let queues = NodeAdmissionQueues::new(2);
        let node = NodeId::new(3);

        queues.acquire(node).await;
        queues.release(node);
        // Extra releases must not inflate capacity beyond the configured bound.
        queues.release(node);
        queues.release(NodeId::new(99));

        assert_eq!(queues.in_use(node), 0);

        queues.acquire(node).await;
        queues.acquire(node).await;
        assert_eq!(queues.in_use(node), 2);
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let queues = NodeAdmissionQueues::new(0);
        assert_eq!(queues.capacity(), 1);
    }
}
