//! Channel ownership registry seam.
//!
//! Every channel is owned by exactly one worker node at a time, but
//! ownership moves as the cluster rebalances. The coordinator consults the
//! registry twice per plan: at submission, to pick the dispatch target, and
//! at completion, to verify the result still comes from the channel's
//! current owner (the affinity check).

pub mod memory;

use strata_core::NodeId;

use crate::error::Result;

/// Channel ownership registry consumed by the coordinator.
///
/// Implementations are synchronous; the production registry answers from its
/// in-memory assignment table.
pub trait ChannelRegistry: Send + Sync {
    /// Returns the node currently watching `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotWatched`](crate::error::Error::ChannelNotWatched)
    /// if no node watches the channel, or
    /// [`Error::ChannelInBuffer`](crate::error::Error::ChannelInBuffer) if the
    /// channel is still waiting for assignment.
    fn find_watcher(&self, channel: &str) -> Result<NodeId>;

    /// Returns true if `node_id` currently watches `channel`.
    fn matches(&self, node_id: NodeId, channel: &str) -> bool;
}
