//! In-memory channel registry for testing and local development.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use strata_core::NodeId;

use super::ChannelRegistry;
use crate::error::{Error, Result};

/// Assignment state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assignment {
    /// Watched by a node.
    Watched(NodeId),
    /// Known, but still buffered awaiting assignment.
    Buffered,
}

/// In-memory channel registry with direct assignment control.
#[derive(Debug, Default)]
pub struct InMemoryChannelRegistry {
    channels: RwLock<HashMap<String, Assignment>>,
}

impl InMemoryChannelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `channel` to `node_id`, replacing any previous owner.
    pub fn watch(&self, channel: impl Into<String>, node_id: NodeId) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels.insert(channel.into(), Assignment::Watched(node_id));
    }

    /// Moves `channel` into the buffered state.
    pub fn buffer(&self, channel: impl Into<String>) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels.insert(channel.into(), Assignment::Buffered);
    }

    /// Removes `channel` from the registry entirely.
    pub fn forget(&self, channel: &str) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels.remove(channel);
    }
}

impl ChannelRegistry for InMemoryChannelRegistry {
    fn find_watcher(&self, channel: &str) -> Result<NodeId> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        match channels.get(channel) {
            Some(Assignment::Watched(node_id)) => Ok(*node_id),
            Some(Assignment::Buffered) => Err(Error::ChannelInBuffer {
                channel: channel.to_string(),
            }),
            None => Err(Error::ChannelNotWatched {
                channel: channel.to_string(),
            }),
        }
    }

    fn matches(&self, node_id: NodeId, channel: &str) -> bool {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        matches!(channels.get(channel), Some(Assignment::Watched(owner)) if *owner == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_watcher_returns_owner() {
        let registry = InMemoryChannelRegistry::new();
        registry.watch("by-dev-ch1", NodeId::new(7));

        assert_eq!(
            registry.find_watcher("by-dev-ch1").expect("watched"),
            NodeId::new(7)
        );
    }

    #[test]
    fn unknown_channel_is_not_watched() {
        let registry = InMemoryChannelRegistry::new();
        let err = registry.find_watcher("by-dev-ch1").expect_err("unknown");
        assert!(matches!(err, Error::ChannelNotWatched { .. }));
    }

    #[test]
    fn buffered_channel_is_reported_distinctly() {
        let registry = InMemoryChannelRegistry::new();
        registry.buffer("by-dev-ch1");
        let err = registry.find_watcher("by-dev-ch1").expect_err("buffered");
        assert!(matches!(err, Error::ChannelInBuffer { .. }));
    }

    #[test]
    fn matches_tracks_reassignment() {
        let registry = InMemoryChannelRegistry::new();
        registry.watch("by-dev-ch1", NodeId::new(7));
        assert!(registry.matches(NodeId::new(7), "by-dev-ch1"));

        registry.watch("by-dev-ch1", NodeId::new(8));
        assert!(!registry.matches(NodeId::new(7), "by-dev-ch1"));
        assert!(registry.matches(NodeId::new(8), "by-dev-ch1"));
    }
}
