//! Error types for the compaction coordination domain.

use strata_core::PlanId;

use crate::plan::CompactionType;
use crate::task::TaskState;

/// The result type used throughout strata-compaction.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while coordinating compaction plans.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The plan's channel is not watched by any worker node.
    #[error("channel is not watched: {channel}")]
    ChannelNotWatched {
        /// The unwatched channel name.
        channel: String,
    },

    /// The plan's channel is buffered, awaiting assignment to a worker.
    #[error("channel is in buffer: {channel}")]
    ChannelInBuffer {
        /// The buffered channel name.
        channel: String,
    },

    /// A plan was not found in the task table.
    #[error("compaction plan not found: {plan_id}")]
    PlanNotFound {
        /// The plan id that was not found.
        plan_id: PlanId,
    },

    /// A task was in the wrong state for the attempted operation.
    #[error("compaction plan {plan_id} is in state {state}, expected {expected}")]
    UnexpectedState {
        /// The plan id.
        plan_id: PlanId,
        /// The observed state.
        state: TaskState,
        /// The state the operation requires.
        expected: TaskState,
    },

    /// The plan carries a compaction type the coordinator cannot complete.
    #[error("unknown compaction type: {plan_type}")]
    UnknownCompactionType {
        /// The rejected compaction type.
        plan_type: CompactionType,
    },

    /// A metadata store mutation failed.
    #[error("metadata mutation failed: {message}")]
    Meta {
        /// Description of the failure.
        message: String,
    },

    /// A worker RPC failed.
    #[error("worker rpc failed: {message}")]
    Rpc {
        /// Description of the failure.
        message: String,
    },

    /// Timestamp allocation from the oracle failed.
    #[error("timestamp allocation failed: {message}")]
    Timestamp {
        /// Description of the failure.
        message: String,
    },

    /// A configuration value was missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl Error {
    /// Creates a new metadata error.
    #[must_use]
    pub fn meta(message: impl Into<String>) -> Self {
        Self::Meta {
            message: message.into(),
        }
    }

    /// Creates a new worker RPC error.
    #[must_use]
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    /// Creates a new timestamp allocation error.
    #[must_use]
    pub fn timestamp(message: impl Into<String>) -> Self {
        Self::Timestamp {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns true for the channel placement errors `submit` hands back to
    /// its caller without enrolling a task.
    #[must_use]
    pub const fn is_channel_placement(&self) -> bool {
        matches!(
            self,
            Self::ChannelNotWatched { .. } | Self::ChannelInBuffer { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_errors_are_placement_errors() {
        let not_watched = Error::ChannelNotWatched {
            channel: "by-dev-ch1".into(),
        };
        let buffered = Error::ChannelInBuffer {
            channel: "by-dev-ch1".into(),
        };
        assert!(not_watched.is_channel_placement());
        assert!(buffered.is_channel_placement());
        assert!(!Error::rpc("boom").is_channel_placement());
    }

    #[test]
    fn unexpected_state_display() {
        let err = Error::UnexpectedState {
            plan_id: PlanId::new(10),
            state: TaskState::Failed,
            expected: TaskState::Executing,
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("failed"));
        assert!(msg.contains("executing"));
    }

    #[test]
    fn helper_constructors_carry_message() {
        assert!(Error::meta("segment missing").to_string().contains("segment missing"));
        assert!(Error::rpc("node down").to_string().contains("node down"));
        assert!(Error::timestamp("oracle down").to_string().contains("oracle down"));
    }
}
