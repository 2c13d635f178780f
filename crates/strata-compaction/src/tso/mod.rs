//! Timestamp oracle seam.
//!
//! The cluster's timestamp oracle issues monotonic hybrid timestamps (see
//! [`strata_core::timestamp`]). The coordinator allocates one per dispatch
//! (the plan's start time) and one per reconcile tick (the "now" against
//! which deadlines are judged).

pub mod memory;

use async_trait::async_trait;

use strata_core::Timestamp;

use crate::error::Result;

/// Sentinel start timestamp that parses to the epoch and therefore reads as
/// already timed out. Assigned when allocation fails during dispatch so the
/// reconciler retires the plan on its next tick.
pub const TS_TIMEOUT: Timestamp = 1;

/// Timestamp oracle consumed by the coordinator.
#[async_trait]
pub trait TimestampAllocator: Send + Sync {
    /// Allocates the next monotonic timestamp.
    ///
    /// # Errors
    ///
    /// Returns a timestamp error if the oracle is unreachable.
    async fn alloc_timestamp(&self) -> Result<Timestamp>;
}
