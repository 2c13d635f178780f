//! Manually-driven timestamp oracle for testing and local development.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use strata_core::timestamp::{compose_ts, Timestamp};

use super::TimestampAllocator;
use crate::error::{Error, Result};

#[derive(Debug)]
struct ClockInner {
    now: DateTime<Utc>,
    logical: u32,
    failing: bool,
}

/// Timestamp oracle with a manually-advanced clock and failure injection.
///
/// Tests pin the clock, submit plans, then advance past a deadline and drive
/// `reconcile` with [`current`](Self::current) to observe timeout handling
/// deterministically.
#[derive(Debug)]
pub struct ManualTimestampAllocator {
    inner: RwLock<ClockInner>,
}

impl ManualTimestampAllocator {
    /// Creates an oracle pinned at the given instant.
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            inner: RwLock::new(ClockInner {
                now,
                logical: 0,
                failing: false,
            }),
        }
    }

    /// Creates an oracle pinned at the current wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Advances the clock.
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.now += by;
    }

    /// Injects (or clears) allocation failures.
    pub fn set_failing(&self, failing: bool) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.failing = failing;
    }

    /// The timestamp the clock currently reads, without allocating.
    #[must_use]
    pub fn current(&self) -> Timestamp {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        compose_ts(inner.now, inner.logical)
    }
}

impl Default for ManualTimestampAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimestampAllocator for ManualTimestampAllocator {
    async fn alloc_timestamp(&self) -> Result<Timestamp> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.failing {
            return Err(Error::timestamp("injected allocation failure"));
        }
        inner.logical = inner.logical.wrapping_add(1);
        Ok(compose_ts(inner.now, inner.logical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::timestamp::parse_ts;

    #[tokio::test]
    async fn allocations_are_monotonic() {
        let oracle = ManualTimestampAllocator::new();
        let first = oracle.alloc_timestamp().await.expect("alloc");
        let second = oracle.alloc_timestamp().await.expect("alloc");
        assert!(second > first);
    }

    #[tokio::test]
    async fn advance_moves_physical_time() {
        let oracle = ManualTimestampAllocator::new();
        let before = oracle.alloc_timestamp().await.expect("alloc");
        oracle.advance(Duration::seconds(90));
        let after = oracle.alloc_timestamp().await.expect("alloc");

        let (before_physical, _) = parse_ts(before);
        let (after_physical, _) = parse_ts(after);
        assert_eq!((after_physical - before_physical).num_seconds(), 90);
    }

    #[tokio::test]
    async fn injected_failures_surface() {
        let oracle = ManualTimestampAllocator::new();
        oracle.set_failing(true);
        let err = oracle.alloc_timestamp().await.expect_err("failing");
        assert!(matches!(err, Error::Timestamp { .. }));

        oracle.set_failing(false);
        assert!(oracle.alloc_timestamp().await.is_ok());
    }
}
