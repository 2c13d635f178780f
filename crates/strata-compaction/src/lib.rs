//! # strata-compaction
//!
//! Compaction plan coordinator for the Strata columnar data store.
//!
//! This crate implements the control plane that turns trigger-produced
//! compaction plans into committed metadata:
//!
//! - **Dispatch**: plans are routed to the worker node owning their channel,
//!   gated by per-node admission queues so no worker is oversubscribed
//! - **Reconciliation**: a tick loop compares coordinator memory against
//!   worker-reported state, completing, timing out, and failing plans
//! - **Affinity enforcement**: a result is only committed while the plan's
//!   channel is still owned by the worker that produced it
//! - **Cleanup**: a janitor evicts terminal tasks after a grace period
//!
//! External collaborators (worker sessions, channel ownership registry,
//! metadata store, timestamp oracle) are traits; each ships an in-memory
//! implementation in its `memory` submodule for tests and local development.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tokio::sync::mpsc;
//!
//! use strata_compaction::channels::memory::InMemoryChannelRegistry;
//! use strata_compaction::config::CompactionConfig;
//! use strata_compaction::coordinator::CompactionCoordinator;
//! use strata_compaction::meta::memory::InMemoryMetadataStore;
//! use strata_compaction::plan::{CompactionPlan, CompactionSignal, CompactionType};
//! use strata_compaction::sessions::memory::InMemoryWorkerSessions;
//! use strata_compaction::tso::memory::ManualTimestampAllocator;
//! use strata_core::id::{CollectionId, NodeId, PartitionId, PlanId, SignalId};
//!
//! #[tokio::main]
//! async fn main() -> strata_compaction::error::Result<()> {
//!     let channels = Arc::new(InMemoryChannelRegistry::new());
//!     channels.watch("by-dev-ch1", NodeId::new(1));
//!
//!     let (flush_tx, _flush_rx) = mpsc::unbounded_channel();
//!     let coordinator = CompactionCoordinator::new(
//!         CompactionConfig::default(),
//!         Arc::new(InMemoryWorkerSessions::new()),
//!         channels,
//!         Arc::new(InMemoryMetadataStore::new()),
//!         Arc::new(ManualTimestampAllocator::new()),
//!         flush_tx,
//!     );
//!     coordinator.start();
//!
//!     let signal = CompactionSignal::new(
//!         SignalId::new(1),
//!         CollectionId::new(1),
//!         PartitionId::new(1),
//!         "by-dev-ch1",
//!     );
//!     let plan = CompactionPlan::new(PlanId::new(10), "by-dev-ch1", CompactionType::Merge, 60);
//!     coordinator.submit(signal, plan).await?;
//!
//!     coordinator.stop().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod admission;
pub mod channels;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod meta;
pub mod metrics;
pub mod plan;
pub mod sessions;
pub mod task;
pub mod tso;

pub use config::CompactionConfig;
pub use coordinator::CompactionCoordinator;
pub use error::{Error, Result};
pub use plan::{CompactionPlan, CompactionResult, CompactionSignal, CompactionType};
pub use task::{CompactionTask, TaskState};
