//! # strata-core
//!
//! Shared kernel for the Strata columnar data store.
//!
//! This crate holds the vocabulary types every Strata component speaks:
//!
//! - **Typed identifiers**: allocator-issued ids that cannot be mixed up at
//!   compile time ([`PlanId`], [`SegmentId`], [`NodeId`], ...)
//! - **Logical timestamps**: hybrid timestamps issued by the cluster's
//!   timestamp oracle, with physical milliseconds recoverable from the high
//!   bits ([`timestamp`])
//! - **Observability bootstrap**: structured logging initialization shared by
//!   every service binary ([`observability`])

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;
pub mod timestamp;

pub use error::{Error, Result};
pub use id::{CollectionId, FieldId, NodeId, PartitionId, PlanId, SegmentId, SignalId};
pub use timestamp::Timestamp;
