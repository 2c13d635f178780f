//! Strongly-typed identifiers for Strata entities.
//!
//! All identifiers in Strata are:
//! - **Strongly typed**: a [`PlanId`] cannot be passed where a [`SegmentId`]
//!   is expected, even though both wrap the same integer representation
//! - **Allocator-issued**: raw values come from the cluster's central id
//!   allocator; components never mint ids locally
//!
//! # Example
//!
//! ```rust
//! use strata_core::id::{PlanId, SegmentId};
//!
//! let plan = PlanId::new(10);
//! let segment = SegmentId::new(100);
//!
//! // Ids are different types - this won't compile:
//! // let wrong: PlanId = segment;
//! assert_eq!(plan.as_i64(), 10);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw allocator-issued value.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw integer value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                s.parse::<i64>().map(Self).map_err(|e| Error::InvalidId {
                    message: format!(
                        "invalid {} '{s}': {e}",
                        stringify!($name),
                    ),
                })
            }
        }
    };
}

define_id! {
    /// A unique identifier for a compaction plan.
    PlanId
}

define_id! {
    /// A unique identifier for a segment.
    ///
    /// Segments are the unit of columnar storage; compaction merges several
    /// segments on a channel into one.
    SegmentId
}

define_id! {
    /// A unique identifier for a storage worker node.
    NodeId
}

define_id! {
    /// A unique identifier for a compaction trigger signal.
    ///
    /// Plans produced from the same trigger event share one signal id. The
    /// zero value is reserved as a wildcard in signal queries.
    SignalId
}

define_id! {
    /// A unique identifier for a collection.
    CollectionId
}

define_id! {
    /// A unique identifier for a partition within a collection.
    PartitionId
}

define_id! {
    /// A unique identifier for a schema field.
    FieldId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let plan = PlanId::new(7);
        let segment = SegmentId::new(7);
        assert_eq!(plan.as_i64(), segment.as_i64());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        let node = NodeId::new(42);
        let parsed: NodeId = node.to_string().parse().expect("parse");
        assert_eq!(node, parsed);
    }

    #[test]
    fn from_str_rejects_garbage() {
        let result: Result<PlanId> = "not-a-number".parse();
        assert!(result.is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let segment = SegmentId::new(300);
        let json = serde_json::to_string(&segment).expect("serialize");
        assert_eq!(json, "300");

        let parsed: SegmentId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, segment);
    }

    #[test]
    fn signal_zero_is_default() {
        assert_eq!(SignalId::default(), SignalId::new(0));
    }
}
