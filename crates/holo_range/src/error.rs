//! Error taxonomy shared by routing, execution and addressing.
//!
//! Errors are cloneable and serializable because they travel inside reply
//! headers, not only through `Result`.

use serde::{Deserialize, Serialize};

use crate::descriptor::{RangeDescriptor, RangeId, StoreId};
use crate::keys::fmt_key;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    /// The requested span is not owned by the targeted (or any local) range.
    #[error(
        "key range {}-{} outside of bounds of range {}",
        fmt_key(.start_key),
        fmt_key(.end_key),
        fmt_range(.range)
    )]
    RangeKeyMismatch {
        start_key: Vec<u8>,
        end_key: Vec<u8>,
        range: Option<RangeDescriptor>,
    },

    #[error("store {0} not found")]
    StoreNotFound(StoreId),

    #[error("range {range_id} not found on store {store_id}")]
    RangeNotFound { store_id: StoreId, range_id: RangeId },

    #[error("range bounds fall on a reserved addressing key: {desc}")]
    InvalidSplit { desc: RangeDescriptor },

    #[error(
        "ranges are not adjacent: left ends at {} but right starts at {}",
        fmt_key(.left_end),
        fmt_key(.right_start)
    )]
    NonAdjacentRanges {
        left_end: Vec<u8>,
        right_start: Vec<u8>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("value at key {} is not an integer", fmt_key(.key))]
    NotAnInteger { key: Vec<u8> },

    #[error("conditional put failed at key {}: actual value {:?}", fmt_key(.key), .actual)]
    ConditionFailed {
        key: Vec<u8>,
        actual: Option<Vec<u8>>,
    },

    #[error("addressing index inconsistent: {0}")]
    AddressingInconsistent(String),

    #[error("descriptor codec: {0}")]
    Codec(String),

    #[error("storage engine: {0}")]
    Engine(String),
}

fn fmt_range(range: &Option<RangeDescriptor>) -> String {
    match range {
        Some(desc) => desc.to_string(),
        None => "<none>".to_string(),
    }
}

impl Error {
    pub fn range_key_mismatch(start: &[u8], end: &[u8], range: Option<RangeDescriptor>) -> Self {
        Self::RangeKeyMismatch {
            start_key: start.to_vec(),
            end_key: end.to_vec(),
            range,
        }
    }

    /// Only a routing mismatch can be absorbed by re-resolving locally.
    pub fn is_range_key_mismatch(&self) -> bool {
        matches!(self, Self::RangeKeyMismatch { .. })
    }
}

impl From<fjall::Error> for Error {
    fn from(err: fjall::Error) -> Self {
        Self::Engine(err.to_string())
    }
}
