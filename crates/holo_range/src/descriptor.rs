//! Range descriptors and replica placement.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys::{fmt_key, key_in_range};

/// Logical node identifier. `0` is unset.
pub type NodeId = u64;
/// Store identifier, unique within the cluster. `0` is unset.
pub type StoreId = u64;
/// Range identifier. `0` is unset.
pub type RangeId = u64;

/// Identity of a store and the node hosting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreIdent {
    pub node_id: NodeId,
    pub store_id: StoreId,
}

/// One copy of a range, located on a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Replica {
    pub node_id: NodeId,
    pub store_id: StoreId,
}

impl Replica {
    /// Zero store id means no replica was chosen.
    pub fn is_unset(&self) -> bool {
        self.store_id == 0
    }
}

impl From<StoreIdent> for Replica {
    fn from(ident: StoreIdent) -> Self {
        Self {
            node_id: ident.node_id,
            store_id: ident.store_id,
        }
    }
}

/// Range descriptor. Key spans are lexicographic and end-exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub range_id: RangeId,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    #[serde(default)]
    pub replicas: Vec<Replica>,
}

impl RangeDescriptor {
    /// Descriptor for `[start_key, end_key)`.
    pub fn new(range_id: RangeId, start_key: &[u8], end_key: &[u8], replicas: Vec<Replica>) -> Self {
        Self {
            range_id,
            start_key: start_key.to_vec(),
            end_key: end_key.to_vec(),
            replicas,
        }
    }

    /// True when `key` falls in `[start_key, end_key)`.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key_in_range(key, &self.start_key, &self.end_key)
    }

    /// True when the span `[start, end)` fits inside this range.
    ///
    /// An empty `end` addresses the single key `start`.
    pub fn contains_key_range(&self, start: &[u8], end: &[u8]) -> bool {
        if end.is_empty() {
            return self.contains_key(start);
        }
        if end < start {
            return false;
        }
        start >= self.start_key.as_slice() && end <= self.end_key.as_slice()
    }

    /// This range's replica on `store_id`, if any.
    pub fn find_replica(&self, store_id: StoreId) -> Option<&Replica> {
        self.replicas.iter().find(|r| r.store_id == store_id)
    }

    /// Serialize for storage as an addressing-index value.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| Error::Codec(err.to_string()))
    }

    /// Inverse of `encode`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|err| Error::Codec(err.to_string()))
    }
}

impl std::fmt::Display for RangeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "r{}:[{}, {})",
            self.range_id,
            fmt_key(&self.start_key),
            fmt_key(&self.end_key)
        )
    }
}
