//! In-memory view of the two-level addressing index.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::addressing::{addressing_keys, MetaOp};
use crate::descriptor::RangeDescriptor;
use crate::error::{Error, Result};
use crate::keys::{
    fmt_key, is_meta2_key, meta1_key_max, meta2_key, range_meta_key, KEY_MAX, KEY_META1_PREFIX,
    KEY_META2_PREFIX, KEY_META_MAX, KEY_META_PREFIX, KEY_MIN,
};
use crate::kv::KvEngine;

/// Addressing records keyed by their raw addressing key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressingIndex {
    records: BTreeMap<Vec<u8>, RangeDescriptor>,
}

impl AddressingIndex {
    /// Read every record in `[KEY_META_PREFIX, KEY_META_MAX)` from `engine`.
    pub fn load(engine: &dyn KvEngine) -> Result<Self> {
        let rows = engine.scan(KEY_META_PREFIX, KEY_META_MAX, 0)?;
        let mut records = BTreeMap::new();
        for row in rows {
            let desc = RangeDescriptor::decode(&row.value)?;
            records.insert(row.key, desc);
        }
        Ok(Self { records })
    }

    /// Build an index from raw `(addressing key, descriptor)` pairs.
    pub fn from_records(records: impl IntoIterator<Item = (Vec<u8>, RangeDescriptor)>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    /// Replay operations in order; the last write to a key wins.
    pub fn apply(&mut self, ops: &[MetaOp]) {
        for op in ops {
            match op {
                MetaOp::Put { key, desc } => {
                    self.records.insert(key.clone(), desc.clone());
                }
                MetaOp::Delete { key } => {
                    self.records.remove(key);
                }
            }
        }
    }

    /// Records in addressing-key order.
    pub fn records(&self) -> impl Iterator<Item = (&Vec<u8>, &RangeDescriptor)> {
        self.records.iter()
    }

    /// The descriptor stored at exactly `key`.
    pub fn get(&self, key: &[u8]) -> Option<&RangeDescriptor> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resolve the descriptor of the range containing `key`.
    ///
    /// Ordinary keys are addressed by meta2 records, meta2 keys by meta1
    /// records. Keys below meta2 (system keys and meta1 itself) belong to the
    /// first range, which is addressed from meta1 as well: either by a record
    /// of its own when it ends inside meta2, or by the meta1 sentinel. Meta2
    /// keys at or past `meta2 + KEY_MAX` live in the range the sentinel names.
    pub fn lookup(&self, key: &[u8]) -> Option<&RangeDescriptor> {
        let (level, from) = if is_meta2_key(key) {
            let target = range_meta_key(key);
            let sentinel = meta1_key_max();
            if target >= sentinel {
                (KEY_META1_PREFIX, Bound::Included(sentinel))
            } else {
                (KEY_META1_PREFIX, Bound::Excluded(target))
            }
        } else if key < KEY_META2_PREFIX {
            (KEY_META1_PREFIX, Bound::Included(KEY_META1_PREFIX.to_vec()))
        } else {
            (KEY_META2_PREFIX, Bound::Excluded(meta2_key(key)))
        };
        let (record_key, desc) = self
            .records
            .range::<Vec<u8>, _>((from, Bound::Unbounded))
            .next()?;
        if !record_key.starts_with(level) {
            return None;
        }
        desc.contains_key(key).then_some(desc)
    }

    /// Check that the index addresses every key exactly once.
    ///
    /// Records other than the meta1 sentinel, taken in key order, must chain
    /// `KEY_MIN` to `KEY_MAX` without gaps or overlaps, and each one must sit at
    /// a key derived from its own descriptor.
    pub fn verify(&self) -> Result<()> {
        let sentinel_key = meta1_key_max();
        let Some(sentinel) = self.records.get(&sentinel_key) else {
            return Err(Error::AddressingInconsistent(
                "meta1 sentinel record is missing".to_string(),
            ));
        };
        if !sentinel.contains_key(&meta2_key(KEY_MAX)) {
            return Err(Error::AddressingInconsistent(format!(
                "meta1 sentinel points at {sentinel}, which does not hold the end of meta2"
            )));
        }

        let mut next_start: &[u8] = KEY_MIN;
        for (key, desc) in &self.records {
            let derived = addressing_keys(desc)
                .map_err(|err| Error::AddressingInconsistent(format!("{}: {err}", fmt_key(key))))?;
            if !derived.iter().any(|k| k == key) {
                return Err(Error::AddressingInconsistent(format!(
                    "record {} does not address its descriptor {desc}",
                    fmt_key(key)
                )));
            }
            if *key == sentinel_key {
                continue;
            }
            if desc.start_key != next_start {
                return Err(Error::AddressingInconsistent(format!(
                    "record {} holds {desc}, expected a range starting at {}",
                    fmt_key(key),
                    fmt_key(next_start)
                )));
            }
            next_start = &desc.end_key;
        }
        if next_start != KEY_MAX {
            return Err(Error::AddressingInconsistent(format!(
                "addressed ranges stop at {}",
                fmt_key(next_start)
            )));
        }
        Ok(())
    }
}
