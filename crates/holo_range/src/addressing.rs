//! Addressing index updates for range splits and merges.
//!
//! Every range is reachable through exactly one addressing path:
//! - a range ending in ordinary keyspace has a meta2 record at `meta2 + end_key`;
//! - a range ending inside meta2 holds meta2 records itself and is addressed
//!   by a meta1 record at `range_meta_key(end_key)`;
//! - whichever range holds the tail of meta2 (`meta2 + KEY_MAX`) is also
//!   addressed by the meta1 sentinel at `meta1 + KEY_MAX`.
//!
//! Nothing below meta2 is ever split: system keys, the local span and meta1
//! all stay in the first range, so no range may end there. Likewise the meta2
//! tail from `meta2 + KEY_MAX` on stays with the sentinel's range.
//!
//! The functions here are pure: they compute the ordered put/delete list and
//! leave committing it to the caller's transactional client. Later operations
//! on the same key supersede earlier ones.

use crate::api::Call;
use crate::descriptor::RangeDescriptor;
use crate::error::{Error, Result};
use crate::keys::{
    is_meta2_key, is_reserved_split_key, meta1_key_max, meta2_key, range_meta_key, KEY_MAX,
    KEY_META1_PREFIX,
};
use crate::kv::WriteOp;

/// One addressing-index mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaOp {
    Put { key: Vec<u8>, desc: RangeDescriptor },
    Delete { key: Vec<u8> },
}

impl MetaOp {
    /// Addressing key this op touches.
    pub fn key(&self) -> &[u8] {
        match self {
            MetaOp::Put { key, .. } | MetaOp::Delete { key } => key,
        }
    }

    /// Encode as a routed KV command.
    pub fn into_call(self) -> Result<Call> {
        match self {
            MetaOp::Put { key, desc } => Ok(Call::put(&key, &desc.encode()?)),
            MetaOp::Delete { key } => Ok(Call::delete(&key)),
        }
    }

    /// Encode as a raw engine write, bypassing routing.
    pub fn into_write_op(self) -> Result<WriteOp> {
        match self {
            MetaOp::Put { key, desc } => Ok(WriteOp::Put {
                key,
                value: desc.encode()?,
            }),
            MetaOp::Delete { key } => Ok(WriteOp::Delete { key }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaAction {
    Put,
    Delete,
}

/// Addressing keys that must point at `desc`, in write order.
///
/// A descriptor bounded at a reserved split key is rejected, except one
/// starting exactly at the meta1 prefix.
pub fn addressing_keys(desc: &RangeDescriptor) -> Result<Vec<Vec<u8>>> {
    let bad_start = is_reserved_split_key(&desc.start_key) && desc.start_key != KEY_META1_PREFIX;
    if is_reserved_split_key(&desc.end_key) || bad_start {
        return Err(Error::InvalidSplit { desc: desc.clone() });
    }

    if is_meta2_key(&desc.end_key) {
        return Ok(vec![range_meta_key(&desc.end_key)]);
    }

    let mut keys = vec![meta2_key(&desc.end_key)];
    if desc.contains_key(&meta2_key(KEY_MAX)) {
        keys.push(meta1_key_max());
    }
    Ok(keys)
}

/// Append one op per addressing key of `desc`.
fn range_addressing(ops: &mut Vec<MetaOp>, desc: &RangeDescriptor, action: MetaAction) -> Result<()> {
    for key in addressing_keys(desc)? {
        ops.push(match action {
            MetaAction::Put => MetaOp::Put {
                key,
                desc: desc.clone(),
            },
            MetaAction::Delete => MetaOp::Delete { key },
        });
    }
    Ok(())
}

/// `left` must end where `right` starts.
fn ensure_adjacent(left: &RangeDescriptor, right: &RangeDescriptor) -> Result<()> {
    if left.end_key != right.start_key {
        return Err(Error::NonAdjacentRanges {
            left_end: left.end_key.clone(),
            right_start: right.start_key.clone(),
        });
    }
    Ok(())
}

/// Records for a freshly bootstrapped range.
pub fn bootstrap_range_addressing(desc: &RangeDescriptor) -> Result<Vec<MetaOp>> {
    let mut ops = Vec::new();
    range_addressing(&mut ops, desc, MetaAction::Put)?;
    Ok(ops)
}

/// Create (or overwrite) the records for both halves of a split.
///
/// The parent's record at `right.end_key` is overwritten by `right`'s, so no
/// delete is needed. Returns no operations when either half is illegal.
pub fn split_range_addressing(left: &RangeDescriptor, right: &RangeDescriptor) -> Result<Vec<MetaOp>> {
    ensure_adjacent(left, right)?;
    let mut ops = Vec::new();
    range_addressing(&mut ops, left, MetaAction::Put)?;
    range_addressing(&mut ops, right, MetaAction::Put)?;
    Ok(ops)
}

/// Remove the records subsumed by a merge and write the merged range's.
///
/// `left` is the left range before merging; `merged` spans from `left`'s start
/// to the right range's end. Deletes come first so a key shared by both sets
/// (for example the meta1 sentinel) ends up pointing at `merged`.
pub fn merge_range_addressing(left: &RangeDescriptor, merged: &RangeDescriptor) -> Result<Vec<MetaOp>> {
    if merged.start_key != left.start_key || merged.end_key < left.end_key {
        return Err(Error::InvalidRequest(format!(
            "merged range {merged} does not extend left range {left}"
        )));
    }
    let mut ops = Vec::new();
    range_addressing(&mut ops, left, MetaAction::Delete)?;
    range_addressing(&mut ops, merged, MetaAction::Put)?;
    Ok(ops)
}

/// Descriptor produced by merging adjacent `left` and `right`.
///
/// The left range survives: it keeps its id and replica set.
pub fn merged_descriptor(left: &RangeDescriptor, right: &RangeDescriptor) -> Result<RangeDescriptor> {
    ensure_adjacent(left, right)?;
    Ok(RangeDescriptor {
        end_key: right.end_key.clone(),
        ..left.clone()
    })
}

/// Merge adjacent `left` and `right`, returning the merged descriptor and the
/// addressing operations.
pub fn merge_adjacent(
    left: &RangeDescriptor,
    right: &RangeDescriptor,
) -> Result<(RangeDescriptor, Vec<MetaOp>)> {
    let merged = merged_descriptor(left, right)?;
    let ops = merge_range_addressing(left, &merged)?;
    Ok((merged, ops))
}

/// Turn operations into individual calls, preserving order.
pub fn addressing_calls(ops: Vec<MetaOp>) -> Result<Vec<Call>> {
    ops.into_iter().map(MetaOp::into_call).collect()
}

/// Pack operations into one atomic batch call, preserving order.
pub fn addressing_batch(ops: Vec<MetaOp>) -> Result<Call> {
    let writes = ops
        .into_iter()
        .map(MetaOp::into_write_op)
        .collect::<Result<Vec<_>>>()?;
    Ok(Call::batch(writes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Request;
    use crate::keys::{
        meta1_key, KEY_LOCAL_PREFIX, KEY_META2_PREFIX, KEY_META_MAX, KEY_META_PREFIX, KEY_MIN, KEY_SYSTEM_PREFIX,
    };

    fn desc(range_id: u64, start: &[u8], end: &[u8]) -> RangeDescriptor {
        RangeDescriptor::new(range_id, start, end, Vec::new())
    }

    fn keys(ops: &[MetaOp]) -> Vec<Vec<u8>> {
        ops.iter().map(|op| op.key().to_vec()).collect()
    }

    #[test]
    fn bootstrap_writes_meta2_and_meta1_sentinels() {
        let ops = bootstrap_range_addressing(&desc(1, KEY_MIN, KEY_MAX)).expect("bootstrap ops");
        assert_eq!(keys(&ops), vec![meta2_key(KEY_MAX), meta1_key_max()]);
    }

    #[test]
    fn ordinary_split_writes_meta2_only() {
        let left = desc(1, b"a", b"m");
        let right = desc(2, b"m", b"z");
        let ops = split_range_addressing(&left, &right).expect("split ops");
        assert_eq!(keys(&ops), vec![meta2_key(b"m"), meta2_key(b"z")]);
        assert!(ops.iter().all(|op| matches!(op, MetaOp::Put { .. })));
        match &ops[1] {
            MetaOp::Put { desc, .. } => assert_eq!(desc, &right),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn split_of_first_range_moves_meta1_sentinel_to_left() {
        let left = desc(1, KEY_MIN, b"a");
        let right = desc(2, b"a", KEY_MAX);
        let ops = split_range_addressing(&left, &right).expect("split ops");
        assert_eq!(
            keys(&ops),
            vec![meta2_key(b"a"), meta1_key_max(), meta2_key(KEY_MAX)]
        );
    }

    #[test]
    fn split_inside_meta2_writes_meta1_record() {
        let split = range_meta_key(b"m");
        let left = desc(1, KEY_MIN, &split);
        let right = desc(2, &split, b"a");
        let ops = split_range_addressing(&left, &right).expect("split ops");
        assert_eq!(
            keys(&ops),
            vec![meta1_key(b"m"), meta2_key(b"a"), meta1_key_max()]
        );
    }

    #[test]
    fn split_at_meta1_key_is_rejected_without_ops() {
        let left = desc(1, KEY_MIN, &meta1_key(b"a"));
        let right = desc(2, &meta1_key(b"a"), KEY_MAX);
        match split_range_addressing(&left, &right) {
            Err(Error::InvalidSplit { desc }) => assert_eq!(desc, left),
            other => panic!("expected invalid split, got {other:?}"),
        }
    }

    #[test]
    fn split_below_meta2_is_rejected() {
        let splits: [&[u8]; 5] = [
            KEY_SYSTEM_PREFIX,
            KEY_LOCAL_PREFIX,
            KEY_META_PREFIX,
            b"\x00meta0",
            KEY_META1_PREFIX,
        ];
        for split in splits {
            let left = desc(1, KEY_MIN, split);
            let right = desc(2, split, KEY_MAX);
            assert!(
                matches!(
                    split_range_addressing(&left, &right),
                    Err(Error::InvalidSplit { .. })
                ),
                "split at {split:?} must be rejected"
            );
        }
    }

    #[test]
    fn split_in_meta2_tail_is_rejected() {
        for split in [meta2_key(KEY_MAX), meta2_key(b"\xff\xff\x00")] {
            let left = desc(1, KEY_MIN, &split);
            let right = desc(2, &split, KEY_MAX);
            assert!(matches!(
                split_range_addressing(&left, &right),
                Err(Error::InvalidSplit { .. })
            ));
        }
        let left = desc(1, KEY_MIN, &meta2_key(b"\xff\xfe"));
        let right = desc(2, &meta2_key(b"\xff\xfe"), KEY_MAX);
        let ops = split_range_addressing(&left, &right).expect("split below meta2 tail");
        assert_eq!(
            keys(&ops),
            vec![meta1_key(b"\xff\xfe"), meta2_key(KEY_MAX), meta1_key_max()]
        );
    }

    #[test]
    fn split_just_past_meta_span_keeps_sentinel_on_left() {
        let left = desc(1, KEY_MIN, KEY_META_MAX);
        let right = desc(2, KEY_META_MAX, KEY_MAX);
        let ops = split_range_addressing(&left, &right).expect("split ops");
        assert_eq!(
            keys(&ops),
            vec![meta2_key(KEY_META_MAX), meta1_key_max(), meta2_key(KEY_MAX)]
        );
    }

    #[test]
    fn split_at_meta2_prefix_addresses_left_from_meta1() {
        let left = desc(1, KEY_MIN, KEY_META2_PREFIX);
        let right = desc(2, KEY_META2_PREFIX, KEY_MAX);
        let ops = split_range_addressing(&left, &right).expect("split ops");
        assert_eq!(
            keys(&ops),
            vec![meta1_key(b""), meta2_key(KEY_MAX), meta1_key_max()]
        );
    }

    #[test]
    fn range_starting_exactly_at_meta1_prefix_is_legal() {
        let d = desc(3, KEY_META1_PREFIX, b"a");
        assert!(addressing_keys(&d).is_ok());
    }

    #[test]
    fn non_adjacent_split_is_rejected() {
        let err = split_range_addressing(&desc(1, b"a", b"c"), &desc(2, b"d", b"z"))
            .expect_err("gap between halves");
        assert!(matches!(err, Error::NonAdjacentRanges { .. }));
    }

    #[test]
    fn merge_deletes_left_boundary_then_rewrites_merged() {
        let left = desc(1, b"a", b"m");
        let right = desc(2, b"m", b"z");
        let (merged, ops) = merge_adjacent(&left, &right).expect("merge ops");
        assert_eq!(merged, desc(1, b"a", b"z"));
        assert_eq!(
            ops,
            vec![
                MetaOp::Delete {
                    key: meta2_key(b"m")
                },
                MetaOp::Put {
                    key: meta2_key(b"z"),
                    desc: merged.clone()
                },
            ]
        );
    }

    #[test]
    fn merge_of_first_range_rewrites_meta1_sentinel_last() {
        let left = desc(1, KEY_MIN, b"a");
        let right = desc(2, b"a", KEY_MAX);
        let (merged, ops) = merge_adjacent(&left, &right).expect("merge ops");
        let sentinel_ops = ops
            .iter()
            .filter(|op| op.key() == meta1_key_max().as_slice())
            .collect::<Vec<_>>();
        assert_eq!(sentinel_ops.len(), 2);
        assert!(matches!(sentinel_ops[0], MetaOp::Delete { .. }));
        assert_eq!(
            sentinel_ops[1],
            &MetaOp::Put {
                key: meta1_key_max(),
                desc: merged
            }
        );
    }

    #[test]
    fn merge_rejects_descriptor_that_does_not_extend_left() {
        let left = desc(1, b"a", b"m");
        let err = merge_range_addressing(&left, &desc(1, b"b", b"z")).expect_err("bad merged");
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn ops_pack_into_one_batch_in_order() {
        let call = addressing_batch(vec![
            MetaOp::Delete {
                key: meta2_key(b"m"),
            },
            MetaOp::Put {
                key: meta2_key(b"z"),
                desc: desc(1, b"a", b"z"),
            },
        ])
        .expect("encode batch");
        assert_eq!(call.header().key, meta2_key(b"m"));
        match &call.args {
            Request::Batch(batch) => {
                let keys = batch.writes.iter().map(|w| w.key().to_vec()).collect::<Vec<_>>();
                assert_eq!(keys, vec![meta2_key(b"m"), meta2_key(b"z")]);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn ops_encode_as_put_and_delete_calls() {
        let calls = addressing_calls(vec![
            MetaOp::Delete {
                key: meta2_key(b"m"),
            },
            MetaOp::Put {
                key: meta2_key(b"z"),
                desc: desc(1, b"a", b"z"),
            },
        ])
        .expect("encode calls");
        assert!(matches!(&calls[0].args, Request::Delete(_)));
        match &calls[1].args {
            Request::Put(put) => {
                assert_eq!(put.header.key, meta2_key(b"z"));
                let decoded = RangeDescriptor::decode(&put.value).expect("decode value");
                assert_eq!(decoded, desc(1, b"a", b"z"));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }
}
