//! Range owner registry: the per-store view of locally hosted ranges.
//!
//! `RangeOwner` is the seam the local sender routes through. `Store` is the
//! in-process implementation: it hosts range descriptors over a `KvEngine` and
//! executes typed commands after checking that the command span still belongs
//! to the targeted range.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::addressing::bootstrap_range_addressing;
use crate::api::{Call, ClientCmdId, Request, Response};
use crate::descriptor::{RangeDescriptor, RangeId, Replica, StoreIdent};
use crate::error::{Error, Result};
use crate::index::AddressingIndex;
use crate::keys::{fmt_key, make_key, KEY_LOCAL_PREFIX, KEY_MAX, KEY_MIN};
use crate::kv::{KvEngine, WriteOp};

/// Upper bound on cached replies kept for idempotent replays.
const RESPONSE_CACHE_MAX_ENTRIES: usize = 4096;

/// Store-local key holding the next range id to hand out.
fn range_id_seq_key() -> Vec<u8> {
    make_key(&[KEY_LOCAL_PREFIX, b"range-id-seq"])
}

/// Snapshot of a hosted range handed out by lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeHandle {
    pub desc: RangeDescriptor,
    /// This store's replica of the range.
    pub replica: Replica,
}

/// Interface of a store as seen by the routing layer.
pub trait RangeOwner: Send + Sync {
    fn ident(&self) -> StoreIdent;

    /// Find a hosted range whose span contains `[start, end)`.
    ///
    /// An empty `end` addresses the single key `start`.
    fn lookup_range(&self, start: &[u8], end: &[u8]) -> Option<RangeHandle>;

    /// Execute `call` against the range named by its header.
    ///
    /// On failure the error is returned and also set on `call.reply`. A span
    /// that the named range no longer owns yields `Error::RangeKeyMismatch`.
    fn execute_cmd(&self, call: &mut Call) -> Result<()>;
}

/// In-process store hosting ranges over a key-value engine.
pub struct Store {
    ident: StoreIdent,
    engine: Arc<dyn KvEngine>,
    /// Hosted ranges keyed by end key.
    ranges: RwLock<BTreeMap<Vec<u8>, RangeHandle>>,
    /// Next id handed to the right half of a split. Persisted under
    /// `range_id_seq_key` so ids are not reused after a merge and a reopen.
    next_range_id: AtomicU64,
    response_cache: Mutex<ResponseCache>,
}

#[derive(Default)]
struct ResponseCache {
    replies: HashMap<ClientCmdId, Response>,
    order: VecDeque<ClientCmdId>,
}

impl ResponseCache {
    /// Cached reply for `cmd_id`, if it has not been evicted.
    fn get(&self, cmd_id: &ClientCmdId) -> Option<Response> {
        self.replies.get(cmd_id).cloned()
    }

    /// Remember `reply`, evicting the oldest entry past the size bound.
    fn put(&mut self, cmd_id: ClientCmdId, reply: Response) {
        if self.replies.insert(cmd_id, reply).is_none() {
            self.order.push_back(cmd_id);
        }
        if self.order.len() > RESPONSE_CACHE_MAX_ENTRIES {
            if let Some(evict) = self.order.pop_front() {
                self.replies.remove(&evict);
            }
        }
    }
}

impl Store {
    /// Empty store over `engine`; call `bootstrap_range` or use `open` to host
    /// ranges.
    pub fn new(ident: StoreIdent, engine: Arc<dyn KvEngine>) -> Self {
        Self {
            ident,
            engine,
            ranges: RwLock::new(BTreeMap::new()),
            next_range_id: AtomicU64::new(1),
            response_cache: Mutex::new(ResponseCache::default()),
        }
    }

    /// Create a store and rebuild its hosted ranges from the addressing index
    /// persisted in `engine`.
    pub fn open(ident: StoreIdent, engine: Arc<dyn KvEngine>) -> Result<Self> {
        let store = Self::new(ident, engine);
        let index = AddressingIndex::load(store.engine.as_ref())?;
        let mut seen = HashSet::new();
        for (_, desc) in index.records() {
            if desc.find_replica(ident.store_id).is_none() || !seen.insert(desc.range_id) {
                continue;
            }
            store.add_range(desc.clone())?;
        }
        if let Some(bytes) = store.engine.get(&range_id_seq_key())? {
            let next = decode_range_id(&bytes)?;
            store.next_range_id.fetch_max(next, Ordering::SeqCst);
        }
        tracing::info!(
            store_id = ident.store_id,
            ranges = store.range_count(),
            "opened store"
        );
        Ok(store)
    }

    /// Engine holding both range data and the addressing index.
    pub fn engine(&self) -> Arc<dyn KvEngine> {
        self.engine.clone()
    }

    /// Create the first range spanning the whole keyspace and write its
    /// addressing records directly to the engine.
    pub fn bootstrap_range(&self) -> Result<RangeDescriptor> {
        if self.range_count() > 0 {
            return Err(Error::InvalidRequest(format!(
                "store {} already hosts ranges",
                self.ident.store_id
            )));
        }
        let desc = RangeDescriptor::new(1, KEY_MIN, KEY_MAX, vec![Replica::from(self.ident)]);
        let ops = bootstrap_range_addressing(&desc)?;
        let writes = ops
            .into_iter()
            .map(|op| op.into_write_op())
            .collect::<Result<Vec<_>>>()?;
        self.engine.write_batch(&writes)?;
        self.add_range(desc.clone())?;
        tracing::info!(store_id = self.ident.store_id, range = %desc, "bootstrapped first range");
        Ok(desc)
    }

    /// Start hosting `desc`. Rejects spans overlapping a hosted range.
    pub fn add_range(&self, desc: RangeDescriptor) -> Result<()> {
        if desc.start_key >= desc.end_key {
            return Err(Error::InvalidRequest(format!("empty range span {desc}")));
        }
        let mut ranges = self.ranges.write().unwrap();
        if let Some(existing) = ranges.values().find(|h| {
            h.desc.range_id == desc.range_id
                || (h.desc.start_key < desc.end_key && desc.start_key < h.desc.end_key)
        }) {
            return Err(Error::InvalidRequest(format!(
                "range {desc} overlaps hosted range {}",
                existing.desc
            )));
        }
        let replica = desc
            .find_replica(self.ident.store_id)
            .copied()
            .unwrap_or_else(|| Replica::from(self.ident));
        self.next_range_id
            .fetch_max(desc.range_id.saturating_add(1), Ordering::SeqCst);
        ranges.insert(desc.end_key.clone(), RangeHandle { desc, replica });
        Ok(())
    }

    /// Stop hosting `range_id`, returning its last descriptor.
    pub fn remove_range(&self, range_id: RangeId) -> Option<RangeDescriptor> {
        let mut ranges = self.ranges.write().unwrap();
        let end_key = ranges
            .iter()
            .find(|(_, h)| h.desc.range_id == range_id)
            .map(|(k, _)| k.clone())?;
        ranges.remove(&end_key).map(|h| h.desc)
    }

    /// Snapshot of a hosted range by id.
    pub fn range(&self, range_id: RangeId) -> Option<RangeHandle> {
        let ranges = self.ranges.read().unwrap();
        ranges.values().find(|h| h.desc.range_id == range_id).cloned()
    }

    /// Number of hosted ranges.
    pub fn range_count(&self) -> usize {
        self.ranges.read().unwrap().len()
    }

    /// Hosted descriptors in key order.
    pub fn descriptors(&self) -> Vec<RangeDescriptor> {
        let ranges = self.ranges.read().unwrap();
        ranges.values().map(|h| h.desc.clone()).collect()
    }

    /// Split a hosted range at `split_key`.
    ///
    /// The left half keeps the range id; the right half gets a fresh id.
    /// Only local descriptors change; addressing records are the caller's job.
    pub fn split_range(
        &self,
        range_id: RangeId,
        split_key: &[u8],
    ) -> Result<(RangeDescriptor, RangeDescriptor)> {
        let mut ranges = self.ranges.write().unwrap();
        let Some((end_key, handle)) = ranges
            .iter()
            .find(|(_, h)| h.desc.range_id == range_id)
            .map(|(k, h)| (k.clone(), h.clone()))
        else {
            return Err(Error::RangeNotFound {
                store_id: self.ident.store_id,
                range_id,
            });
        };
        let parent = handle.desc;
        if split_key <= parent.start_key.as_slice() || split_key >= parent.end_key.as_slice() {
            return Err(Error::InvalidRequest(format!(
                "split key {} must fall strictly inside {parent}",
                fmt_key(split_key)
            )));
        }

        let right_id = self.next_range_id.fetch_add(1, Ordering::SeqCst);
        self.engine
            .put(&range_id_seq_key(), &(right_id + 1).to_be_bytes())?;
        let left = RangeDescriptor {
            end_key: split_key.to_vec(),
            ..parent.clone()
        };
        let right = RangeDescriptor {
            range_id: right_id,
            start_key: split_key.to_vec(),
            ..parent.clone()
        };

        ranges.remove(&end_key);
        ranges.insert(
            left.end_key.clone(),
            RangeHandle {
                desc: left.clone(),
                replica: handle.replica,
            },
        );
        ranges.insert(
            right.end_key.clone(),
            RangeHandle {
                desc: right.clone(),
                replica: handle.replica,
            },
        );
        tracing::info!(
            store_id = self.ident.store_id,
            parent = %parent,
            left = %left,
            right = %right,
            "split range"
        );
        Ok((left, right))
    }

    /// Merge a hosted range with its hosted right neighbour.
    ///
    /// Returns the pre-merge left descriptor and the merged descriptor, which
    /// keeps the left range id.
    pub fn merge_range(&self, left_id: RangeId) -> Result<(RangeDescriptor, RangeDescriptor)> {
        let mut ranges = self.ranges.write().unwrap();
        let Some(left) = ranges
            .values()
            .find(|h| h.desc.range_id == left_id)
            .cloned()
        else {
            return Err(Error::RangeNotFound {
                store_id: self.ident.store_id,
                range_id: left_id,
            });
        };
        let Some(right) = ranges
            .range::<[u8], _>((Bound::Excluded(left.desc.end_key.as_slice()), Bound::Unbounded))
            .next()
            .map(|(_, h)| h.clone())
        else {
            return Err(Error::InvalidRequest(format!(
                "range {} has no right neighbour on store {}",
                left.desc, self.ident.store_id
            )));
        };
        if right.desc.start_key != left.desc.end_key {
            return Err(Error::NonAdjacentRanges {
                left_end: left.desc.end_key.clone(),
                right_start: right.desc.start_key.clone(),
            });
        }

        let merged = RangeDescriptor {
            end_key: right.desc.end_key.clone(),
            ..left.desc.clone()
        };
        ranges.remove(&left.desc.end_key);
        ranges.insert(
            merged.end_key.clone(),
            RangeHandle {
                desc: merged.clone(),
                replica: left.replica,
            },
        );
        tracing::info!(
            store_id = self.ident.store_id,
            left = %left.desc,
            right = %right.desc,
            merged = %merged,
            "merged ranges"
        );
        Ok((left.desc, merged))
    }

    /// Ownership check, then reply-cache lookup, then apply.
    fn execute_inner(&self, call: &mut Call) -> Result<()> {
        let header = call.header();
        let range_id = header.range_id;
        let Some(handle) = self.range(range_id) else {
            return Err(Error::RangeNotFound {
                store_id: self.ident.store_id,
                range_id,
            });
        };
        if !handle.desc.contains_key_range(&header.key, &header.end_key) {
            return Err(Error::range_key_mismatch(
                &header.key,
                &header.end_key,
                Some(handle.desc),
            ));
        }

        let cmd_id = header.cmd_id;
        if !call.method().is_write() || cmd_id.is_empty() {
            return self.apply_call(call);
        }

        // Held across the apply so concurrent replays of one command id
        // cannot both miss.
        let mut cache = self.response_cache.lock().unwrap();
        if let Some(reply) = cache.get(&cmd_id) {
            tracing::debug!(
                store_id = self.ident.store_id,
                range_id,
                method = %call.method(),
                "replaying cached reply"
            );
            call.reply = reply;
            return call.result();
        }
        let result = self.apply_call(call);
        cache.put(cmd_id, call.reply.clone());
        result
    }

    /// Apply `call` and stamp its reply.
    fn apply_call(&self, call: &mut Call) -> Result<()> {
        let result = self.apply(&call.args, &mut call.reply);
        call.reply.header_mut().timestamp = call.header().timestamp;
        if let Err(err) = &result {
            call.set_error(err.clone());
        }
        result
    }

    /// Every batch key must belong to a range hosted here.
    fn check_batch_keys(&self, writes: &[WriteOp]) -> Result<()> {
        for write in writes {
            if self.lookup_range(write.key(), b"").is_none() {
                return Err(Error::InvalidRequest(format!(
                    "batch key {} is not hosted on store {}",
                    fmt_key(write.key()),
                    self.ident.store_id
                )));
            }
        }
        Ok(())
    }

    /// Run a command against the engine; ownership was checked by the caller.
    fn apply(&self, args: &Request, reply: &mut Response) -> Result<()> {
        match (args, reply) {
            (Request::Get(req), Response::Get(resp)) => {
                resp.value = self.engine.get(&req.header.key)?;
            }
            (Request::Put(req), Response::Put(_)) => {
                self.engine.put(&req.header.key, &req.value)?;
            }
            (Request::ConditionalPut(req), Response::ConditionalPut(_)) => {
                let actual = self.engine.get(&req.header.key)?;
                if actual != req.exp_value {
                    return Err(Error::ConditionFailed {
                        key: req.header.key.clone(),
                        actual,
                    });
                }
                self.engine.put(&req.header.key, &req.value)?;
            }
            (Request::Delete(req), Response::Delete(_)) => {
                self.engine.delete(&req.header.key)?;
            }
            (Request::Increment(req), Response::Increment(resp)) => {
                let key = &req.header.key;
                let current = match self.engine.get(key)? {
                    Some(bytes) => decode_int(key, &bytes)?,
                    None => 0,
                };
                let next = current.saturating_add(req.increment);
                self.engine.put(key, next.to_string().as_bytes())?;
                resp.new_value = next;
            }
            (Request::Batch(req), Response::Batch(_)) => {
                self.check_batch_keys(&req.writes)?;
                self.engine.write_batch(&req.writes)?;
            }
            (Request::Scan(req), Response::Scan(resp)) => {
                if req.header.end_key.is_empty() {
                    return Err(Error::InvalidRequest("scan requires an end key".to_string()));
                }
                resp.rows =
                    self.engine
                        .scan(&req.header.key, &req.header.end_key, req.max_results)?;
            }
            (args, reply) => {
                return Err(Error::InvalidRequest(format!(
                    "reply kind {} does not match request kind {}",
                    reply.method(),
                    args.method()
                )));
            }
        }
        Ok(())
    }
}

fn decode_range_id(bytes: &[u8]) -> Result<RangeId> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        Error::Engine(format!("corrupt range id sequence ({} bytes)", bytes.len()))
    })?;
    Ok(RangeId::from_be_bytes(raw))
}

/// Counters are stored as decimal text.
fn decode_int(key: &[u8], bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::NotAnInteger { key: key.to_vec() })
}

impl RangeOwner for Store {
    fn ident(&self) -> StoreIdent {
        self.ident
    }

    fn lookup_range(&self, start: &[u8], end: &[u8]) -> Option<RangeHandle> {
        let ranges = self.ranges.read().unwrap();
        // The owning range is the first one whose end key is past `start`.
        let (_, handle) = ranges
            .range::<[u8], _>((Bound::Excluded(start), Bound::Unbounded))
            .next()?;
        handle
            .desc
            .contains_key_range(start, end)
            .then(|| handle.clone())
    }

    fn execute_cmd(&self, call: &mut Call) -> Result<()> {
        let result = self.execute_inner(call);
        if let Err(err) = &result {
            call.set_error(err.clone());
        }
        result
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("ident", &self.ident)
            .field("ranges", &self.range_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{meta1_key_max, meta2_key};
    use crate::kv::MemEngine;

    fn ident() -> StoreIdent {
        StoreIdent {
            node_id: 1,
            store_id: 1,
        }
    }

    fn bootstrapped() -> Store {
        let store = Store::new(ident(), Arc::new(MemEngine::new()));
        store.bootstrap_range().expect("bootstrap range");
        store
    }

    fn routed(mut call: Call, range_id: RangeId) -> Call {
        call.header_mut()
            .set_routing_hint(range_id, Replica::from(ident()));
        call
    }

    #[test]
    fn bootstrap_writes_both_sentinel_records() {
        let store = bootstrapped();
        let engine = store.engine();
        assert!(engine.get(&meta1_key_max()).expect("read meta1").is_some());
        assert!(engine.get(&meta2_key(KEY_MAX)).expect("read meta2").is_some());
        assert!(store.bootstrap_range().is_err(), "second bootstrap must fail");
    }

    #[test]
    fn lookup_range_finds_owner_for_point_and_span() {
        let store = bootstrapped();
        store.split_range(1, b"m").expect("split at m");

        let left = store.lookup_range(b"a", b"").expect("owner of a");
        assert_eq!(left.desc.range_id, 1);
        let right = store.lookup_range(b"m", b"").expect("owner of m");
        assert_eq!(right.desc.range_id, 2);
        assert!(store.lookup_range(b"a", b"m").is_some());
        assert!(
            store.lookup_range(b"a", b"n").is_none(),
            "span crossing the split must not resolve"
        );
        assert_eq!(right.replica, Replica::from(ident()));
    }

    #[test]
    fn execute_rejects_span_outside_named_range() {
        let store = bootstrapped();
        store.split_range(1, b"m").expect("split at m");

        let mut call = routed(Call::put(b"x", b"v"), 1);
        let err = store.execute_cmd(&mut call).expect_err("x moved to right half");
        assert!(err.is_range_key_mismatch(), "unexpected error: {err}");
        assert_eq!(call.error(), Some(&err));

        let mut call = routed(Call::put(b"x", b"v"), 2);
        store.execute_cmd(&mut call).expect("right half owns x");
        assert!(call.error().is_none());
    }

    #[test]
    fn execute_unknown_range_is_not_a_mismatch() {
        let store = bootstrapped();
        let mut call = routed(Call::get(b"a"), 99);
        let err = store.execute_cmd(&mut call).expect_err("range 99 unknown");
        assert_eq!(
            err,
            Error::RangeNotFound {
                store_id: 1,
                range_id: 99
            }
        );
    }

    #[test]
    fn replayed_command_id_returns_cached_reply() {
        let store = bootstrapped();
        let cmd_id = ClientCmdId {
            wall_time: 10,
            random: 77,
        };
        let mut first = routed(Call::increment(b"counter", 5), 1);
        first.header_mut().cmd_id = cmd_id;
        store.execute_cmd(&mut first).expect("first increment");

        let mut replay = routed(Call::increment(b"counter", 5), 1);
        replay.header_mut().cmd_id = cmd_id;
        store.execute_cmd(&mut replay).expect("replayed increment");
        match &replay.reply {
            Response::Increment(resp) => assert_eq!(resp.new_value, 5),
            other => panic!("unexpected reply: {other:?}"),
        }

        let mut fresh = routed(Call::increment(b"counter", 5), 1);
        store.execute_cmd(&mut fresh).expect("fresh increment");
        match &fresh.reply {
            Response::Increment(resp) => assert_eq!(resp.new_value, 10),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn conditional_put_and_increment_errors() {
        let store = bootstrapped();
        let mut cput = routed(Call::conditional_put(b"k", b"v1", None), 1);
        store.execute_cmd(&mut cput).expect("cput on absent key");

        let mut cput = routed(Call::conditional_put(b"k", b"v2", Some(b"nope")), 1);
        match store.execute_cmd(&mut cput) {
            Err(Error::ConditionFailed { actual, .. }) => assert_eq!(actual, Some(b"v1".to_vec())),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut inc = routed(Call::increment(b"k", 1), 1);
        assert!(matches!(
            store.execute_cmd(&mut inc),
            Err(Error::NotAnInteger { .. })
        ));
    }

    #[test]
    fn scan_is_bounded_by_range() {
        let store = bootstrapped();
        for key in [b"a", b"b", b"c"] {
            let mut put = routed(Call::put(key, b"v"), 1);
            store.execute_cmd(&mut put).expect("put");
        }
        let mut scan = routed(Call::scan(b"a", b"c", 0), 1);
        store.execute_cmd(&mut scan).expect("scan");
        match &scan.reply {
            Response::Scan(resp) => assert_eq!(resp.rows.len(), 2),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn split_and_merge_restore_single_range() {
        let store = bootstrapped();
        let (left, right) = store.split_range(1, b"g").expect("split");
        assert_eq!(left.range_id, 1);
        assert_eq!(right.range_id, 2);
        assert_eq!(left.end_key, right.start_key);
        assert!(store.split_range(1, b"g").is_err(), "split on boundary");
        assert!(store.split_range(1, b"z").is_err(), "split outside range");

        let (pre, merged) = store.merge_range(1).expect("merge");
        assert_eq!(pre, left);
        assert_eq!(merged.range_id, 1);
        assert_eq!(merged.start_key, KEY_MIN.to_vec());
        assert_eq!(merged.end_key, KEY_MAX.to_vec());
        assert_eq!(store.range_count(), 1);
        assert!(store.merge_range(1).is_err(), "no right neighbour left");
    }

    #[test]
    fn concurrent_replays_apply_once() {
        let store = bootstrapped();
        let cmd_id = ClientCmdId {
            wall_time: 3,
            random: 9,
        };
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let mut call = routed(Call::increment(b"counter", 5), 1);
                    call.header_mut().cmd_id = cmd_id;
                    store.execute_cmd(&mut call).expect("increment");
                });
            }
        });
        let value = store.engine().get(b"counter").expect("read counter");
        assert_eq!(value, Some(b"5".to_vec()));
    }

    #[test]
    fn batch_writes_all_or_nothing() {
        let store = bootstrapped();
        store.split_range(1, b"m").expect("split at m");
        store.remove_range(2).expect("hand off right half");

        let mut partial = routed(
            Call::batch(vec![
                WriteOp::Put {
                    key: b"a".to_vec(),
                    value: b"1".to_vec(),
                },
                WriteOp::Put {
                    key: b"x".to_vec(),
                    value: b"2".to_vec(),
                },
            ]),
            1,
        );
        let err = store.execute_cmd(&mut partial).expect_err("x is not hosted");
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(store.engine().get(b"a").expect("read a"), None);

        let mut batch = routed(
            Call::batch(vec![
                WriteOp::Put {
                    key: b"a".to_vec(),
                    value: b"1".to_vec(),
                },
                WriteOp::Put {
                    key: b"b".to_vec(),
                    value: b"2".to_vec(),
                },
                WriteOp::Delete { key: b"a".to_vec() },
            ]),
            1,
        );
        store.execute_cmd(&mut batch).expect("hosted batch");
        assert_eq!(store.engine().get(b"a").expect("read a"), None);
        assert_eq!(store.engine().get(b"b").expect("read b"), Some(b"2".to_vec()));
    }

    #[test]
    fn range_ids_survive_merge_and_reopen() {
        let store = bootstrapped();
        let engine = store.engine();
        let (_, right) = store.split_range(1, b"g").expect("split");
        assert_eq!(right.range_id, 2);
        store.merge_range(1).expect("merge");
        drop(store);

        // Only range 1 is addressed, so hosted ids alone would hand out 2 again.
        let reopened = Store::open(ident(), engine).expect("reopen");
        assert_eq!(reopened.range_count(), 1);
        let (_, right) = reopened.split_range(1, b"g").expect("split after reopen");
        assert_eq!(right.range_id, 3);
    }

    #[test]
    fn add_range_rejects_overlap() {
        let store = bootstrapped();
        let overlapping = RangeDescriptor::new(5, b"a", b"b", vec![Replica::from(ident())]);
        assert!(store.add_range(overlapping).is_err());
        assert_eq!(store.remove_range(1).map(|d| d.range_id), Some(1));
        assert_eq!(store.range_count(), 0);
    }
}
