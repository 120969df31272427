//! Routing of commands to stores hosted in this process.
//!
//! `LocalSender` owns the store registry. A call without a routing hint is
//! resolved by asking every registered store for a range containing its span.
//! A local split can land between that lookup and execution, so a
//! `RangeKeyMismatch` from execution clears the hint and the call is routed
//! again, up to `LocalSenderConfig::max_attempts` attempts in total. Anything
//! beyond that cheap local race is left to callers that consult the global
//! addressing index.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLock};

use crate::api::Call;
use crate::clock::Timestamp;
use crate::descriptor::{NodeId, RangeId, Replica, StoreId};
use crate::error::{Error, Result};
use crate::keys::fmt_key;
use crate::store::RangeOwner;

/// Anything that can route a call and fill in its reply.
pub trait KvSender: Send + Sync {
    /// Route `call`; failures are reported through `call.reply`.
    fn send(&self, call: &mut Call);
}

impl<T: KvSender + ?Sized> KvSender for Arc<T> {
    fn send(&self, call: &mut Call) {
        (**self).send(call)
    }
}

/// Tuning for `LocalSender`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSenderConfig {
    /// Total routing attempts per call, including the first.
    pub max_attempts: usize,
}

impl Default for LocalSenderConfig {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

/// Result of one routing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptOutcome {
    Success,
    RetryableMismatch(Error),
    Terminal(Error),
}

/// Narrows a transaction's uncertainty window for one attempt.
///
/// When the target node is already certain for the transaction,
/// `max_timestamp` is pinned to `timestamp` while the guard lives. The previous
/// bound is restored on drop; the next attempt may land on another node.
struct UncertaintyGuard<'a> {
    call: &'a mut Call,
    saved: Option<Timestamp>,
}

impl<'a> UncertaintyGuard<'a> {
    fn new(call: &'a mut Call, node_id: NodeId) -> Self {
        let mut saved = None;
        if let Some(txn) = call.header_mut().txn.as_mut() {
            if txn.certain_nodes.contains(node_id) {
                saved = Some(txn.max_timestamp);
                txn.max_timestamp = txn.timestamp;
            }
        }
        Self { call, saved }
    }
}

impl Deref for UncertaintyGuard<'_> {
    type Target = Call;

    fn deref(&self) -> &Call {
        self.call
    }
}

impl DerefMut for UncertaintyGuard<'_> {
    fn deref_mut(&mut self) -> &mut Call {
        self.call
    }
}

impl Drop for UncertaintyGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            if let Some(txn) = self.call.header_mut().txn.as_mut() {
                txn.max_timestamp = saved;
            }
        }
    }
}

/// Registry of local stores and the routing entry point for them.
pub struct LocalSender {
    stores: RwLock<HashMap<StoreId, Arc<dyn RangeOwner>>>,
    cfg: LocalSenderConfig,
}

impl Default for LocalSender {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSender {
    /// Empty registry with the default retry budget.
    pub fn new() -> Self {
        Self::with_config(LocalSenderConfig::default())
    }

    /// Empty registry; `max_attempts` is raised to at least 1.
    pub fn with_config(mut cfg: LocalSenderConfig) -> Self {
        cfg.max_attempts = cfg.max_attempts.max(1);
        Self {
            stores: RwLock::new(HashMap::new()),
            cfg,
        }
    }

    /// Effective configuration after clamping.
    pub fn config(&self) -> LocalSenderConfig {
        self.cfg
    }

    /// Number of registered stores.
    pub fn store_count(&self) -> usize {
        self.stores.read().unwrap().len()
    }

    /// True when a store with `store_id` is registered.
    pub fn has_store(&self, store_id: StoreId) -> bool {
        self.stores.read().unwrap().contains_key(&store_id)
    }

    /// Registered store by id, or `StoreNotFound`.
    pub fn get_store(&self, store_id: StoreId) -> Result<Arc<dyn RangeOwner>> {
        self.stores
            .read()
            .unwrap()
            .get(&store_id)
            .cloned()
            .ok_or(Error::StoreNotFound(store_id))
    }

    /// Register `store` under its store id.
    ///
    /// # Panics
    ///
    /// Registering the same store id twice is a configuration error and
    /// panics; the first registration stays in place.
    pub fn add_store(&self, store: Arc<dyn RangeOwner>) {
        let ident = store.ident();
        let mut stores = self.stores.write().unwrap();
        if stores.contains_key(&ident.store_id) {
            drop(stores);
            tracing::error!(
                node_id = ident.node_id,
                store_id = ident.store_id,
                "store registered twice"
            );
            panic!("cannot add store twice to local sender: {ident:?}");
        }
        stores.insert(ident.store_id, store);
        tracing::debug!(node_id = ident.node_id, store_id = ident.store_id, "added store");
    }

    /// Call `visitor` once per registered store, in no particular order,
    /// stopping at the first error.
    ///
    /// The registry stays write-locked for the whole traversal, so `visitor`
    /// must not call back into this sender.
    pub fn visit_stores<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&dyn RangeOwner) -> Result<()>,
    {
        let stores = self.stores.write().unwrap();
        for store in stores.values() {
            visitor(store.as_ref())?;
        }
        Ok(())
    }

    /// Find a registered store hosting a range that contains `[start, end)`.
    pub fn lookup_replica(&self, start: &[u8], end: &[u8]) -> Result<(RangeId, Replica)> {
        let stores = self.stores.read().unwrap();
        for store in stores.values() {
            if let Some(handle) = store.lookup_range(start, end) {
                return Ok((handle.desc.range_id, handle.replica));
            }
        }
        Err(Error::range_key_mismatch(start, end, None))
    }

    /// One attempt: resolve the hint if missing, then execute.
    fn route_once(&self, call: &mut Call) -> AttemptOutcome {
        if !call.header().has_routing_hint() {
            let header = call.header();
            match self.lookup_replica(&header.key, &header.end_key) {
                Ok((range_id, replica)) => {
                    call.header_mut().set_routing_hint(range_id, replica);
                }
                Err(err) => return AttemptOutcome::Terminal(err),
            }
        }

        let replica = call.header().replica;
        let mut call = UncertaintyGuard::new(call, replica.node_id);
        let store = match self.get_store(replica.store_id) {
            Ok(store) => store,
            Err(err) => return AttemptOutcome::Terminal(err),
        };
        match store.execute_cmd(&mut call) {
            Ok(()) => AttemptOutcome::Success,
            Err(err) if err.is_range_key_mismatch() => AttemptOutcome::RetryableMismatch(err),
            Err(err) => AttemptOutcome::Terminal(err),
        }
    }
}

impl KvSender for LocalSender {
    fn send(&self, call: &mut Call) {
        let max_attempts = self.cfg.max_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            call.clear_error();
            match self.route_once(call) {
                AttemptOutcome::Success => return,
                AttemptOutcome::Terminal(err) => {
                    tracing::debug!(
                        method = %call.method(),
                        key = %fmt_key(&call.header().key),
                        attempt,
                        error = %err,
                        "local routing failed"
                    );
                    call.set_error(err);
                    return;
                }
                AttemptOutcome::RetryableMismatch(err) => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            method = %call.method(),
                            key = %fmt_key(&call.header().key),
                            attempts = attempt,
                            error = %err,
                            "range key mismatch persisted after local retries"
                        );
                        call.set_error(err);
                        return;
                    }
                    tracing::debug!(
                        method = %call.method(),
                        key = %fmt_key(&call.header().key),
                        range_id = call.header().range_id,
                        attempt,
                        "range key mismatch, re-resolving locally"
                    );
                    call.header_mut().clear_routing_hint();
                }
            }
        }
    }
}

impl std::fmt::Debug for LocalSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSender")
            .field("stores", &self.store_count())
            .field("cfg", &self.cfg)
            .finish()
    }
}
