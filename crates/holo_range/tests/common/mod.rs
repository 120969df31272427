//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use holo_range::clock::ManualClock;
use holo_range::keys::{KEY_META_MAX, KEY_META_PREFIX};
use holo_range::kv::{KvEngine, MemEngine};
use holo_range::{Db, LocalSender, LocalSenderConfig, RangeDescriptor, Store, StoreIdent};

/// One bootstrapped store wired to a local sender and a client.
pub struct TestNode {
    pub engine: Arc<dyn KvEngine>,
    pub store: Arc<Store>,
    pub sender: Arc<LocalSender>,
    pub db: Db,
}

impl TestNode {
    /// In-memory store hosting `[KEY_MIN, KEY_MAX)` as range 1.
    pub fn bootstrapped() -> Self {
        Self::bootstrapped_with(LocalSenderConfig::default())
    }

    pub fn bootstrapped_with(cfg: LocalSenderConfig) -> Self {
        let engine: Arc<dyn KvEngine> = Arc::new(MemEngine::new());
        let store = Arc::new(Store::new(ident(), engine.clone()));
        store.bootstrap_range().expect("bootstrap range");
        Self::wire(engine, store, cfg)
    }

    pub fn wire(engine: Arc<dyn KvEngine>, store: Arc<Store>, cfg: LocalSenderConfig) -> Self {
        let sender = Arc::new(LocalSender::with_config(cfg));
        sender.add_store(store.clone());
        let db = Db::new(sender.clone(), Arc::new(ManualClock::new(1_000)));
        Self {
            engine,
            store,
            sender,
            db,
        }
    }
}

pub fn ident() -> StoreIdent {
    StoreIdent {
        node_id: 1,
        store_id: 1,
    }
}

/// Scan the addressing span straight from the engine.
pub fn meta_records(engine: &dyn KvEngine) -> BTreeMap<Vec<u8>, RangeDescriptor> {
    engine
        .scan(KEY_META_PREFIX, KEY_META_MAX, 0)
        .expect("scan meta span")
        .into_iter()
        .map(|kv| {
            let desc = RangeDescriptor::decode(&kv.value).expect("decode descriptor");
            (kv.key, desc)
        })
        .collect()
}

/// Build a per-test data directory under the system temp dir.
pub fn test_dir(name: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    std::env::temp_dir()
        .join("holo_range_tests")
        .join(format!("{name}-{pid}-{ts}"))
}

/// Best-effort cleanup of a test directory.
pub fn cleanup_dir(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}
