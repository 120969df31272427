//! Storage engines backing a store: an in-memory map and a fjall keyspace.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::{Arc, RwLock};

use fjall::{Keyspace, PartitionCreateOptions, PersistMode};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One key-value row returned by scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// One write inside an atomic engine batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl WriteOp {
    /// Key written by this op.
    pub fn key(&self) -> &[u8] {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// Key-value substrate hosting range data and the addressing index.
///
/// `scan` must observe a consistent snapshot: writes racing with a scan are
/// either fully visible or not at all.
pub trait KvEngine: Send + Sync + 'static {
    /// Current value of `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    /// Rows in `[start, end)` in key order; `max_results == 0` means unlimited.
    fn scan(&self, start: &[u8], end: &[u8], max_results: usize) -> Result<Vec<KeyValue>>;
    /// Apply `ops` in order, atomically: all of them or none.
    fn write_batch(&self, ops: &[WriteOp]) -> Result<()>;
}

/// In-memory engine.
#[derive(Default)]
pub struct MemEngine {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemEngine {
    /// Empty engine.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvEngine for MemEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let guard = self.inner.read().unwrap();
        Ok(guard.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut guard = self.inner.write().unwrap();
        guard.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut guard = self.inner.write().unwrap();
        guard.remove(key);
        Ok(())
    }

    fn scan(&self, start: &[u8], end: &[u8], max_results: usize) -> Result<Vec<KeyValue>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let guard = self.inner.read().unwrap();
        let limit = if max_results == 0 { usize::MAX } else { max_results };
        let rows = guard
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .take(limit)
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        Ok(rows)
    }

    fn write_batch(&self, ops: &[WriteOp]) -> Result<()> {
        let mut guard = self.inner.write().unwrap();
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    guard.insert(key.clone(), value.clone());
                }
                WriteOp::Delete { key } => {
                    guard.remove(key);
                }
            }
        }
        Ok(())
    }
}

/// Fjall-backed engine storing rows in a single partition.
pub struct FjallEngine {
    keyspace: Arc<Keyspace>,
    data: fjall::PartitionHandle,
}

impl FjallEngine {
    /// Open the data partition inside an existing keyspace.
    pub fn open(keyspace: Arc<Keyspace>) -> Result<Self> {
        let data = keyspace.open_partition("range_data", PartitionCreateOptions::default())?;
        Ok(Self { keyspace, data })
    }

    /// Open (or create) a keyspace rooted at `dir`.
    pub fn open_path(dir: impl AsRef<Path>) -> Result<Self> {
        let keyspace = fjall::Config::new(dir.as_ref()).open()?;
        Self::open(Arc::new(keyspace))
    }

    /// Flush and fsync the journal.
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

impl Drop for FjallEngine {
    fn drop(&mut self) {
        if let Err(err) = self.persist() {
            tracing::warn!(error = %err, "failed to persist keyspace on close");
        }
    }
}

impl KvEngine for FjallEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.insert(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.remove(key)?;
        Ok(())
    }

    fn scan(&self, start: &[u8], end: &[u8], max_results: usize) -> Result<Vec<KeyValue>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let limit = if max_results == 0 { usize::MAX } else { max_results };
        // Partition iterators read from an implicit snapshot.
        let mut rows = Vec::new();
        for item in self.data.range(start.to_vec()..end.to_vec()) {
            if rows.len() >= limit {
                break;
            }
            let (key, value) = item?;
            rows.push(KeyValue {
                key: key.to_vec(),
                value: value.to_vec(),
            });
        }
        Ok(rows)
    }

    fn write_batch(&self, ops: &[WriteOp]) -> Result<()> {
        let mut batch = self.keyspace.batch();
        for op in ops {
            match op {
                WriteOp::Put { key, value } => batch.insert(&self.data, key.clone(), value.clone()),
                WriteOp::Delete { key } => batch.remove(&self.data, key.clone()),
            }
        }
        batch.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "holo_range_{name}_{}_{}",
            std::process::id(),
            nanos
        ))
    }

    fn exercise_engine(engine: &dyn KvEngine) {
        engine.put(b"b", b"2").expect("put b");
        engine.put(b"a", b"1").expect("put a");
        engine.put(b"c", b"3").expect("put c");
        assert_eq!(engine.get(b"b").expect("get b"), Some(b"2".to_vec()));
        assert_eq!(engine.get(b"zz").expect("get missing"), None);

        let rows = engine.scan(b"a", b"c", 0).expect("scan");
        let keys = rows.iter().map(|kv| kv.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

        let limited = engine.scan(b"a", b"z", 2).expect("limited scan");
        assert_eq!(limited.len(), 2);
        assert!(engine.scan(b"c", b"a", 0).expect("inverted scan").is_empty());

        engine
            .write_batch(&[
                WriteOp::Delete { key: b"a".to_vec() },
                WriteOp::Put {
                    key: b"d".to_vec(),
                    value: b"4".to_vec(),
                },
                WriteOp::Put {
                    key: b"d".to_vec(),
                    value: b"5".to_vec(),
                },
            ])
            .expect("write batch");
        assert_eq!(engine.get(b"a").expect("get a"), None);
        assert_eq!(engine.get(b"d").expect("get d"), Some(b"5".to_vec()));

        engine.delete(b"b").expect("delete b");
        let rest = engine.scan(b"", b"\xff\xff", 0).expect("full scan");
        let keys = rest.iter().map(|kv| kv.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys, vec![b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn mem_engine_get_put_scan_batch() {
        exercise_engine(&MemEngine::new());
    }

    #[test]
    fn fjall_engine_get_put_scan_batch() {
        let dir = temp_dir("fjall_engine");
        std::fs::create_dir_all(&dir).expect("create temp dir");
        {
            let engine = FjallEngine::open_path(&dir).expect("open fjall engine");
            exercise_engine(&engine);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
