//! Persistent key-value store contract and implementations
//!
//! The chain manager takes the store as an explicit dependency, so tests
//! run against `MemoryStore` while deployments open a `SledStore`. Batched
//! writes are atomic: a crash leaves either none or all of a batch behind.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::StoreError;
use crate::types::{Hash, OutPoint};

/// One operation inside a write batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Store contract consumed by the chain manager and the UTXO index.
pub trait KvStore: Send {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Apply every operation atomically. With `sync` the batch is durable
    /// before this returns.
    fn write_batch(&mut self, ops: Vec<WriteOp>, sync: bool) -> Result<(), StoreError>;

    /// All records whose key starts with `prefix`, in key order.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

// Key layout. A single prefix byte keeps the record families in disjoint
// ranges.

const PREFIX_UTXO: u8 = b'U';
const PREFIX_BLOCK: u8 = b'B';
const PREFIX_HEIGHT: u8 = b'H';
const PREFIX_UNDO: u8 = b'X';
const PREFIX_MEMPOOL: u8 = b'M';
const PREFIX_INVALID: u8 = b'I';

/// Key of the tip pointer.
pub const TIP_KEY: &[u8] = b"T";

pub fn utxo_key(out: &OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(37);
    key.push(PREFIX_UTXO);
    key.extend_from_slice(&out.tx_hash);
    key.extend_from_slice(&out.index.to_le_bytes());
    key
}

pub fn block_key(hash: &Hash) -> Vec<u8> {
    prefixed(PREFIX_BLOCK, hash)
}

pub fn height_key(height: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(PREFIX_HEIGHT);
    key.extend_from_slice(&height.to_le_bytes());
    key
}

pub fn undo_key(hash: &Hash) -> Vec<u8> {
    prefixed(PREFIX_UNDO, hash)
}

pub fn mempool_key(hash: &Hash) -> Vec<u8> {
    prefixed(PREFIX_MEMPOOL, hash)
}

pub fn mempool_prefix() -> Vec<u8> {
    vec![PREFIX_MEMPOOL]
}

pub fn utxo_prefix() -> Vec<u8> {
    vec![PREFIX_UTXO]
}

pub fn invalid_key(hash: &Hash) -> Vec<u8> {
    prefixed(PREFIX_INVALID, hash)
}

fn prefixed(prefix: u8, hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(prefix);
    key.extend_from_slice(hash);
    key
}

/// Durable store backed by sled.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Ephemeral on-disk store, removed when dropped. For tests that want
    /// the real backend.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?.map(|value| value.to_vec()))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.db.remove(key)?;
        Ok(())
    }

    fn write_batch(&mut self, ops: Vec<WriteOp>, sync: bool) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for op in ops {
            match op {
                WriteOp::Put(key, value) => batch.insert(key, value),
                WriteOp::Delete(key) => batch.remove(key),
            }
        }
        self.db.apply_batch(batch)?;
        if sync {
            self.db.flush()?;
        }
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut records = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (key, value) = item?;
            records.push((key.to_vec(), value.to_vec()));
        }
        Ok(records)
    }
}

/// In-memory store for tests and tooling.
#[derive(Default)]
pub struct MemoryStore {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, across every key family.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.map.remove(key);
        Ok(())
    }

    fn write_batch(&mut self, ops: Vec<WriteOp>, _sync: bool) -> Result<(), StoreError> {
        for op in ops {
            match op {
                WriteOp::Put(key, value) => {
                    self.map.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    self.map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .map
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_store<S: KvStore>(mut store: S) {
        assert_eq!(store.get(b"missing").unwrap(), None);

        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));

        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);

        store
            .write_batch(
                vec![
                    WriteOp::Put(b"p1".to_vec(), b"x".to_vec()),
                    WriteOp::Put(b"p2".to_vec(), b"y".to_vec()),
                    WriteOp::Put(b"q1".to_vec(), b"z".to_vec()),
                    WriteOp::Delete(b"p2".to_vec()),
                ],
                true,
            )
            .unwrap();

        let records = store.iter_prefix(b"p").unwrap();
        assert_eq!(records, vec![(b"p1".to_vec(), b"x".to_vec())]);
    }

    #[test]
    fn test_memory_store_contract() {
        exercise_store(MemoryStore::new());
    }

    #[test]
    fn test_sled_store_contract() {
        exercise_store(SledStore::temporary().unwrap());
    }

    #[test]
    fn test_key_families_are_disjoint() {
        let hash = [7u8; 32];
        let out = OutPoint::new(hash, 0);
        let keys = [
            utxo_key(&out),
            block_key(&hash),
            undo_key(&hash),
            mempool_key(&hash),
            invalid_key(&hash),
            height_key(0),
            TIP_KEY.to_vec(),
        ];
        for (i, a) in keys.iter().enumerate() {
            for (j, b) in keys.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                    assert_ne!(a[0], b[0]);
                }
            }
        }
    }

    #[test]
    fn test_utxo_key_encodes_index() {
        let hash = [7u8; 32];
        let a = utxo_key(&OutPoint::new(hash, 0));
        let b = utxo_key(&OutPoint::new(hash, 1));
        assert_ne!(a, b);
        assert_eq!(a.len(), 37);
    }
}
