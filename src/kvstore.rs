//! Backing key/value store collaborator (spec §6.1).
//!
//! An ordered byte-to-byte store with `get`/`put`/`delete`/`iterate`, plus a
//! `rekey` hook the [crate::reindex::Reindexer] uses to replace a record's
//! key in place. This crate performs no locking of its own (spec §5); the
//! store's own `tx_begin`/`tx_commit`/`tx_cancel` are distinct from, and
//! orthogonal to, this crate's [crate::overlay::TxOverlay].

use std::{cell::RefCell, collections::BTreeMap};

use crate::{err_at, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutMode {
    /// Fail if the key already exists.
    Insert,
    /// Overwrite any existing value.
    Replace,
}

pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8], mode: PutMode) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Visit every `(key, value)` pair in byte-lexicographic key order.
    /// Stop early when `visitor` returns `Ok(false)`.
    fn iterate(&self, visitor: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>) -> Result<()>;

    /// Replace `old`'s key with `new`, keeping the value, as part of a
    /// reindex rekey pass (spec §4.8 step 4). Fails if `new` already exists.
    fn rekey(&self, old: &[u8], new: &[u8], value: &[u8]) -> Result<()>;

    fn tx_begin(&self) -> Result<()> {
        Ok(())
    }

    fn tx_commit(&self) -> Result<()> {
        Ok(())
    }

    fn tx_cancel(&self) -> Result<()> {
        Ok(())
    }
}

/// Reference `KvStore`: an ordered in-memory map, giving the
/// byte-lexicographic iteration order spec §6.1 requires without needing a
/// real disk-backed engine for tests.
#[derive(Default)]
pub struct MemKvStore {
    map: RefCell<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemKvStore {
    pub fn new() -> MemKvStore {
        MemKvStore::default()
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }
}

impl KvStore for MemKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.borrow().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8], mode: PutMode) -> Result<()> {
        let mut map = self.map.borrow_mut();
        if mode == PutMode::Insert && map.contains_key(key) {
            return err_at!(OperationsError, msg: "key already exists: {:?}", key);
        }
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.map.borrow_mut().remove(key);
        Ok(())
    }

    fn iterate(&self, visitor: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>) -> Result<()> {
        // Snapshot the keys up front: callbacks (search re-filter, reindex
        // rekey) may delete entries mid-iteration (spec §5), which would
        // otherwise invalidate a live BTreeMap iterator.
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = self
            .map
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in snapshot.iter() {
            if !visitor(k, v)? {
                break;
            }
        }
        Ok(())
    }

    fn rekey(&self, old: &[u8], new: &[u8], value: &[u8]) -> Result<()> {
        let mut map = self.map.borrow_mut();
        if old != new && map.contains_key(new) {
            return err_at!(OperationsError, msg: "rekey target already exists: {:?}", new);
        }
        map.remove(old);
        map.insert(new.to_vec(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_insert_rejects_duplicate() {
        let store = MemKvStore::new();
        store.put(b"k", b"v1", PutMode::Insert).unwrap();
        assert!(store.put(b"k", b"v2", PutMode::Insert).is_err());
        store.put(b"k", b"v2", PutMode::Replace).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn iterate_is_byte_lexicographic() {
        let store = MemKvStore::new();
        store.put(b"b", b"2", PutMode::Insert).unwrap();
        store.put(b"a", b"1", PutMode::Insert).unwrap();
        let mut seen = Vec::new();
        store
            .iterate(&mut |k, _| {
                seen.push(k.to_vec());
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn rekey_moves_value_to_new_key() {
        let store = MemKvStore::new();
        store.put(b"old", b"v", PutMode::Insert).unwrap();
        store.rekey(b"old", b"new", b"v").unwrap();
        assert_eq!(store.get(b"old").unwrap(), None);
        assert_eq!(store.get(b"new").unwrap(), Some(b"v".to_vec()));
    }
}
