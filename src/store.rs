//! Loads and stores `@INDEX` records against the backing key/value store,
//! transparently redirecting through a [TxOverlay] while a transaction is
//! open (spec §4.3 "IndexStore").

use std::cell::RefCell;

use crate::{
    dnlist::DnList,
    err_at,
    keycodec::special_record_key,
    kvstore::{KvStore, PutMode},
    overlay::TxOverlay,
    record::IndexRecord,
    Result,
};

pub struct IndexStore<'a> {
    kv: &'a dyn KvStore,
    guid_mode: bool,
    overlay: RefCell<Option<TxOverlay>>,
}

impl<'a> IndexStore<'a> {
    pub fn new(kv: &'a dyn KvStore, guid_mode: bool) -> IndexStore<'a> {
        IndexStore {
            kv,
            guid_mode,
            overlay: RefCell::new(None),
        }
    }

    pub fn is_tx_open(&self) -> bool {
        self.overlay.borrow().is_some()
    }

    /// Load the `DnList` stored under `key`, consulting the overlay first
    /// (spec §4.3: "If a transaction is open and the overlay holds an entry
    /// for this key, use it"). A staged deletion reads back as an empty
    /// list, matching an absent backing-store key.
    pub fn load(&self, key: &[u8]) -> Result<DnList> {
        if let Some(overlay) = self.overlay.borrow().as_ref() {
            if let Some(staged) = overlay.get(key) {
                return Ok(staged.cloned().unwrap_or_else(|| DnList::new(self.guid_mode)));
            }
        }
        self.load_backing(key)
    }

    fn load_backing(&self, key: &[u8]) -> Result<DnList> {
        match self.kv.get(&special_record_key(key))? {
            None => Ok(DnList::new(self.guid_mode)),
            Some(bytes) => {
                let record = IndexRecord::decode(&bytes, self.guid_mode)?;
                Ok(record.ids)
            }
        }
    }

    /// Store `list` under `key`: an empty list deletes the record (spec
    /// §4.3: "store a key whose `DnList` becomes empty by deleting it
    /// instead of writing an empty record").
    pub fn store(&self, key: &[u8], list: DnList) -> Result<()> {
        if self.is_tx_open() {
            let mut overlay = self.overlay.borrow_mut();
            let overlay = overlay.as_mut().expect("checked is_tx_open above");
            if list.is_empty() {
                overlay.stage_delete(key.to_vec());
            } else {
                overlay.set(key.to_vec(), list);
            }
            return Ok(());
        }
        self.store_direct(key, list)
    }

    /// Write straight through to the backing store, bypassing any overlay.
    /// Used both for non-transactional callers and to drain a commit. `key`
    /// is the logical index DN (e.g. `@INDEX:cn:a`); it is wrapped into its
    /// physical `DN=...` storage key here, matching how a plain `@INDEXLIST`
    /// control record or any other special record would be keyed (spec §3,
    /// §6.5).
    fn store_direct(&self, key: &[u8], list: DnList) -> Result<()> {
        let physical = special_record_key(key);
        if list.is_empty() {
            self.kv.delete(&physical)
        } else {
            let record = IndexRecord::from_dnlist(list);
            self.kv.put(&physical, &record.encode(), PutMode::Replace)
        }
    }

    pub fn tx_begin(&self) -> Result<()> {
        if self.is_tx_open() {
            return err_at!(OperationsError, msg: "transaction already open");
        }
        *self.overlay.borrow_mut() = Some(TxOverlay::new());
        Ok(())
    }

    /// Flush the overlay (spec §4.7): apply every entry through the
    /// non-transactional writer, in unspecified order, remembering only the
    /// first failure. The overlay is freed regardless of outcome.
    pub fn tx_commit(&self) -> Result<()> {
        let overlay = match self.overlay.borrow_mut().take() {
            Some(overlay) => overlay,
            None => return err_at!(OperationsError, msg: "no transaction is open"),
        };
        overlay.drain_into(|key, value| match value {
            Some(list) => self.store_direct(&key, list),
            None => self.kv.delete(&special_record_key(&key)),
        })
    }

    pub fn tx_cancel(&self) -> Result<()> {
        if self.overlay.borrow_mut().take().is_none() {
            return err_at!(OperationsError, msg: "no transaction is open");
        }
        Ok(())
    }
}
