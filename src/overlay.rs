//! In-memory write overlay for an open transaction (spec §4.7).
//!
//! While a transaction is open, every [crate::store::IndexStore] write is
//! redirected here instead of reaching the backing [crate::kvstore::KvStore].
//! Commit drains the overlay through the store's non-transactional writer in
//! unspecified order, remembering the first failure but continuing so a
//! doomed commit still applies everything it can; cancel just drops the
//! overlay's contents.

use std::collections::HashMap;

use crate::{dnlist::DnList, Result};

/// Keyed by the linearised index DN (spec §4.7: "keyed by the linearised
/// index DN").
#[derive(Default)]
pub struct TxOverlay {
    entries: HashMap<Vec<u8>, Option<DnList>>,
}

impl TxOverlay {
    pub fn new() -> TxOverlay {
        TxOverlay::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `None` means the key is staged for deletion.
    pub fn get(&self, key: &[u8]) -> Option<Option<&DnList>> {
        self.entries.get(key).map(|v| v.as_ref())
    }

    pub fn set(&mut self, key: Vec<u8>, list: DnList) {
        self.entries.insert(key, Some(list));
    }

    pub fn stage_delete(&mut self, key: Vec<u8>) {
        self.entries.insert(key, None);
    }

    /// Drain the overlay, applying each entry with `apply`. Keeps iterating
    /// on failure, remembering only the first error (spec §4.7: "If any
    /// write fails, remember the first error and continue iterating").
    pub fn drain_into(self, mut apply: impl FnMut(Vec<u8>, Option<DnList>) -> Result<()>) -> Result<()> {
        let mut first_err = None;
        for (key, value) in self.entries.into_iter() {
            if let Err(e) = apply(key, value) {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
