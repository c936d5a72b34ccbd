//! Maintains `@INDEX`/`@IDXONE`/`@IDXDN` entries for a message (spec §4.4).

use log::warn;

use crate::{
    config::Config,
    dnlist::DnList,
    eid::Eid,
    err_at,
    keycodec::{build_index_key, data_record_key},
    kvstore::KvStore,
    message::{casefold_dn, parent_dn, Message},
    schema::Schema,
    store::IndexStore,
    Result,
};

pub struct IndexWriter<'a> {
    store: &'a IndexStore<'a>,
    kv: &'a dyn KvStore,
    config: &'a Config,
    schema: &'a dyn Schema,
}

impl<'a> IndexWriter<'a> {
    pub fn new(
        store: &'a IndexStore<'a>,
        kv: &'a dyn KvStore,
        config: &'a Config,
        schema: &'a dyn Schema,
    ) -> IndexWriter<'a> {
        IndexWriter {
            store,
            kv,
            config,
            schema,
        }
    }

    fn eid_of(&self, msg: &Message) -> Result<Eid> {
        match msg.eid(self.config.guid_attr.as_deref()) {
            Some(eid) => Ok(eid),
            None => err_at!(InvalidInput, msg: "message lacks a usable identifier for the configured mode"),
        }
    }

    /// spec §4.4.1. Rolls back via `delete(msg)` on any failure.
    pub fn add_new(&self, msg: &Message) -> Result<()> {
        if msg.is_special() {
            return Ok(());
        }
        let eid = self.eid_of(msg)?;
        if let Err(e) = self.add_new_inner(msg, &eid) {
            let _ = self.delete(msg);
            return Err(e);
        }
        Ok(())
    }

    fn add_new_inner(&self, msg: &Message, eid: &Eid) -> Result<()> {
        if self.config.is_guid_mode() {
            self.add1("@IDXDN", &casefold_dn(&msg.dn), eid)?;
        }
        if self.config.one_level_indexes {
            if let Some(parent) = parent_dn(&msg.dn) {
                self.add1("@IDXONE", &casefold_dn(&parent), eid)?;
            }
        }
        for attr in self.config.indexed_attrs.iter() {
            if let Some(values) = msg.attr_values(attr) {
                for value in values {
                    self.add1(attr, value, eid)?;
                }
            }
        }
        Ok(())
    }

    /// Remove every index entry this message could have contributed. Used
    /// both as the public delete operation and as `add_new`'s rollback,
    /// which is why a missing entry is tolerated rather than an error.
    pub fn delete(&self, msg: &Message) -> Result<()> {
        if msg.is_special() {
            return Ok(());
        }
        let eid = self.eid_of(msg)?;
        if self.config.is_guid_mode() {
            self.del1("@IDXDN", &casefold_dn(&msg.dn), &eid)?;
        }
        if self.config.one_level_indexes {
            if let Some(parent) = parent_dn(&msg.dn) {
                self.del1("@IDXONE", &casefold_dn(&parent), &eid)?;
            }
        }
        for attr in self.config.indexed_attrs.iter() {
            if let Some(values) = msg.attr_values(attr) {
                for value in values {
                    self.del1(attr, value, &eid)?;
                }
            }
        }
        Ok(())
    }

    pub fn add_element(&self, msg: &Message, attr: &str) -> Result<()> {
        if msg.is_special() {
            return Ok(());
        }
        let eid = self.eid_of(msg)?;
        if let Some(values) = msg.attr_values(attr) {
            for value in values {
                self.add1(attr, value, &eid)?;
            }
        }
        Ok(())
    }

    pub fn del_element(&self, msg: &Message, attr: &str) -> Result<()> {
        if msg.is_special() {
            return Ok(());
        }
        let eid = self.eid_of(msg)?;
        if let Some(values) = msg.attr_values(attr) {
            for value in values {
                self.del1(attr, value, &eid)?;
            }
        }
        Ok(())
    }

    pub fn del_value(&self, msg: &Message, attr: &str, index: usize) -> Result<()> {
        if msg.is_special() {
            return Ok(());
        }
        let eid = self.eid_of(msg)?;
        let value = match msg.attr_values(attr).and_then(|vs| vs.get(index)) {
            Some(value) => value.clone(),
            None => return err_at!(InvalidInput, msg: "no value at index {} for attribute {:?}", index, attr),
        };
        self.del1(attr, &value, &eid)
    }

    /// Atomic per-value addition (spec §4.4.2).
    fn add1(&self, attr: &str, value: &[u8], eid: &Eid) -> Result<()> {
        let key = build_index_key(attr, value, self.config, self.schema)?;
        let unique = is_unique_attr(attr, self.config);

        if key.truncated && unique {
            return err_at!(
                ConstraintViolation,
                msg: "cannot enforce uniqueness on {:?}: index key was truncated",
                attr
            );
        }

        let mut list = self.store.load(&key.dn)?;

        if attr == "@IDXDN" {
            if !list.is_empty() {
                if !key.truncated {
                    return err_at!(ConstraintViolation, msg: "an entry with this DN already exists");
                }
                for existing in list.ids() {
                    if let Some(dn) = self.record_dn(existing)? {
                        if dn == value {
                            return err_at!(ConstraintViolation, msg: "an entry with this DN already exists");
                        }
                    }
                }
            }
        } else if unique && !list.is_empty() {
            return err_at!(
                ConstraintViolation,
                msg: "uniqueness violation on attribute {:?}",
                attr
            );
        }

        if list.guid_mode() {
            let duplicate = list.insert_sorted(eid.clone(), true);
            if duplicate {
                warn!("duplicate value inserted for multi-valued attribute {:?}", attr);
            }
        } else {
            list.push_unordered(eid.clone());
        }

        self.store.store(&key.dn, list)
    }

    /// Mirror of `add1` (spec §4.4.3): find the id matching this message and
    /// remove it, tolerating its absence.
    fn del1(&self, attr: &str, value: &[u8], eid: &Eid) -> Result<()> {
        let key = build_index_key(attr, value, self.config, self.schema)?;
        let mut list = self.store.load(&key.dn)?;
        if let Some(idx) = list.find(eid) {
            list.remove_at(idx);
        }
        self.store.store(&key.dn, list)
    }

    /// Fetch the (case-folded) DN of the data record `eid` refers to, for
    /// the truncated-`@IDXDN` duplicate probe (spec §4.4.2 step 3). `None`
    /// covers both "never existed" and "deleted since" (stale ids).
    fn record_dn(&self, eid: &Eid) -> Result<Option<Vec<u8>>> {
        let key = data_record_key(eid, None);
        match self.kv.get(&key)? {
            None => Ok(None),
            Some(bytes) => {
                let msg = Message::decode(&bytes)?;
                Ok(Some(casefold_dn(&msg.dn)))
            }
        }
    }
}

fn is_unique_attr(attr: &str, config: &Config) -> bool {
    if attr.starts_with('@') {
        false
    } else {
        config.unique_attrs.iter().any(|a| a.eq_ignore_ascii_case(attr))
    }
}
