//! Combines scope-specific index lookups with the planner's output,
//! re-filters candidates, and streams matches to the caller (spec §4.6).

use crate::{
    config::Config,
    dnlist::DnList,
    eid::Eid,
    err_at,
    filter::{matches, Filter, Scope},
    keycodec::{build_index_key, data_record_key},
    kvstore::KvStore,
    message::{casefold_dn, parent_dn, Message},
    planner::{FilterPlanner, PlanOutcome},
    schema::Schema,
    Result,
};

/// What a search produced, beyond the matches already delivered through the
/// callback. `FallbackFull` is spec §4.6's "signal caller to perform a full
/// scan" — this crate never performs that scan itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeOutcome {
    Completed,
    FallbackFull,
}

pub struct SearchRequest<'r> {
    pub base: Vec<u8>,
    pub scope: Scope,
    pub filter: Filter,
    pub callback: &'r mut dyn FnMut(Message) -> Result<()>,
}

pub struct SearchDriver<'a> {
    kv: &'a dyn KvStore,
    config: &'a Config,
    schema: &'a dyn Schema,
    planner: &'a FilterPlanner<'a>,
}

impl<'a> SearchDriver<'a> {
    pub fn new(
        kv: &'a dyn KvStore,
        config: &'a Config,
        schema: &'a dyn Schema,
        planner: &'a FilterPlanner<'a>,
    ) -> SearchDriver<'a> {
        SearchDriver { kv, config, schema, planner }
    }

    pub fn search(&self, mut request: SearchRequest) -> Result<ScopeOutcome> {
        match request.scope {
            Scope::Base => {
                err_at!(OperationsError, msg: "BASE scope must be answered by the caller, not SearchDriver")
            }
            Scope::OneLevel => self.one_level(&mut request),
            Scope::Subtree => self.subtree(&mut request),
        }
    }

    fn one_level(&self, request: &mut SearchRequest) -> Result<ScopeOutcome> {
        if !self.config.one_level_indexes {
            return self.subtree(request);
        }

        let key = build_index_key("@IDXONE", &casefold_dn(&request.base), self.config, self.schema)?;
        let mut candidates = match self.planner.one_level_lookup(&request.base)? {
            PlanOutcome::NoMatch => return Ok(ScopeOutcome::Completed),
            PlanOutcome::Found(list) => list,
            PlanOutcome::Unindexed => unreachable!("one-level lookup never yields Unindexed"),
        };

        // Truncation on the one-level key disables trust in the children
        // list alone, so re-filter still runs regardless of this extra step.
        if self.config.is_guid_mode() && !key.truncated {
            match self.planner.plan(&request.filter)? {
                PlanOutcome::Found(list) => candidates = DnList::intersect(candidates, list),
                PlanOutcome::NoMatch => return Ok(ScopeOutcome::Completed),
                PlanOutcome::Unindexed => {}
            }
        }

        let trusted = !key.truncated;
        self.deliver(candidates, request, trusted)
    }

    fn subtree(&self, request: &mut SearchRequest) -> Result<ScopeOutcome> {
        match self.planner.plan(&request.filter)? {
            PlanOutcome::Found(list) => self.deliver(list, request, false),
            PlanOutcome::NoMatch => Ok(ScopeOutcome::Completed),
            PlanOutcome::Unindexed => Ok(ScopeOutcome::FallbackFull),
        }
    }

    /// spec §4.6 per-candidate steps 1-4, plus GUID-mode dedup.
    fn deliver(&self, candidates: DnList, request: &mut SearchRequest, skip_scope_check: bool) -> Result<ScopeOutcome> {
        let guid_mode = candidates.guid_mode();
        let mut prev: Option<&Eid> = None;

        for id in candidates.ids() {
            if guid_mode {
                if prev == Some(id) {
                    continue;
                }
                prev = Some(id);
            }

            let data_key = data_record_key(id, None);
            let bytes = match self.kv.get(&data_key)? {
                Some(bytes) => bytes,
                None => continue, // concurrent delete by an earlier callback
            };
            let msg = Message::decode(&bytes)?;

            let matched = if skip_scope_check {
                matches(&msg, &request.filter, self.schema)
            } else {
                self.in_scope(&msg, request) && matches(&msg, &request.filter, self.schema)
            };
            if matched {
                (request.callback)(msg)?;
            }
        }
        Ok(ScopeOutcome::Completed)
    }

    fn in_scope(&self, msg: &Message, request: &SearchRequest) -> bool {
        let dn = casefold_dn(&msg.dn);
        let base = casefold_dn(&request.base);
        match request.scope {
            Scope::Base => dn == base,
            Scope::OneLevel => parent_dn(&dn).as_deref() == Some(base.as_slice()),
            Scope::Subtree => is_subtree_of(&dn, &base),
        }
    }
}

fn is_subtree_of(dn: &[u8], base: &[u8]) -> bool {
    if dn == base {
        return true;
    }
    dn.len() > base.len() && dn.ends_with(base) && dn[dn.len() - base.len() - 1] == b','
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{kvstore::MemKvStore, kvstore::PutMode, schema::{AttrFlags, AttrInfo, MapSchema}, store::IndexStore, writer::IndexWriter};

    fn schema() -> MapSchema {
        MapSchema::new().define("cn", AttrInfo::new(AttrFlags { indexed: true, unique: false }))
    }

    fn put_record(kv: &MemKvStore, msg: &Message) {
        let eid = msg.eid(None).unwrap();
        let key = data_record_key(&eid, None);
        kv.put(&key, &msg.encode(), PutMode::Replace).unwrap();
    }

    #[test]
    fn subtree_search_delivers_indexed_match() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let mut config = Config::default();
        config.indexed_attrs.insert("cn".to_string());
        let schema = schema();
        let writer = IndexWriter::new(&store, &kv, &config, &schema);

        let msg = Message::new(b"CN=a,DC=x".to_vec()).with_attr("cn", vec![b"a".to_vec()]);
        writer.add_new(&msg).unwrap();
        put_record(&kv, &msg);

        let planner = FilterPlanner::new(&store, &config, &schema);
        let driver = SearchDriver::new(&kv, &config, &schema, &planner);

        let mut delivered = Vec::new();
        let mut callback = |m: Message| {
            delivered.push(m);
            Ok(())
        };
        let request = SearchRequest {
            base: b"DC=x".to_vec(),
            scope: Scope::Subtree,
            filter: Filter::eq("cn", b"a".to_vec()),
            callback: &mut callback,
        };
        let outcome = driver.search(request).unwrap();
        assert_eq!(outcome, ScopeOutcome::Completed);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].dn, msg.dn);
    }

    #[test]
    fn subtree_search_falls_back_when_unindexed() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let config = Config::default();
        let schema = schema();
        let planner = FilterPlanner::new(&store, &config, &schema);
        let driver = SearchDriver::new(&kv, &config, &schema, &planner);

        let mut callback = |_: Message| Ok(());
        let request = SearchRequest {
            base: b"DC=x".to_vec(),
            scope: Scope::Subtree,
            filter: Filter::eq("sn", b"x".to_vec()),
            callback: &mut callback,
        };
        assert_eq!(driver.search(request).unwrap(), ScopeOutcome::FallbackFull);
    }

    #[test]
    fn base_scope_is_an_invariant_violation() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let config = Config::default();
        let schema = schema();
        let planner = FilterPlanner::new(&store, &config, &schema);
        let driver = SearchDriver::new(&kv, &config, &schema, &planner);

        let mut callback = |_: Message| Ok(());
        let request = SearchRequest {
            base: b"DC=x".to_vec(),
            scope: Scope::Base,
            filter: Filter::eq("cn", b"a".to_vec()),
            callback: &mut callback,
        };
        assert!(driver.search(request).is_err());
    }

    #[test]
    fn one_level_delivers_only_direct_children() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let mut config = Config::default();
        config.indexed_attrs.insert("cn".to_string());
        config.one_level_indexes = true;
        let schema = schema();
        let writer = IndexWriter::new(&store, &kv, &config, &schema);

        let child = Message::new(b"CN=a,DC=x".to_vec()).with_attr("cn", vec![b"a".to_vec()]);
        writer.add_new(&child).unwrap();
        put_record(&kv, &child);

        let grandchild = Message::new(b"CN=b,CN=a,DC=x".to_vec()).with_attr("cn", vec![b"b".to_vec()]);
        writer.add_new(&grandchild).unwrap();
        put_record(&kv, &grandchild);

        let planner = FilterPlanner::new(&store, &config, &schema);
        let driver = SearchDriver::new(&kv, &config, &schema, &planner);

        let mut delivered = Vec::new();
        let mut callback = |m: Message| {
            delivered.push(m);
            Ok(())
        };
        let request = SearchRequest {
            base: b"DC=x".to_vec(),
            scope: Scope::OneLevel,
            filter: Filter::eq("cn", b"a".to_vec()),
            callback: &mut callback,
        };
        driver.search(request).unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].dn, child.dn);
    }

    #[test]
    fn callback_error_terminates_delivery_immediately() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let mut config = Config::default();
        config.indexed_attrs.insert("cn".to_string());
        let schema = schema();
        let writer = IndexWriter::new(&store, &kv, &config, &schema);

        let msg = Message::new(b"CN=a,DC=x".to_vec()).with_attr("cn", vec![b"a".to_vec()]);
        writer.add_new(&msg).unwrap();
        put_record(&kv, &msg);

        let planner = FilterPlanner::new(&store, &config, &schema);
        let driver = SearchDriver::new(&kv, &config, &schema, &planner);

        let mut callback = |_: Message| err_at!(OperationsError, msg: "caller aborted");
        let request = SearchRequest {
            base: b"DC=x".to_vec(),
            scope: Scope::Subtree,
            filter: Filter::eq("cn", b"a".to_vec()),
            callback: &mut callback,
        };
        assert!(driver.search(request).is_err());
    }
}
