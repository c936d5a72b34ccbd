//! Walks a filter tree and produces a candidate [DnList] (spec §4.5).

use uuid::Uuid;

use crate::{
    config::Config,
    dnlist::DnList,
    eid::Eid,
    filter::Filter,
    keycodec::build_index_key,
    message::{casefold_dn, extended_component},
    schema::Schema,
    store::IndexStore,
    Result,
};

/// `plan()`'s result. `NoMatch` and `Unindexed` are first-class outcomes,
/// not `Error` variants (spec §7) — a provably-empty filter and an
/// unanswerable one both need to flow through `?` without looking like a
/// failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanOutcome {
    Found(DnList),
    NoMatch,
    Unindexed,
}

pub struct FilterPlanner<'a> {
    store: &'a IndexStore<'a>,
    config: &'a Config,
    schema: &'a dyn Schema,
}

impl<'a> FilterPlanner<'a> {
    pub fn new(store: &'a IndexStore<'a>, config: &'a Config, schema: &'a dyn Schema) -> FilterPlanner<'a> {
        FilterPlanner { store, config, schema }
    }

    pub fn plan(&self, filter: &Filter) -> Result<PlanOutcome> {
        match filter {
            Filter::Equality { attr, value } => self.equality(attr, value),
            Filter::Or(children) => self.or(children),
            Filter::And(children) => self.and(children),
            Filter::Not(_)
            | Filter::Substring { .. }
            | Filter::Greater { .. }
            | Filter::Less { .. }
            | Filter::Present { .. }
            | Filter::Approx { .. }
            | Filter::Extended => Ok(PlanOutcome::Unindexed),
        }
    }

    fn equality(&self, attr: &str, value: &[u8]) -> Result<PlanOutcome> {
        let is_dn = attr.eq_ignore_ascii_case("dn");

        if is_dn && self.config.disallow_dn_filter {
            return Ok(PlanOutcome::NoMatch);
        }
        if attr.starts_with('@') {
            return Ok(PlanOutcome::NoMatch);
        }
        if is_dn {
            return self.base_dn_lookup(value);
        }
        if self.config.guid_attr.as_deref() == Some(attr) {
            let guid = match Uuid::from_slice(value) {
                Ok(guid) => guid,
                Err(_) => return Ok(PlanOutcome::NoMatch),
            };
            return Ok(PlanOutcome::Found(DnList::single(Eid::Guid(guid), true)));
        }

        if !self.config.indexed_attrs.iter().any(|a| a.eq_ignore_ascii_case(attr)) {
            return Ok(PlanOutcome::Unindexed);
        }
        let key = build_index_key(attr, value, self.config, self.schema)?;
        let list = self.store.load(&key.dn)?;
        if list.is_empty() {
            Ok(PlanOutcome::NoMatch)
        } else {
            Ok(PlanOutcome::Found(list))
        }
    }

    fn or(&self, children: &[Filter]) -> Result<PlanOutcome> {
        let mut acc: Option<DnList> = None;
        for child in children.iter() {
            match self.plan(child)? {
                PlanOutcome::NoMatch => continue,
                PlanOutcome::Unindexed => return Ok(PlanOutcome::Unindexed),
                PlanOutcome::Found(list) => {
                    acc = Some(match acc {
                        Some(a) => DnList::union(a, list),
                        None => list,
                    });
                }
            }
        }
        match acc {
            None => Ok(PlanOutcome::NoMatch),
            Some(list) if list.is_empty() => Ok(PlanOutcome::NoMatch),
            Some(list) => Ok(PlanOutcome::Found(list)),
        }
    }

    fn and(&self, children: &[Filter]) -> Result<PlanOutcome> {
        // Pass 1: short-circuit on the first equality-on-a-unique-attribute
        // child that resolves.
        for child in children.iter() {
            if !is_unique_equality(child, self.config) {
                continue;
            }
            match self.plan(child)? {
                PlanOutcome::Found(list) => return Ok(PlanOutcome::Found(list)),
                PlanOutcome::NoMatch => return Ok(PlanOutcome::NoMatch),
                PlanOutcome::Unindexed => continue,
            }
        }

        // Pass 2: intersect everything that resolves; skip Unindexed
        // children (the rest still narrow the candidate set).
        let mut acc: Option<DnList> = None;
        for child in children.iter() {
            match self.plan(child)? {
                PlanOutcome::NoMatch => return Ok(PlanOutcome::NoMatch),
                PlanOutcome::Unindexed => continue,
                PlanOutcome::Found(list) => {
                    acc = Some(match acc {
                        Some(a) => DnList::intersect(a, list),
                        None => list,
                    });
                    if let Some(ref a) = acc {
                        if a.len() <= 1 {
                            break;
                        }
                    }
                }
            }
        }

        match acc {
            None => Ok(PlanOutcome::Unindexed),
            Some(list) if list.is_empty() => Ok(PlanOutcome::NoMatch),
            Some(list) => Ok(PlanOutcome::Found(list)),
        }
    }

    /// spec §4.5.1.
    pub fn base_dn_lookup(&self, base: &[u8]) -> Result<PlanOutcome> {
        if !self.config.is_guid_mode() {
            return Ok(PlanOutcome::Found(DnList::single(Eid::Dn(casefold_dn(base)), false)));
        }
        if let Some(tag) = &self.config.guid_dn_component {
            if let Some(raw) = extended_component(base, tag) {
                if let Ok(guid) = Uuid::from_slice(&raw) {
                    return Ok(PlanOutcome::Found(DnList::single(Eid::Guid(guid), true)));
                }
            }
        }
        let key = build_index_key("@IDXDN", &casefold_dn(base), self.config, self.schema)?;
        let list = self.store.load(&key.dn)?;
        if list.is_empty() {
            Ok(PlanOutcome::NoMatch)
        } else {
            Ok(PlanOutcome::Found(list))
        }
    }

    /// spec §4.5.2. Result is always `strict=true`.
    pub fn one_level_lookup(&self, parent: &[u8]) -> Result<PlanOutcome> {
        let key = build_index_key("@IDXONE", &casefold_dn(parent), self.config, self.schema)?;
        let mut list = self.store.load(&key.dn)?;
        list.set_strict(true);
        if list.is_empty() {
            Ok(PlanOutcome::NoMatch)
        } else {
            Ok(PlanOutcome::Found(list))
        }
    }
}

fn is_unique_equality(filter: &Filter, config: &Config) -> bool {
    match filter {
        Filter::Equality { attr, .. } => {
            attr.eq_ignore_ascii_case("dn")
                || config.guid_attr.as_deref() == Some(attr.as_str())
                || config.unique_attrs.iter().any(|a| a.eq_ignore_ascii_case(attr))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kvstore::MemKvStore,
        schema::{AttrFlags, AttrInfo, MapSchema},
        writer::IndexWriter,
        Message,
    };

    fn schema() -> MapSchema {
        MapSchema::new()
            .define("cn", AttrInfo::new(AttrFlags { indexed: true, unique: false }))
            .define("sn", AttrInfo::new(AttrFlags { indexed: true, unique: false }))
    }

    #[test]
    fn equality_on_unindexed_attr_is_unindexed() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let config = Config::default();
        let schema = schema();
        let planner = FilterPlanner::new(&store, &config, &schema);
        assert_eq!(
            planner.plan(&Filter::eq("sn", b"x".to_vec())).unwrap(),
            PlanOutcome::Unindexed
        );
    }

    #[test]
    fn equality_with_no_stored_values_is_no_match() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let mut config = Config::default();
        config.indexed_attrs.insert("cn".to_string());
        let schema = schema();
        let planner = FilterPlanner::new(&store, &config, &schema);
        assert_eq!(
            planner.plan(&Filter::eq("cn", b"a".to_vec())).unwrap(),
            PlanOutcome::NoMatch
        );
    }

    #[test]
    fn or_drops_no_match_children_but_propagates_unindexed() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let mut config = Config::default();
        config.indexed_attrs.insert("cn".to_string());
        let schema = schema();
        let planner = FilterPlanner::new(&store, &config, &schema);

        let filter = Filter::Or(vec![Filter::eq("cn", b"a".to_vec()), Filter::eq("sn", b"x".to_vec())]);
        assert_eq!(planner.plan(&filter).unwrap(), PlanOutcome::Unindexed);
    }

    #[test]
    fn and_short_circuits_on_unique_attribute() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let mut config = Config::default();
        config.indexed_attrs.insert("cn".to_string());
        config.unique_attrs.insert("cn".to_string());
        let schema = schema();

        let writer = IndexWriter::new(&store, &kv, &config, &schema);
        let msg = Message::new(b"CN=a,DC=x".to_vec()).with_attr("cn", vec![b"a".to_vec()]);
        writer.add_new(&msg).unwrap();

        let planner = FilterPlanner::new(&store, &config, &schema);
        let filter = Filter::And(vec![Filter::eq("cn", b"a".to_vec()), Filter::eq("sn", b"unindexed".to_vec())]);
        match planner.plan(&filter).unwrap() {
            PlanOutcome::Found(list) => assert_eq!(list.len(), 1),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn dn_mode_base_lookup_needs_no_index_read() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let config = Config::default();
        let schema = schema();
        let planner = FilterPlanner::new(&store, &config, &schema);
        match planner.base_dn_lookup(b"cn=a,dc=x").unwrap() {
            PlanOutcome::Found(list) => assert_eq!(list.ids(), &[Eid::Dn(b"CN=A,DC=X".to_vec())]),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn not_node_is_always_unindexed() {
        let kv = MemKvStore::new();
        let store = IndexStore::new(&kv, false);
        let config = Config::default();
        let schema = schema();
        let planner = FilterPlanner::new(&store, &config, &schema);
        let filter = Filter::Not(Box::new(Filter::eq("cn", b"a".to_vec())));
        assert_eq!(planner.plan(&filter).unwrap(), PlanOutcome::Unindexed);
    }
}
