//! Parsed filter tree and search scope (spec §4.5, §4.6).
//!
//! A real LDAP filter parser/grammar is out of scope (spec §6.3 territory);
//! this is the tree shape [crate::planner::FilterPlanner] and
//! [crate::search::SearchDriver] walk, built directly by callers or tests.

use crate::{message::Message, schema::Schema};

/// `(BASE, ONELEVEL, SUBTREE)` — `LDB_SCOPE_DEFAULT` is treated identically
/// to `SUBTREE` (spec §9 open question, resolved: preserve that identity).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Base,
    OneLevel,
    Subtree,
}

/// Filter tree node (spec §4.5 dispatch list). Only `EQUALITY`, `AND`, `OR`
/// are planned against indexes; the rest always yield `Unindexed` (spec's
/// Non-goals: substring/range/approximate/presence/negative-set indexing).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    Equality { attr: String, value: Vec<u8> },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Substring { attr: String },
    Greater { attr: String },
    Less { attr: String },
    Present { attr: String },
    Approx { attr: String },
    Extended,
}

impl Filter {
    pub fn eq(attr: impl Into<String>, value: impl Into<Vec<u8>>) -> Filter {
        Filter::Equality {
            attr: attr.into(),
            value: value.into(),
        }
    }
}

/// Re-filter a dereferenced candidate against the full tree
/// ([crate::search::SearchDriver] step 3). Index lookups are allowed to
/// over-match (truncation, optimistic intersection shortcuts); this is the
/// precise check that throws out anything the index let through wrongly.
///
/// `Substring`/`Greater`/`Less`/`Present`/`Approx`/`Extended` match
/// unconditionally: their real evaluation semantics are a stated Non-goal,
/// and an indexed prefilter must never be stricter than the true matcher.
pub fn matches(msg: &Message, filter: &Filter, schema: &dyn Schema) -> bool {
    match filter {
        Filter::Equality { attr, value } => equality_matches(msg, attr, value, schema),
        Filter::And(children) => children.iter().all(|c| matches(msg, c, schema)),
        Filter::Or(children) => children.iter().any(|c| matches(msg, c, schema)),
        Filter::Not(inner) => !matches(msg, inner, schema),
        Filter::Substring { .. }
        | Filter::Greater { .. }
        | Filter::Less { .. }
        | Filter::Present { .. }
        | Filter::Approx { .. }
        | Filter::Extended => true,
    }
}

fn equality_matches(msg: &Message, attr: &str, value: &[u8], schema: &dyn Schema) -> bool {
    if attr.eq_ignore_ascii_case("dn") {
        return crate::message::casefold_dn(&msg.dn) == crate::message::casefold_dn(value);
    }
    if attr.starts_with('@') {
        return false;
    }

    let lower = attr.to_ascii_lowercase();
    let canonicalise = |raw: &[u8]| -> Vec<u8> {
        match schema.attribute(&lower) {
            Some(info) => info.canonicalise(raw).unwrap_or_else(|_| raw.to_vec()),
            None => raw.to_vec(),
        }
    };
    let target = canonicalise(value);

    match msg.attr_values(attr) {
        Some(values) => values.iter().any(|v| canonicalise(v) == target),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{reject_wildcards, AttrFlags, AttrInfo, MapSchema};

    fn schema() -> MapSchema {
        MapSchema::new().define(
            "cn",
            AttrInfo::new(AttrFlags { indexed: true, unique: false }).with_canonicaliser(reject_wildcards),
        )
    }

    #[test]
    fn equality_compares_canonicalised_values() {
        let msg = Message::new(b"CN=a,DC=x".to_vec()).with_attr("cn", vec![b"ABC".to_vec()]);
        let schema = schema();
        assert!(matches(&msg, &Filter::eq("cn", b"abc".to_vec()), &schema));
        assert!(!matches(&msg, &Filter::eq("cn", b"xyz".to_vec()), &schema));
    }

    #[test]
    fn and_requires_every_child() {
        let msg = Message::new(b"CN=a,DC=x".to_vec()).with_attr("cn", vec![b"abc".to_vec()]);
        let schema = schema();
        let filter = Filter::And(vec![Filter::eq("cn", b"abc".to_vec()), Filter::eq("cn", b"other".to_vec())]);
        assert!(!matches(&msg, &filter, &schema));
    }

    #[test]
    fn not_negates_child() {
        let msg = Message::new(b"CN=a,DC=x".to_vec()).with_attr("cn", vec![b"abc".to_vec()]);
        let schema = schema();
        let filter = Filter::Not(Box::new(Filter::eq("cn", b"other".to_vec())));
        assert!(matches(&msg, &filter, &schema));
    }

    #[test]
    fn non_goal_nodes_match_unconditionally() {
        let msg = Message::new(b"CN=a,DC=x".to_vec());
        let schema = schema();
        assert!(matches(&msg, &Filter::Present { attr: "cn".to_string() }, &schema));
    }
}
