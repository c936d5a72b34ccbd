//! Indexing engine for a schemaless, directory-style key/value database.
//!
//! Maintains `@INDEX`/`@IDXONE`/`@IDXDN` lookup records alongside a plain
//! key/value store, plans a filter tree down to a candidate id list, and
//! drives a scoped search over the result — the same job `ltdb`/`tdb`-backed
//! LDAP directories hand to their index subsystem. Entries are identified
//! either by their linearised, case-folded distinguished name or by a 16-byte
//! GUID attribute; the choice is fixed for the lifetime of an open database
//! (see [config::Config]).
//!
//! Layout mirrors the pipeline a caller drives: [keycodec] and [record] are
//! the on-disk encoding; [store] and [overlay] hold records and stage writes
//! inside a transaction; [writer] maintains them as messages are added,
//! changed, or removed; [filter], [planner] and [search] turn a filter tree
//! into delivered matches; [reindex] rebuilds everything from the data
//! records when the index falls out of sync.

mod config;
mod dnlist;
mod eid;
mod error;
mod filter;
mod keycodec;
mod kvstore;
mod message;
mod overlay;
mod planner;
mod record;
mod reindex;
mod schema;
mod search;
mod store;
mod writer;

pub use crate::config::Config;
pub use crate::dnlist::DnList;
pub use crate::eid::Eid;
pub use crate::error::{Error, Result};
pub use crate::filter::{matches, Filter, Scope};
pub use crate::keycodec::{build_index_key, data_record_key, special_record_key, IndexKey};
pub use crate::kvstore::{KvStore, MemKvStore, PutMode};
pub use crate::message::{
    casefold_dn, extended_component, is_special_dn, linearise_dn, needs_base64, parent_dn, Message,
};
pub use crate::planner::{FilterPlanner, PlanOutcome};
pub use crate::record::IndexRecord;
pub use crate::reindex::{Reindexer, ReindexProgress};
pub use crate::schema::{reject_wildcards, AttrFlags, AttrInfo, MapSchema, Schema};
pub use crate::search::{ScopeOutcome, SearchDriver, SearchRequest};
pub use crate::store::IndexStore;
pub use crate::writer::IndexWriter;
