//! Process-wide configuration (spec §3 "Configuration").
//!
//! Mirrors the teacher's `*_config.rs` modules: a plain struct, a `Default`
//! impl, and a `from_toml_str` constructor that walks a [toml::Value] with
//! `err_at!`-wrapped field lookups. Config is fixed for the lifetime of an
//! open database (spec §3: "The choice is process-configuration-wide and
//! fixed for the lifetime of the database").

use std::{collections::HashSet, convert::TryFrom};

use crate::{err_at, Result};

/// Minimum key length that can ever hold `@INDEX:` plus a single-char
/// attribute and value; below this, truncation can never help (spec §4.2
/// step 6).
const MIN_VIABLE_KEY_LEN: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Attribute name whose value is the Eid in GUID mode. `None` => DN mode.
    pub guid_attr: Option<String>,
    /// DN extension tag carrying the GUID, enabling O(1) base lookups.
    pub guid_dn_component: Option<String>,
    /// Maintain the parent→children (`@IDXONE`) index.
    pub one_level_indexes: bool,
    /// Attributes to maintain an equality index for.
    pub indexed_attrs: HashSet<String>,
    /// Attributes with a uniqueness constraint.
    pub unique_attrs: HashSet<String>,
    /// Storage-imposed key length cap; `0` means unlimited.
    pub max_key_length: usize,
    /// Reject `dn=...` equality filters.
    pub disallow_dn_filter: bool,
    /// Forbid mutating operations ([crate::reindex::Reindexer] refuses to run).
    pub read_only: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            guid_attr: None,
            guid_dn_component: None,
            one_level_indexes: true,
            indexed_attrs: HashSet::new(),
            unique_attrs: HashSet::new(),
            max_key_length: 0,
            disallow_dn_filter: false,
            read_only: false,
        }
    }
}

impl Config {
    pub fn is_guid_mode(&self) -> bool {
        self.guid_attr.is_some()
    }

    /// Enforce spec §4.2 step 6: if the attribute length alone already
    /// exceeds the minimum viable key length, truncation can never help and
    /// the configuration itself is unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_key_length != 0 && self.max_key_length < MIN_VIABLE_KEY_LEN {
            return err_at!(
                OperationsError,
                msg: "max_key_length {} too small to hold any index key",
                self.max_key_length
            );
        }
        for attr in self.unique_attrs.iter() {
            if !self.indexed_attrs.contains(attr) && !attr.starts_with('@') {
                return err_at!(
                    OperationsError,
                    msg: "unique attribute {:?} is not in indexed_attrs",
                    attr
                );
            }
        }
        Ok(())
    }

    /// Load configuration from a TOML document shaped like the `@INDEXLIST`
    /// control record: `@IDXGUID`, `@IDX_DN_GUID`, `@IDXATTR` (array),
    /// `@IDXONE` (bool), plus the storage-facing `max_key_length` and
    /// `disallow_dn_filter` scalars.
    pub fn from_toml_str(text: &str) -> Result<Config> {
        let value: toml::Value = err_at!(InvalidInput, toml::from_str(text))?;
        let table = match value.as_table() {
            Some(table) => table,
            None => return err_at!(InvalidInput, msg: "config root must be a table"),
        };

        let mut config = Config::default();

        if let Some(v) = table.get("@IDXGUID").and_then(|v| v.as_str()) {
            config.guid_attr = Some(v.to_string());
        }
        if let Some(v) = table.get("@IDX_DN_GUID").and_then(|v| v.as_str()) {
            config.guid_dn_component = Some(v.to_string());
        }
        if let Some(v) = table.get("@IDXONE").and_then(|v| v.as_bool()) {
            config.one_level_indexes = v;
        }
        if let Some(arr) = table.get("@IDXATTR").and_then(|v| v.as_array()) {
            for item in arr {
                if let Some(s) = item.as_str() {
                    config.indexed_attrs.insert(s.to_string());
                }
            }
        }
        if let Some(arr) = table.get("unique_attrs").and_then(|v| v.as_array()) {
            for item in arr {
                if let Some(s) = item.as_str() {
                    config.unique_attrs.insert(s.to_string());
                }
            }
        }
        if let Some(v) = table.get("max_key_length").and_then(|v| v.as_integer()) {
            config.max_key_length = err_at!(FailConvert, usize::try_from(v))?;
        }
        if let Some(v) = table.get("disallow_dn_filter").and_then(|v| v.as_bool()) {
            config.disallow_dn_filter = v;
        }
        if let Some(v) = table.get("read_only").and_then(|v| v.as_bool()) {
            config.read_only = v;
        }

        config.validate()?;
        Ok(config)
    }
}
