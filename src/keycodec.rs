//! Derives the storage key for an index record from `(attribute, value)`,
//! and enforces the key-length cap by truncation into a distinct namespace
//! (spec §4.2).
//!
//! The literal separator scheme (`:` untruncated, `#` truncated) is
//! load-bearing per spec §9 — it keeps the two namespaces from ever
//! colliding, even when a truncated prefix happens to equal some
//! untruncated value. Implementers must not "clean up" these separators.

use base64::Engine;

use crate::{config::Config, err_at, message::needs_base64, schema::Schema, Result};

const PREFIX: &[u8] = b"@INDEX";
/// Bytes reserved for the storage-key wrapper (`DN=` prefix + terminator).
const KEY_WRAPPER_RESERVE: usize = 4;

fn base64_encode(bytes: &[u8]) -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .encode(bytes)
        .into_bytes()
}

/// Result of building an index key: the synthesised DN for the index
/// record and whether it landed in the truncated (`#`) namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexKey {
    pub dn: Vec<u8>,
    pub truncated: bool,
}

/// Build the `@INDEX:...`/`@INDEX#...` key for `(attr, value)` (spec §4.2).
pub fn build_index_key(
    attr: &str,
    raw_value: &[u8],
    config: &Config,
    schema: &dyn Schema,
) -> Result<IndexKey> {
    let is_special = attr.starts_with('@');

    // Step 1/2: canonicalise, unless this is a synthesised attribute.
    let canonical: Vec<u8> = if is_special {
        raw_value.to_vec()
    } else {
        let lower = attr.to_ascii_lowercase();
        let info = match schema.attribute(&lower) {
            Some(info) => info,
            None => {
                return err_at!(OperationsError, msg: "no schema entry for attribute {:?}", attr)
            }
        };
        info.canonicalise(raw_value)?
    };

    // Step 3: decide base64. @IDXDN/@IDXONE never b64-encode in GUID mode
    // (their values are already-normalised DNs).
    let b64 = if config.is_guid_mode() && (attr == "@IDXDN" || attr == "@IDXONE") {
        false
    } else {
        needs_base64(&canonical)
    };

    let value_repr: Vec<u8> = if b64 {
        base64_encode(&canonical)
    } else {
        canonical
    };

    // Extra separator byte the b64 form inserts (the double `:`/`##`).
    let b64_extra = if b64 { 1 } else { 0 };
    let fixed_len = PREFIX.len() + 1 + attr.len() + 1 + b64_extra;

    let budget = if config.max_key_length == 0 {
        usize::MAX
    } else {
        config.max_key_length.saturating_sub(KEY_WRAPPER_RESERVE)
    };

    // Step 6: attribute alone doesn't fit, even with an empty value.
    if fixed_len > budget {
        return err_at!(
            OperationsError,
            msg: "attribute {:?} alone exceeds the maximum key length",
            attr
        );
    }

    let nominal = fixed_len + value_repr.len();
    let truncated = nominal > budget;

    let value_for_key = if truncated {
        let allowed = budget.saturating_sub(fixed_len);
        value_repr[..allowed.min(value_repr.len())].to_vec()
    } else {
        value_repr
    };

    let mut dn = Vec::with_capacity(fixed_len + value_for_key.len());
    dn.extend_from_slice(PREFIX);
    if truncated {
        dn.push(b'#');
        dn.extend_from_slice(attr.as_bytes());
        dn.push(b'#');
        if b64 {
            dn.push(b'#');
        }
    } else {
        dn.push(b':');
        dn.extend_from_slice(attr.as_bytes());
        dn.push(b':');
        if b64 {
            dn.push(b':');
        }
    }
    dn.extend_from_slice(&value_for_key);

    Ok(IndexKey { dn, truncated })
}

/// Storage key for a `@`-prefixed special record, e.g. an `@INDEX:...`
/// record or `@INDEXLIST` itself: `DN=<dn>`, stored byte-for-byte (spec §3
/// "SpecialRecords ... always stored by DN, independent of mode"). Used both
/// directly for control records and by [crate::store::IndexStore] to
/// translate a KeyCodec-built index DN into its physical backing-store key.
pub fn special_record_key(dn: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(3 + dn.len());
    key.extend_from_slice(b"DN=");
    key.extend_from_slice(dn);
    key
}

/// Storage key for a data record (spec §6.5): `DN=<upper-folded-DN>` in DN
/// mode, `GUID=<16 raw bytes>` in GUID mode. `@`-prefixed DNs always use the
/// `DN=` form regardless of mode.
pub fn data_record_key(eid: &crate::eid::Eid, dn_if_special: Option<&[u8]>) -> Vec<u8> {
    if let Some(dn) = dn_if_special {
        // Special (`@`-prefixed) DNs are synthesised literals, not user
        // data: casefolding them would corrupt a base64 payload embedded in
        // an `@INDEX:...::<b64>` key, so they are stored byte-for-byte.
        return special_record_key(dn);
    }
    match eid {
        crate::eid::Eid::Dn(dn) => {
            let mut key = Vec::with_capacity(3 + dn.len());
            key.extend_from_slice(b"DN=");
            key.extend_from_slice(dn);
            key
        }
        crate::eid::Eid::Guid(guid) => {
            let mut key = Vec::with_capacity(5 + 16);
            key.extend_from_slice(b"GUID=");
            key.extend_from_slice(guid.as_bytes());
            key
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttrFlags, AttrInfo, MapSchema};

    fn schema() -> MapSchema {
        MapSchema::new().define("cn", AttrInfo::new(AttrFlags { indexed: true, unique: false }))
    }

    #[test]
    fn untruncated_raw_uses_colon_separators() {
        let config = Config::default();
        let key = build_index_key("cn", b"a", &config, &schema()).unwrap();
        assert!(!key.truncated);
        assert_eq!(key.dn, b"@INDEX:cn:a");
    }

    #[test]
    fn b64_uses_double_colon() {
        let config = Config::default();
        let key = build_index_key("cn", &[0xff, 0xfe], &config, &schema()).unwrap();
        assert!(!key.truncated);
        assert!(key.dn.starts_with(b"@INDEX:cn::"));
    }

    #[test]
    fn truncation_uses_hash_namespace() {
        let mut config = Config::default();
        config.max_key_length = 20;
        let long_value = vec![b'a'; 200];
        let key = build_index_key("cn", &long_value, &config, &schema()).unwrap();
        assert!(key.truncated);
        assert!(key.dn.starts_with(b"@INDEX#cn#"));
        assert!(!key.dn.contains(&b':'));
    }

    #[test]
    fn truncated_and_untruncated_namespaces_never_collide() {
        // An untruncated value that happens to equal a truncated prefix
        // still lands under a different first separator byte.
        let config_plain = Config::default();
        let untruncated = build_index_key("cn", b"aaa", &config_plain, &schema()).unwrap();

        let mut config_small = Config::default();
        config_small.max_key_length = 14;
        let truncated = build_index_key("cn", b"aaaaaaaaaaaaaaaaaaaa", &config_small, &schema()).unwrap();

        assert_ne!(untruncated.dn, truncated.dn);
        assert!(untruncated.dn.contains(&b':'));
        assert!(truncated.dn.contains(&b'#'));
    }

    #[test]
    fn attribute_alone_too_long_fails() {
        let mut config = Config::default();
        config.max_key_length = 16;
        let err = build_index_key("a_very_long_attribute_name", b"x", &config, &schema());
        assert!(err.is_err());
    }

    #[test]
    fn idxdn_never_b64_encodes_in_guid_mode() {
        let mut config = Config::default();
        config.guid_attr = Some("objectGUID".to_string());
        let key = build_index_key("@IDXDN", &[0xff, 0xfe], &config, &schema()).unwrap();
        assert!(!key.dn.windows(2).any(|w| w == b"::"));
    }

    #[test]
    fn special_attribute_skips_canonicalisation() {
        let config = Config::default();
        let key = build_index_key("@IDXONE", b"DC=X", &config, &schema()).unwrap();
        assert_eq!(key.dn, b"@INDEX:@IDXONE:DC=X");
    }

    #[test]
    fn special_record_key_is_stored_byte_for_byte() {
        let key = build_index_key("cn", b"a", &Config::default(), &schema()).unwrap();
        assert_eq!(special_record_key(&key.dn), b"DN=@INDEX:cn:a");
    }
}
