//! On-disk encoding of an [IndexRecord] (spec §3 "IndexRecord", §6.5 "On-disk
//! format").
//!
//! The index record's *logical* shape is fixed by the spec: a `version`
//! field (2 or 3) and an `ids` field that is either a multi-valued list of DN
//! strings (v2) or one contiguous byte string packing raw GUIDs (v3). The
//! exact bytes used to serialise that shape into the single opaque value a
//! [crate::kvstore::KvStore] stores are this crate's own concern (message
//! pack/unpack proper is an out-of-scope collaborator, spec §6.3); this
//! module picks a minimal length-prefixed framing so a record round-trips
//! byte-for-byte.

use std::convert::TryInto;

use crate::{dnlist::DnList, eid::Eid, err_at, Result};

pub const VERSION_DNLIST: u8 = 2;
pub const VERSION_GUID_PACKED: u8 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRecord {
    pub version: u8,
    pub ids: DnList,
}

impl IndexRecord {
    pub fn from_dnlist(list: DnList) -> IndexRecord {
        let version = if list.guid_mode() {
            VERSION_GUID_PACKED
        } else {
            VERSION_DNLIST
        };
        IndexRecord { version, ids: list }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.version];
        match self.version {
            VERSION_DNLIST => {
                for id in self.ids.ids() {
                    let dn = id.as_dn().expect("v2 record must hold DN eids");
                    buf.extend_from_slice(&(dn.len() as u32).to_be_bytes());
                    buf.extend_from_slice(dn);
                }
            }
            VERSION_GUID_PACKED => {
                for id in self.ids.ids() {
                    let guid = id.as_guid().expect("v3 record must hold GUID eids");
                    buf.extend_from_slice(guid.as_bytes());
                }
            }
            _ => unreachable!("IndexRecord constructed with unknown version"),
        }
        buf
    }

    /// Decode a stored record, checking it against the expected format for
    /// the current mode (spec §4.3: "check the `version` field against the
    /// expected format for the current mode — mismatch is a hard error").
    pub fn decode(buf: &[u8], guid_mode: bool) -> Result<IndexRecord> {
        if buf.is_empty() {
            return err_at!(CorruptedIndex, msg: "empty index record");
        }
        let version = buf[0];
        let body = &buf[1..];

        let expected = if guid_mode {
            VERSION_GUID_PACKED
        } else {
            VERSION_DNLIST
        };
        if version != expected {
            return err_at!(
                CorruptedIndex,
                msg: "index record version {} does not match expected {} for current mode",
                version, expected
            );
        }

        match version {
            VERSION_DNLIST => {
                let mut ids = Vec::new();
                let mut rest = body;
                while !rest.is_empty() {
                    if rest.len() < 4 {
                        return err_at!(CorruptedIndex, msg: "truncated v2 record length prefix");
                    }
                    let (len_bytes, tail) = rest.split_at(4);
                    let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
                    if tail.len() < len {
                        return err_at!(CorruptedIndex, msg: "truncated v2 record value");
                    }
                    let (dn, tail) = tail.split_at(len);
                    ids.push(Eid::Dn(dn.to_vec()));
                    rest = tail;
                }
                Ok(IndexRecord {
                    version,
                    ids: DnList::from_ids(ids, false, false),
                })
            }
            VERSION_GUID_PACKED => {
                // Spec §4.3: stored byte string length must be a positive
                // multiple of 16.
                if body.is_empty() || body.len() % 16 != 0 {
                    return err_at!(
                        CorruptedIndex,
                        msg: "v3 record length {} is not a positive multiple of 16",
                        body.len()
                    );
                }
                let ids = body
                    .chunks_exact(16)
                    .map(|chunk| {
                        let bytes: [u8; 16] = chunk.try_into().unwrap();
                        Eid::Guid(uuid::Uuid::from_bytes(bytes))
                    })
                    .collect();
                Ok(IndexRecord {
                    version,
                    ids: DnList::from_ids(ids, true, false),
                })
            }
            other => err_at!(CorruptedIndex, msg: "unknown index record version {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn v2_round_trips() {
        let list = DnList::from_ids(
            vec![Eid::Dn(b"CN=A,DC=X".to_vec()), Eid::Dn(b"CN=B,DC=X".to_vec())],
            false,
            false,
        );
        let record = IndexRecord::from_dnlist(list.clone());
        let encoded = record.encode();
        let decoded = IndexRecord::decode(&encoded, false).unwrap();
        assert_eq!(decoded.ids, list);
        assert_eq!(decoded.version, VERSION_DNLIST);
    }

    #[test]
    fn v3_round_trips() {
        let list = DnList::from_ids(vec![Eid::Guid(Uuid::new_v4()), Eid::Guid(Uuid::new_v4())], true, false);
        let record = IndexRecord::from_dnlist(list.clone());
        let encoded = record.encode();
        let decoded = IndexRecord::decode(&encoded, true).unwrap();
        assert_eq!(decoded.ids, list);
    }

    #[test]
    fn version_mismatch_is_corrupted() {
        let list = DnList::from_ids(vec![Eid::Dn(b"CN=A".to_vec())], false, false);
        let encoded = IndexRecord::from_dnlist(list).encode();
        assert!(IndexRecord::decode(&encoded, true).is_err());
    }

    #[test]
    fn v3_bad_length_is_corrupted() {
        let mut buf = vec![VERSION_GUID_PACKED];
        buf.extend_from_slice(&[0u8; 10]); // not a multiple of 16
        assert!(IndexRecord::decode(&buf, true).is_err());
    }

    #[test]
    fn v3_empty_is_corrupted() {
        let buf = vec![VERSION_GUID_PACKED];
        assert!(IndexRecord::decode(&buf, true).is_err());
    }
}
