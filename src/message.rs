//! DN and message utilities (spec §6.3, the "collaborator" this crate treats
//! as out-of-scope for the real DN parser but still needs a working stand-in
//! for to be a runnable, testable crate).

use std::convert::TryInto;

use uuid::Uuid;

use crate::{err_at, eid::Eid, Result};

/// A stored entry: a distinguished name plus a multi-valued attribute map
/// (spec §1 "Stored entries are *messages*").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub dn: Vec<u8>,
    attrs: Vec<(String, Vec<Vec<u8>>)>,
}

impl Message {
    pub fn new(dn: impl Into<Vec<u8>>) -> Message {
        Message {
            dn: dn.into(),
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, values: Vec<Vec<u8>>) -> Message {
        self.set_attr(name, values);
        self
    }

    pub fn set_attr(&mut self, name: &str, values: Vec<Vec<u8>>) {
        let lower = name.to_ascii_lowercase();
        match self.attrs.iter_mut().find(|(n, _)| *n == lower) {
            Some((_, existing)) => *existing = values,
            None => self.attrs.push((lower, values)),
        }
    }

    pub fn attr_values(&self, name: &str) -> Option<&[Vec<u8>]> {
        let lower = name.to_ascii_lowercase();
        self.attrs
            .iter()
            .find(|(n, _)| *n == lower)
            .map(|(_, v)| v.as_slice())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &[Vec<u8>])> {
        self.attrs.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// `true` for synthesised DNs such as `@INDEX:...` or `@INDEXLIST`,
    /// which are never indexed (spec §3 "SpecialRecords").
    pub fn is_special(&self) -> bool {
        is_special_dn(&self.dn)
    }

    /// Extract the GUID from the configured GUID attribute, if present and
    /// well-formed (spec §3 "Eid").
    pub fn guid(&self, guid_attr: &str) -> Option<Uuid> {
        let values = self.attr_values(guid_attr)?;
        let raw = values.first()?;
        Uuid::from_slice(raw).ok()
    }

    /// Compute the Eid for this message per the database's mode.
    pub fn eid(&self, guid_attr: Option<&str>) -> Option<Eid> {
        match guid_attr {
            Some(attr) => self.guid(attr).map(Eid::Guid),
            None => Some(Eid::Dn(casefold_dn(&self.dn))),
        }
    }

    /// Serialise this record for storage under its `DN=`/`GUID=` key. Real
    /// message pack/unpack is a stated collaborator (spec §6.3); this
    /// length-prefixed framing stands in for it so [crate::reindex::Reindexer]
    /// and the uniqueness probe in [crate::writer] have something concrete to
    /// decode.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.dn.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.dn);
        buf.extend_from_slice(&(self.attrs.len() as u32).to_be_bytes());
        for (name, values) in self.attrs.iter() {
            buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(&(values.len() as u32).to_be_bytes());
            for value in values.iter() {
                buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
                buf.extend_from_slice(value);
            }
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Message> {
        let mut rest = buf;
        let dn = take_len_prefixed(&mut rest)?;
        let attr_count = take_u32(&mut rest)? as usize;
        let mut attrs = Vec::with_capacity(attr_count);
        for _ in 0..attr_count {
            let name = take_len_prefixed(&mut rest)?;
            let name = err_at!(CorruptedIndex, String::from_utf8(name))?;
            let value_count = take_u32(&mut rest)? as usize;
            let mut values = Vec::with_capacity(value_count);
            for _ in 0..value_count {
                values.push(take_len_prefixed(&mut rest)?);
            }
            attrs.push((name, values));
        }
        Ok(Message { dn, attrs })
    }
}

fn take_u32(rest: &mut &[u8]) -> Result<u32> {
    if rest.len() < 4 {
        return err_at!(CorruptedIndex, msg: "truncated data record");
    }
    let (head, tail) = rest.split_at(4);
    *rest = tail;
    Ok(u32::from_be_bytes(head.try_into().unwrap()))
}

fn take_len_prefixed(rest: &mut &[u8]) -> Result<Vec<u8>> {
    let len = take_u32(rest)? as usize;
    if rest.len() < len {
        return err_at!(CorruptedIndex, msg: "truncated data record field");
    }
    let (head, tail) = rest.split_at(len);
    *rest = tail;
    Ok(head.to_vec())
}

pub fn is_special_dn(dn: &[u8]) -> bool {
    dn.first() == Some(&b'@')
}

/// Linearise a DN into its canonical on-disk byte form. In this reference
/// implementation DNs already arrive linearised (tests construct them
/// directly); this function exists as the single seam a real DN parser
/// would plug into.
pub fn linearise_dn(dn: &[u8]) -> Vec<u8> {
    dn.to_vec()
}

/// Case-fold a linearised DN: ASCII-uppercase, matching the comparison rule
/// the original implementation uses for index and storage keys (spec §3
/// and SPEC_FULL §3 supplemental note).
pub fn casefold_dn(dn: &[u8]) -> Vec<u8> {
    dn.to_ascii_uppercase()
}

/// Extract the parent DN from a linearised DN, i.e. everything after the
/// first unescaped `,`. Returns `None` for a root DN with no parent.
pub fn parent_dn(dn: &[u8]) -> Option<Vec<u8>> {
    let mut depth = 0i32;
    let mut escaped = false;
    for (i, &b) in dn.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'"' => depth ^= 1,
            b',' if depth == 0 => return Some(dn[i + 1..].to_vec()),
            _ => (),
        }
    }
    None
}

/// Read an extended DN component, e.g. `<GUID=...>` embedded in a base DN,
/// giving O(1) base lookups without an `@IDXDN` round-trip (spec §4.5.1,
/// §6.3 "extended-component access"). Reference syntax: `<TAG=hex>` anywhere
/// in the DN bytes, case-insensitive tag match, hex-decoded value.
pub fn extended_component(dn: &[u8], tag: &str) -> Option<Vec<u8>> {
    let needle = format!("<{}=", tag.to_ascii_uppercase());
    let upper = dn.to_ascii_uppercase();
    let start = find_subslice(&upper, needle.as_bytes())? + needle.len();
    let end = start + find_subslice(&upper[start..], b">")?;
    hex_decode(&dn[start..end])
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn hex_decode(text: &[u8]) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(text.len() / 2);
    for pair in text.chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Some(out)
}

/// Whether a canonical value needs base64 encoding when embedded in a DN
/// (non-UTF8 bytes, or bytes that would be ambiguous in DN syntax: NUL,
/// leading/trailing space, a leading `#`).
pub fn needs_base64(value: &[u8]) -> bool {
    if std::str::from_utf8(value).is_err() {
        return true;
    }
    if value.is_empty() {
        return false;
    }
    if value[0] == b' ' || value[0] == b'#' || value[value.len() - 1] == b' ' {
        return true;
    }
    value
        .iter()
        .any(|&b| b == 0 || b == b',' || b == b'+' || b == b'"' || b == b'\\' || b == b'<' || b == b'>' || b == b';')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_dns_are_recognised() {
        assert!(is_special_dn(b"@INDEXLIST"));
        assert!(!is_special_dn(b"CN=a,DC=x"));
    }

    #[test]
    fn casefold_is_ascii_uppercase() {
        assert_eq!(casefold_dn(b"cn=a,dc=x"), b"CN=A,DC=X");
    }

    #[test]
    fn parent_dn_strips_first_rdn() {
        assert_eq!(parent_dn(b"CN=a,DC=x"), Some(b"DC=x".to_vec()));
        assert_eq!(parent_dn(b"DC=x"), None);
    }

    #[test]
    fn needs_base64_detects_binary_and_syntax_conflicts() {
        assert!(!needs_base64(b"plain"));
        assert!(needs_base64(b" leading-space"));
        assert!(needs_base64(&[0xff, 0xfe]));
        assert!(needs_base64(b"has,comma"));
    }

    #[test]
    fn eid_guid_mode_reads_configured_attribute() {
        let guid = Uuid::new_v4();
        let msg = Message::new(b"CN=a,DC=x".to_vec())
            .with_attr("objectGUID", vec![guid.as_bytes().to_vec()]);
        assert_eq!(msg.eid(Some("objectGUID")), Some(Eid::Guid(guid)));
    }

    #[test]
    fn eid_dn_mode_casefolds() {
        let msg = Message::new(b"cn=a,dc=x".to_vec());
        assert_eq!(msg.eid(None), Some(Eid::Dn(b"CN=A,DC=X".to_vec())));
    }

    #[test]
    fn encode_decode_round_trips() {
        let msg = Message::new(b"CN=a,DC=x".to_vec())
            .with_attr("cn", vec![b"a".to_vec()])
            .with_attr("sn", vec![b"x".to_vec(), b"y".to_vec()]);
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        assert!(Message::decode(&[0, 0, 0, 5, 1, 2]).is_err());
    }

    #[test]
    fn extended_component_reads_hex_payload() {
        let dn = b"<GUID=deadbeefdeadbeefdeadbeefdeadbeef>,DC=x".to_vec();
        let bytes = extended_component(&dn, "guid").unwrap();
        assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef, 0xde, 0xad, 0xbe, 0xef, 0xde, 0xad, 0xbe, 0xef, 0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn extended_component_absent_is_none() {
        assert_eq!(extended_component(b"CN=a,DC=x", "guid"), None);
    }
}
