//! Entry identifiers (spec §3 "Entry identifier (Eid)").
//!
//! An [Eid] is either the linearised, case-folded DN of a message, or a raw
//! 16-byte GUID. Which variant is in play is a process-wide, once-per-open
//! decision (see [crate::config::Config::guid_attr]); this crate does not
//! support mixing the two within one database.

use std::cmp::Ordering;

use uuid::Uuid;

/// The engine-internal identifier for a data record (spec GLOSSARY "Eid").
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Eid {
    /// Linearised, case-folded DN bytes.
    Dn(Vec<u8>),
    /// Raw 16-byte GUID, taken from the configured GUID attribute.
    Guid(Uuid),
}

impl Eid {
    /// `true` when this Eid is the GUID variant.
    pub fn is_guid(&self) -> bool {
        matches!(self, Eid::Guid(_))
    }

    pub fn as_dn(&self) -> Option<&[u8]> {
        match self {
            Eid::Dn(dn) => Some(dn.as_slice()),
            Eid::Guid(_) => None,
        }
    }

    pub fn as_guid(&self) -> Option<&Uuid> {
        match self {
            Eid::Guid(guid) => Some(guid),
            Eid::Dn(_) => None,
        }
    }
}

// GUID mode sorts ascending by memcmp over the 16 raw bytes; `Uuid`'s
// derived byte-wise ordering is exactly that comparator (spec §3, §4.1).
// DN mode has no meaningful total order beyond byte comparison of the
// linearised DN, used only when `DnList::sort` is invoked for union.
impl Ord for Eid {
    fn cmp(&self, other: &Eid) -> Ordering {
        match (self, other) {
            (Eid::Guid(a), Eid::Guid(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Eid::Dn(a), Eid::Dn(b)) => a.cmp(b),
            // Mixing modes never happens in a single database; order
            // deterministically anyway rather than panic.
            (Eid::Dn(_), Eid::Guid(_)) => Ordering::Less,
            (Eid::Guid(_), Eid::Dn(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Eid {
    fn partial_cmp(&self, other: &Eid) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
