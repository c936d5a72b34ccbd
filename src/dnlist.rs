//! [DnList]: an ordered, duplicate-free collection of [Eid]s with the
//! union/intersect operators the planner needs (spec §4.1).

use crate::eid::Eid;

/// Ordered, duplicate-free collection of entry identifiers.
///
/// Invariants (spec §3): in GUID mode `ids` is sorted ascending with no
/// duplicates; `strict` forbids the optimistic shortcuts in [DnList::intersect]
/// that might otherwise drop ids — required for one-level results, which
/// must be exact.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DnList {
    ids: Vec<Eid>,
    strict: bool,
    guid_mode: bool,
}

impl DnList {
    pub fn new(guid_mode: bool) -> DnList {
        DnList {
            ids: Vec::new(),
            strict: false,
            guid_mode,
        }
    }

    pub fn from_ids(ids: Vec<Eid>, guid_mode: bool, strict: bool) -> DnList {
        DnList {
            ids,
            strict,
            guid_mode,
        }
    }

    pub fn single(id: Eid, guid_mode: bool) -> DnList {
        DnList {
            ids: vec![id],
            strict: false,
            guid_mode,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[Eid] {
        &self.ids
    }

    pub fn into_ids(self) -> Vec<Eid> {
        self.ids
    }

    pub fn guid_mode(&self) -> bool {
        self.guid_mode
    }

    /// `find(value) -> index|-1` per spec §4.1. GUID mode uses binary
    /// search over the sorted list; DN mode scans linearly, since
    /// (attr,value) lists are typically small.
    pub fn find(&self, id: &Eid) -> Option<usize> {
        if self.guid_mode {
            self.ids.binary_search(id).ok()
        } else {
            self.ids.iter().position(|existing| existing == id)
        }
    }

    pub fn contains(&self, id: &Eid) -> bool {
        self.find(id).is_some()
    }

    /// Insert `id` in sorted position (GUID mode only). Returns `true` when
    /// an exact duplicate already existed at the insertion point (spec §4.4.2
    /// step 5: "if an exact match already exists... emit a warning... but
    /// proceed").
    pub fn insert_sorted(&mut self, id: Eid, allow_duplicate: bool) -> bool {
        debug_assert!(self.guid_mode, "insert_sorted is only valid in GUID mode");
        match self.ids.binary_search(&id) {
            Ok(pos) => {
                if allow_duplicate {
                    self.ids.insert(pos, id);
                }
                true
            }
            Err(pos) => {
                self.ids.insert(pos, id);
                false
            }
        }
    }

    /// DN-mode append (spec §4.4.2 step 5: "DN mode: append the linearised
    /// DN bytes at the end").
    pub fn push_unordered(&mut self, id: Eid) {
        self.ids.push(id);
    }

    pub fn remove_at(&mut self, index: usize) -> Eid {
        self.ids.remove(index)
    }

    /// No-op in GUID mode (already sorted); sorts DN-mode lists for union.
    pub fn sort(&mut self) {
        if !self.guid_mode {
            self.ids.sort();
            self.ids.dedup();
        }
    }

    /// `union(a, b) -> a|b` (spec §4.1). Both sides are sorted first (a
    /// no-op in GUID mode), then merged with pairwise dedup; output buffer
    /// is sized at `|a|+|b|` and the tie-break consumes one id from each
    /// side when they compare equal.
    pub fn union(mut a: DnList, mut b: DnList) -> DnList {
        a.sort();
        b.sort();

        let strict = a.strict || b.strict;
        let guid_mode = a.guid_mode;
        let mut out = Vec::with_capacity(a.ids.len() + b.ids.len());

        let (mut i, mut j) = (0, 0);
        while i < a.ids.len() && j < b.ids.len() {
            match a.ids[i].cmp(&b.ids[j]) {
                std::cmp::Ordering::Less => {
                    out.push(a.ids[i].clone());
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(b.ids[j].clone());
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(a.ids[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&a.ids[i..]);
        out.extend_from_slice(&b.ids[j..]);

        DnList {
            ids: out,
            strict,
            guid_mode,
        }
    }

    /// `intersect(a, b) -> a & b` (spec §4.1).
    ///
    /// If either side is empty, the result is empty. When neither side is
    /// `strict` and one side has fewer than 2 entries while the other has
    /// more than 10, the indexing code is permitted to return the larger
    /// side unchanged — [crate::search::SearchDriver]'s re-filter will drop
    /// the extras. `strict` is the OR of both inputs; any strict input
    /// disables the shortcut and forces a proper intersection, iterating the
    /// shorter side and probing the longer one (binary search in GUID mode,
    /// linear scan in DN mode).
    pub fn intersect(a: DnList, b: DnList) -> DnList {
        let strict = a.strict || b.strict;
        let guid_mode = a.guid_mode;

        if a.ids.is_empty() || b.ids.is_empty() {
            return DnList {
                ids: Vec::new(),
                strict,
                guid_mode,
            };
        }

        if !strict && (a.ids.len() < 2 && b.ids.len() > 10) {
            let mut out = b;
            out.strict = strict;
            return out;
        }
        if !strict && (b.ids.len() < 2 && a.ids.len() > 10) {
            let mut out = a;
            out.strict = strict;
            return out;
        }

        let (shorter, longer) = if a.ids.len() <= b.ids.len() {
            (&a, &b)
        } else {
            (&b, &a)
        };

        let mut out = Vec::new();
        for id in shorter.ids.iter() {
            if longer.contains(id) {
                out.push(id.clone());
            }
        }
        out.sort();
        out.dedup();

        DnList {
            ids: out,
            strict,
            guid_mode,
        }
    }
}
