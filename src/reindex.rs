//! Full index rebuild (spec §4.8): purge, rekey storage keys that changed
//! mode, then rebuild every index from the surviving data records.

use log::{error, warn};

use crate::{
    config::Config,
    dnlist::DnList,
    err_at,
    keycodec::data_record_key,
    kvstore::KvStore,
    message::Message,
    store::IndexStore,
    writer::IndexWriter,
    Error, Result,
};

const PROGRESS_INTERVAL: usize = 10_000;

/// Accumulates reindex progress; logged at [PROGRESS_INTERVAL] and returned
/// to the caller on success (spec §4.8 "Progress: emit a warning every
/// 10,000 records").
#[derive(Default, Debug, Clone)]
pub struct ReindexProgress {
    pub scanned: usize,
    pub rewritten: usize,
    pub first_error: Option<Error>,
}

pub struct Reindexer<'a> {
    store: &'a IndexStore<'a>,
    writer: &'a IndexWriter<'a>,
    kv: &'a dyn KvStore,
    config: &'a Config,
}

impl<'a> Reindexer<'a> {
    pub fn new(
        store: &'a IndexStore<'a>,
        writer: &'a IndexWriter<'a>,
        kv: &'a dyn KvStore,
        config: &'a Config,
    ) -> Reindexer<'a> {
        Reindexer { store, writer, kv, config }
    }

    pub fn run(&self) -> Result<ReindexProgress> {
        if self.config.read_only {
            return err_at!(NotImplemented, msg: "reindex is forbidden on a read-only database");
        }

        // Step 1 (schema/index cache reload) is the caller's responsibility;
        // this crate consults whatever `Config`/`Schema` it was given.

        // Step 2: cancel and reopen, dropping any prior in-flight state.
        let _ = self.store.tx_cancel();
        self.store.tx_begin()?;

        let mut progress = ReindexProgress::default();

        self.stage_empty_index_records()?;
        self.rekey_pass(&mut progress)?;
        self.reindex_pass(&mut progress)?;

        let commit_result = self.store.tx_commit();
        match progress.first_error.clone() {
            Some(err) => Err(err),
            None => commit_result.map(|_| progress),
        }
    }

    /// Step 3: stage an empty list for every existing `@INDEX:...`/
    /// `@INDEX#...` record so it is rebuilt from scratch in step 5.
    fn stage_empty_index_records(&self) -> Result<()> {
        let guid_mode = self.config.is_guid_mode();
        self.kv.iterate(&mut |key, _value| {
            if is_index_record_key(key) {
                let logical = &key[3..]; // strip the "DN=" wrapper
                self.store.store(logical, DnList::new(guid_mode))?;
            }
            Ok(true)
        })
    }

    /// Step 4: give every non-`@` data record the storage key the current
    /// mode would assign it, replacing it in place if it differs.
    fn rekey_pass(&self, progress: &mut ReindexProgress) -> Result<()> {
        self.kv.iterate(&mut |key, value| {
            if is_special_key(key) {
                return Ok(true);
            }
            note_progress(progress);

            match Message::decode(value) {
                Ok(msg) => match msg.eid(self.config.guid_attr.as_deref()) {
                    Some(eid) => {
                        let expected = data_record_key(&eid, None);
                        if expected != key {
                            match self.kv.rekey(key, &expected, value) {
                                Ok(()) => progress.rewritten += 1,
                                Err(e) => record_first_error(progress, e),
                            }
                        }
                    }
                    None => record_first_error(
                        progress,
                        crate::error::Error::CorruptedIndex(
                            "reindex::rekey_pass".into(),
                            "data record is missing its identifying attribute".into(),
                        ),
                    ),
                },
                Err(e) => record_first_error(progress, e),
            }
            Ok(true)
        })
    }

    /// Step 5: rebuild every index family from the surviving data records.
    fn reindex_pass(&self, progress: &mut ReindexProgress) -> Result<()> {
        self.kv.iterate(&mut |key, value| {
            if is_special_key(key) {
                return Ok(true);
            }
            match Message::decode(value) {
                Ok(msg) => {
                    if let Err(e) = self.writer.add_new(&msg) {
                        record_first_error(progress, e);
                    }
                }
                Err(e) => record_first_error(progress, e),
            }
            Ok(true)
        })
    }
}

fn note_progress(progress: &mut ReindexProgress) {
    progress.scanned += 1;
    if progress.scanned % PROGRESS_INTERVAL == 0 {
        warn!("reindex: {} records scanned so far", progress.scanned);
    }
}

fn record_first_error(progress: &mut ReindexProgress, err: Error) {
    error!("reindex: {}", err);
    if progress.first_error.is_none() {
        progress.first_error = Some(err);
    }
}

/// Any `@`-prefixed special record: index records, `@INDEXLIST`, `@BASEINFO`.
fn is_special_key(key: &[u8]) -> bool {
    key.starts_with(b"DN=@")
}

/// `DN=@INDEX:...`/`DN=@INDEX#...` specifically (spec §4.8 step 3) — not
/// `@INDEXLIST`, which shares the `@INDEX` byte prefix but is a distinct
/// control record that must not be wiped by the rebuild.
fn is_index_record_key(key: &[u8]) -> bool {
    const PREFIX: &[u8] = b"DN=@INDEX";
    key.len() > PREFIX.len() && key[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) && matches!(key[PREFIX.len()], b':' | b'#')
}
