//! Log segments.
//!
//! A segment pairs one store file with one index file under a shared base
//! offset, the absolute offset of its first record. The pair is named after
//! that base: `<base>.store` and `<base>.index`. The segment owns the
//! translation between absolute offsets (what callers speak) and relative
//! offsets (what the index stores as u32), and reports when either file has
//! reached its cap so the log can roll to a successor.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use prost::Message;

use crate::config::Config;
use crate::error::Error;
use crate::index::Index;
use crate::store::Store;
use crate::types::Record;

/// A store+index pair covering a contiguous offset range.
///
/// `next_offset` is the absolute offset the next append will receive. The
/// index is the source of truth when seeding it on reopen: any store bytes
/// past the last indexed record (say, after a crash before the index reached
/// disk) are dead space and are never assigned an offset again.
#[derive(Debug)]
pub struct Segment {
    store: Arc<Store>,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: Config,
}

impl Segment {
    /// Open (or create) the segment with the given base offset in `dir`.
    ///
    /// Opens both files, then seeds `next_offset` from the index: one past
    /// the last indexed record if there is one, the base offset otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if either file cannot be opened.
    pub fn open(dir: &Path, base_offset: u64, config: Config) -> Result<Segment, Error> {
        let store = Arc::new(Store::open(
            dir.join(format!("{base_offset}.store")),
            config.sync_on_append,
        )?);
        let index = Index::open(
            dir.join(format!("{base_offset}.index")),
            config.segment.max_index_bytes,
        )?;

        let next_offset = match index.read(-1) {
            Ok((last_rel, _)) => base_offset + u64::from(last_rel) + 1,
            Err(Error::EndOfData) => base_offset,
            Err(e) => return Err(e),
        };

        Ok(Segment {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Append a record, assigning it this segment's next offset.
    ///
    /// Two steps: the encoded record goes to the store, then the returned
    /// byte position goes to the index under the record's relative offset.
    /// If the store append fails no index entry is written; if the index
    /// write fails the stored frame is left behind as dead space and the
    /// offset is not consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfData`] when the index has no room left, or
    /// [`Error::Io`] on store failure.
    pub fn append(&mut self, mut record: Record) -> Result<u64, Error> {
        let offset = self.next_offset;
        record.offset = offset;

        let encoded = record.encode_to_vec();
        let (_, position) = self.store.append(&encoded)?;
        self.index
            .write((offset - self.base_offset) as u32, position)?;

        self.next_offset += 1;
        Ok(offset)
    }

    /// Read the record stored at the given absolute offset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfData`] when the offset lies past this segment's
    /// records, [`Error::Io`] / [`Error::Decode`] on store or decode failure.
    pub fn read(&self, offset: u64) -> Result<Record, Error> {
        let (_, position) = self.index.read((offset - self.base_offset) as i64)?;
        let encoded = self.store.read(position)?;
        let record = Record::decode(encoded.as_slice())?;
        Ok(record)
    }

    /// Whether either file has reached its cap.
    ///
    /// The thresholds are inclusive: a segment whose last append landed it
    /// exactly on a cap is full. The log checks this after every append to
    /// decide when to roll.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.segment.max_store_bytes
            || self.index.size() >= self.config.segment.max_index_bytes
    }

    /// Absolute offset of this segment's first record.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Absolute offset the next append would receive.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Shared handle to this segment's store, for the log's concatenated
    /// reader.
    pub(crate) fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Close the segment and delete both of its files.
    ///
    /// # Errors
    ///
    /// Returns the close error, or [`Error::Io`] if either unlink fails.
    pub fn remove(&mut self) -> Result<(), Error> {
        self.close()?;
        fs::remove_file(self.index.path())?;
        fs::remove_file(self.store.path())?;
        Ok(())
    }

    /// Close the index (flush mapping, sync, truncate to size) and then the
    /// store (flush buffer, sync).
    ///
    /// Both closes are attempted even if the first fails; the first error is
    /// the one returned.
    pub fn close(&mut self) -> Result<(), Error> {
        let index_result = self.index.close();
        let store_result = self.store.close();
        index_result?;
        store_result
    }
}
