//! The segmented commit log.
//!
//! A `Log` owns an ordered collection of segments in one directory. The last
//! segment is always the active one: it is the only segment that accepts
//! appends, and when an append fills it the log opens a successor whose base
//! is the last assigned offset plus one. Reads are routed to whichever
//! segment's offset range covers the requested offset.
//!
//! A readers-writer lock guards the segment list: appends and lifecycle
//! operations take the write lock, reads and offset queries take the read
//! lock, so many readers coexist with one writer.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::error::Error;
use crate::segment::Segment;
use crate::store::Store;
use crate::types::Record;

/// Ordered collection of segments with a single active (last) segment.
#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    config: Config,
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Open the log rooted at `dir`, creating the directory if needed.
    ///
    /// Scans the directory for segment files, collects their base offsets
    /// into an ordered set (each segment contributes a `.store` and an
    /// `.index` file with the same stem, so the set collapses the pair), and
    /// opens one segment per base in ascending order. A directory with no
    /// segments gets a fresh one at the configured initial offset.
    ///
    /// Zero-valued caps in `config` are replaced by their defaults first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be scanned or a segment
    /// cannot be opened.
    pub fn open(dir: impl AsRef<Path>, config: Config) -> Result<Log, Error> {
        let dir = dir.as_ref().to_path_buf();
        let config = config.normalized();
        fs::create_dir_all(&dir)?;

        let mut bases = BTreeSet::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(base) = stem.parse::<u64>() {
                bases.insert(base);
            }
        }

        let mut segments = Vec::with_capacity(bases.len().max(1));
        for base in bases {
            segments.push(Segment::open(&dir, base, config)?);
        }
        if segments.is_empty() {
            segments.push(Segment::open(&dir, config.segment.initial_offset, config)?);
        }

        tracing::debug!(
            dir = %dir.display(),
            segments = segments.len(),
            "opened log"
        );

        Ok(Log {
            dir,
            config,
            segments: RwLock::new(segments),
        })
    }

    /// Append a record to the active segment and return its assigned offset.
    ///
    /// If the append leaves the active segment at either of its caps, a new
    /// segment is opened at `offset + 1` and becomes active, so the next
    /// append lands in the successor.
    ///
    /// # Errors
    ///
    /// Propagates segment append errors; returns [`Error::Io`] if the
    /// rollover segment cannot be created.
    pub fn append(&self, record: Record) -> Result<u64, Error> {
        let mut segments = self.segments.write().expect("log lock poisoned");

        let active = segments.last_mut().expect("segment list is never empty");
        let offset = active.append(record)?;

        if active.is_maxed() {
            tracing::debug!(base_offset = offset + 1, "rolling to a new active segment");
            let segment = Segment::open(&self.dir, offset + 1, self.config)?;
            segments.push(segment);
        }

        Ok(offset)
    }

    /// Read the record stored at the given absolute offset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OffsetOutOfRange`] when no segment's range covers
    /// `offset`.
    pub fn read(&self, offset: u64) -> Result<Record, Error> {
        let segments = self.segments.read().expect("log lock poisoned");

        let segment = segments
            .iter()
            .find(|s| s.base_offset() <= offset && offset < s.next_offset());
        match segment {
            Some(segment) => segment.read(offset),
            None => Err(Error::OffsetOutOfRange { offset }),
        }
    }

    /// Offset of the oldest record still held by the log.
    pub fn lowest_offset(&self) -> u64 {
        let segments = self.segments.read().expect("log lock poisoned");
        segments
            .first()
            .expect("segment list is never empty")
            .base_offset()
    }

    /// Offset of the newest record, or 0 for a log that has never been
    /// appended to.
    pub fn highest_offset(&self) -> u64 {
        let segments = self.segments.read().expect("log lock poisoned");
        let next = segments
            .last()
            .expect("segment list is never empty")
            .next_offset();
        if next == 0 { 0 } else { next - 1 }
    }

    /// Remove every segment whose records all have offsets at or below
    /// `lowest`.
    ///
    /// A segment qualifies when its `next_offset <= lowest + 1`, i.e. its
    /// highest record offset is `<= lowest`. Removal is attempted for every
    /// qualifying segment even if one fails; the first error is returned and
    /// the surviving segments stay in the list.
    pub fn truncate(&self, lowest: u64) -> Result<(), Error> {
        let mut segments = self.segments.write().expect("log lock poisoned");

        let old = std::mem::take(&mut *segments);
        let mut first_err = None;
        for mut segment in old {
            if segment.next_offset() <= lowest + 1 {
                tracing::info!(
                    base_offset = segment.base_offset(),
                    "removing truncated segment"
                );
                if let Err(e) = segment.remove() {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                continue;
            }
            segments.push(segment);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// A sequential reader over the whole log: the contents of every
    /// segment's store file, concatenated in base-offset order. Used for
    /// snapshot export.
    ///
    /// The reader holds its own handles to the stores, so it stays valid
    /// while the log keeps appending; it observes at least the records
    /// committed before it was created.
    pub fn reader(&self) -> LogReader {
        let segments = self.segments.read().expect("log lock poisoned");
        LogReader {
            stores: segments.iter().map(Segment::store).collect(),
            current: 0,
            position: 0,
        }
    }

    /// Close every segment in order, flushing buffered state first.
    ///
    /// Every segment is closed even if an earlier one fails; the first error
    /// is the one returned.
    pub fn close(&self) -> Result<(), Error> {
        let mut segments = self.segments.write().expect("log lock poisoned");

        let mut first_err = None;
        for segment in segments.iter_mut() {
            if let Err(e) = segment.close() {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close the log and delete its directory tree.
    pub fn remove(&self) -> Result<(), Error> {
        self.close()?;
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

/// Sequential byte reader concatenating the log's store files in base-offset
/// order.
///
/// Each store is read positionally from byte 0; when one store is exhausted
/// the cursor moves to the next. Store reads flush the write buffer first, so
/// the reader never misses a committed record.
#[derive(Debug)]
pub struct LogReader {
    stores: Vec<Arc<Store>>,
    current: usize,
    position: u64,
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.current < self.stores.len() {
            let n = self.stores[self.current].read_at(buf, self.position)?;
            if n == 0 {
                self.current += 1;
                self.position = 0;
                continue;
            }
            self.position += n as u64;
            return Ok(n);
        }

        Ok(0)
    }
}
