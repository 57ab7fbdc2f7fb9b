//! Memory-mapped offset index.
//!
//! The index gives a segment constant-time lookup from a record's relative
//! offset to the byte position of its frame in the store file. Entries are
//! fixed-width, so entry `n` always lives at byte `n * 12` and lookups are a
//! single slice read on the mapping, with no syscall.
//!
//! The file is grown to the configured maximum before mapping: the mapping
//! cannot be extended mid-flight, so the headroom has to exist up front. On
//! close the file is truncated back down to the bytes actually written, which
//! is how a reopen recomputes how many entries the index holds.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::Error;

/// Width of the relative-offset half of an entry.
pub(crate) const OFF_WIDTH: u64 = 4;
/// Width of the position half of an entry.
pub(crate) const POS_WIDTH: u64 = 8;
/// Total entry width: `[rel_offset: u32 BE][position: u64 BE]`.
pub(crate) const ENT_WIDTH: u64 = OFF_WIDTH + POS_WIDTH;

/// Fixed-width, memory-mapped map from relative record offset to store byte
/// position.
///
/// `size` is the logical size: the number of bytes holding valid entries.
/// Between open and close the file itself is `max_index_bytes` long, so the
/// logical size is tracked here rather than read from the file's length.
///
/// The index carries no lock of its own. Writes are serialized by the log's
/// write lock; reads on the mapping are plain slice reads, safe under the
/// log's read lock.
#[derive(Debug)]
pub struct Index {
    file: File,
    path: PathBuf,
    mmap: MmapMut,
    size: u64,
}

impl Index {
    /// Open (or create) the index file at `path` and map it read-write.
    ///
    /// Records the file's real length as the logical size first, then grows
    /// the file to `max_index_bytes` so the mapping covers the whole
    /// configured window and future writes land in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened, grown, or mapped.
    pub fn open(path: impl AsRef<Path>, max_index_bytes: u64) -> Result<Index, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        file.set_len(max_index_bytes)?;

        // SAFETY: the file stays open for the lifetime of the mapping and the
        // directory is owned by this process; nothing external resizes the
        // file underneath the map.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Index {
            file,
            path,
            mmap,
            size,
        })
    }

    /// Read the entry for relative offset `input`, or the last entry when
    /// `input` is `-1`.
    ///
    /// Returns `(rel_offset, position)` as stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfData`] when the index is empty or `input` lies
    /// past the last written entry.
    pub fn read(&self, input: i64) -> Result<(u32, u64), Error> {
        if self.size == 0 {
            return Err(Error::EndOfData);
        }

        let rel = if input == -1 {
            ((self.size / ENT_WIDTH) - 1) as u32
        } else {
            input as u32
        };

        let start = u64::from(rel) * ENT_WIDTH;
        if self.size < start + ENT_WIDTH {
            return Err(Error::EndOfData);
        }

        let start = start as usize;
        let mut off_bytes = [0u8; OFF_WIDTH as usize];
        off_bytes.copy_from_slice(&self.mmap[start..start + OFF_WIDTH as usize]);
        let mut pos_bytes = [0u8; POS_WIDTH as usize];
        pos_bytes.copy_from_slice(&self.mmap[start + OFF_WIDTH as usize..start + ENT_WIDTH as usize]);

        Ok((u32::from_be_bytes(off_bytes), u64::from_be_bytes(pos_bytes)))
    }

    /// Append an entry mapping `rel_offset` to `position`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfData`] when the mapped window has no room for
    /// another entry; the segment treats that as "full".
    pub fn write(&mut self, rel_offset: u32, position: u64) -> Result<(), Error> {
        if (self.mmap.len() as u64) < self.size + ENT_WIDTH {
            return Err(Error::EndOfData);
        }

        let start = self.size as usize;
        self.mmap[start..start + OFF_WIDTH as usize].copy_from_slice(&rel_offset.to_be_bytes());
        self.mmap[start + OFF_WIDTH as usize..start + ENT_WIDTH as usize]
            .copy_from_slice(&position.to_be_bytes());
        self.size += ENT_WIDTH;
        Ok(())
    }

    /// Logical size in bytes (a multiple of the entry width).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the mapping synchronously, commit the file to stable storage,
    /// and truncate it back to the logical size.
    ///
    /// The truncation is what makes the on-disk length meaningful again: a
    /// reopen reads it to learn how many entries the index holds. The file
    /// descriptor and mapping are released when the index is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the flush, sync, or truncate fails.
    pub fn close(&mut self) -> Result<(), Error> {
        self.mmap.flush()?;
        self.file.sync_all()?;
        self.file.set_len(self.size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_INDEX_BYTES: u64 = 1024;

    #[test]
    fn read_on_empty_index_is_end_of_data() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let index =
            Index::open(dir.path().join("a.index"), MAX_INDEX_BYTES).expect("open should succeed");

        assert!(matches!(index.read(-1), Err(Error::EndOfData)));
        assert!(matches!(index.read(0), Err(Error::EndOfData)));
    }

    #[test]
    fn written_entries_read_back() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let mut index =
            Index::open(dir.path().join("a.index"), MAX_INDEX_BYTES).expect("open should succeed");

        let entries: &[(u32, u64)] = &[(0, 0), (1, 10)];
        for &(rel, pos) in entries {
            index.write(rel, pos).expect("write should succeed");
            let (got_rel, got_pos) = index.read(i64::from(rel)).expect("read should succeed");
            assert_eq!(got_rel, rel);
            assert_eq!(got_pos, pos);
        }

        // Reading one past the last written entry fails.
        assert!(matches!(
            index.read(entries.len() as i64),
            Err(Error::EndOfData)
        ));
    }

    #[test]
    fn read_minus_one_returns_last_entry() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let mut index =
            Index::open(dir.path().join("a.index"), MAX_INDEX_BYTES).expect("open should succeed");

        index.write(0, 0).expect("write should succeed");
        index.write(1, 10).expect("write should succeed");
        index.write(2, 25).expect("write should succeed");

        let (rel, pos) = index.read(-1).expect("read should succeed");
        assert_eq!(rel, 2);
        assert_eq!(pos, 25);
    }

    #[test]
    fn write_past_mapped_window_is_end_of_data() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        // Room for exactly three entries.
        let mut index =
            Index::open(dir.path().join("a.index"), 3 * ENT_WIDTH).expect("open should succeed");

        for i in 0..3u32 {
            index.write(i, u64::from(i) * 19).expect("write should succeed");
        }
        assert!(matches!(index.write(3, 57), Err(Error::EndOfData)));
        assert_eq!(index.size(), 3 * ENT_WIDTH);
    }

    #[test]
    fn close_truncates_file_to_logical_size() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("a.index");

        let mut index = Index::open(&path, MAX_INDEX_BYTES).expect("open should succeed");
        index.write(0, 0).expect("write should succeed");
        index.write(1, 19).expect("write should succeed");

        // While open the file spans the whole mapped window.
        assert_eq!(
            std::fs::metadata(&path).expect("stat should succeed").len(),
            MAX_INDEX_BYTES
        );

        index.close().expect("close should succeed");
        drop(index);
        assert_eq!(
            std::fs::metadata(&path).expect("stat should succeed").len(),
            2 * ENT_WIDTH
        );
    }

    #[test]
    fn reopen_recovers_entries_and_size() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("a.index");

        {
            let mut index = Index::open(&path, MAX_INDEX_BYTES).expect("open should succeed");
            index.write(0, 0).expect("write should succeed");
            index.write(1, 19).expect("write should succeed");
            index.close().expect("close should succeed");
        }

        let index = Index::open(&path, MAX_INDEX_BYTES).expect("reopen should succeed");
        assert_eq!(index.size(), 2 * ENT_WIDTH);
        let (rel, pos) = index.read(-1).expect("read should succeed");
        assert_eq!(rel, 1);
        assert_eq!(pos, 19);
    }
}
