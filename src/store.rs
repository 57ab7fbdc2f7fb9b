//! Append-only store file.
//!
//! The store is the byte sink of a segment: a file of length-prefixed frames,
//! one per record. Appends go through a buffered writer to coalesce syscalls;
//! reads flush that buffer first, then read positionally, so a record is
//! readable the moment its append returns. Byte positions handed out by
//! [`Store::append`] are the currency the index deals in.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Error;

/// Width of the big-endian length prefix in front of every frame.
pub(crate) const LEN_WIDTH: u64 = 8;

/// Mutable store state guarded by the store's mutex: the file handle used for
/// positional reads, the buffered writer layered over a cloned handle of the
/// same file, and the committed size in bytes.
#[derive(Debug)]
struct StoreInner {
    file: File,
    buf: BufWriter<File>,
    size: u64,
}

/// Append-only, length-prefixed byte file with buffered writes and random
/// reads by byte position.
///
/// On disk the store is a concatenation of frames, each
/// `[len: 8 bytes big-endian][payload: len bytes]`. The committed `size`
/// counts every byte including the prefixes. All access is serialized by an
/// internal mutex, so `&self` methods are safe to call from many threads.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    sync_on_append: bool,
    inner: Mutex<StoreInner>,
}

impl Store {
    /// Open (or create) the store file at `path`.
    ///
    /// The file is opened create+append+read: the kernel pins every write to
    /// the current end of file, and positional reads go through a second
    /// handle to the same description. The committed size starts at the
    /// file's current length, so reopening a store resumes where the last
    /// session left off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened or stat'ed.
    pub fn open(path: impl AsRef<Path>, sync_on_append: bool) -> Result<Store, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        let write_handle = file.try_clone()?;

        Ok(Store {
            path,
            sync_on_append,
            inner: Mutex::new(StoreInner {
                file,
                buf: BufWriter::new(write_handle),
                size,
            }),
        })
    }

    /// Append a payload as one length-prefixed frame.
    ///
    /// Returns `(bytes_written, position)`: the total frame size including
    /// the 8-byte prefix, and the byte position the frame starts at. The
    /// position is what the segment records in its index. The committed size
    /// only advances once the whole frame reached the writer, so a failed
    /// write never accounts for a partial frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on write (or, with `sync_on_append`, sync)
    /// failure.
    pub fn append(&self, p: &[u8]) -> Result<(u64, u64), Error> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let position = inner.size;
        inner.buf.write_all(&(p.len() as u64).to_be_bytes())?;
        inner.buf.write_all(p)?;

        let written = LEN_WIDTH + p.len() as u64;
        inner.size += written;

        if self.sync_on_append {
            inner.buf.flush()?;
            inner.file.sync_data()?;
        }

        Ok((written, position))
    }

    /// Read the payload of the frame starting at `position`.
    ///
    /// Flushes the write buffer first: the frame may have been appended and
    /// not yet reached the file, and positional reads bypass the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfData`] when `position` lies past the committed
    /// bytes, [`Error::Io`] on any other read failure.
    pub fn read(&self, position: u64) -> Result<Vec<u8>, Error> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.buf.flush()?;

        let mut len_bytes = [0u8; LEN_WIDTH as usize];
        inner
            .file
            .read_exact_at(&mut len_bytes, position)
            .map_err(eof_to_end_of_data)?;
        let len = u64::from_be_bytes(len_bytes);

        let mut payload = vec![0u8; len as usize];
        inner
            .file
            .read_exact_at(&mut payload, position + LEN_WIDTH)
            .map_err(eof_to_end_of_data)?;
        Ok(payload)
    }

    /// Fill `buf` from the store file starting at byte `offset`, returning
    /// the number of bytes read (zero at end of file).
    ///
    /// Flushes the write buffer first, then delegates to a positional file
    /// read. This is the primitive the log's concatenated reader is built on,
    /// so it speaks `io::Result` directly.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.buf.flush()?;
        inner.file.read_at(buf, offset)
    }

    /// Committed size in bytes, length prefixes included.
    pub fn size(&self) -> u64 {
        self.inner.lock().expect("store mutex poisoned").size
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered appends and commit file contents to stable storage.
    ///
    /// The file descriptor itself is released when the store is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the flush or sync fails.
    pub fn close(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.buf.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }
}

/// A positional read that runs off the end of the file means the caller asked
/// for data that was never committed.
fn eof_to_end_of_data(err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::UnexpectedEof {
        Error::EndOfData
    } else {
        Error::Io(err)
    }
}
