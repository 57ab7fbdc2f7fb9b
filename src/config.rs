//! Engine configuration for SeglogDB.
//!
//! The log carries a [`Config`] from open to close; each segment it creates
//! gets a copy. Zero-valued caps mean "use the default", so a
//! `Config::default()` is a fully usable configuration.

/// Default cap applied when a segment byte limit is left at zero.
const DEFAULT_SEGMENT_BYTES: u64 = 1024;

/// Configuration carried by a [`crate::log::Log`].
///
/// # Fields
///
/// * `segment` - Per-segment caps and the bootstrap offset.
/// * `sync_on_append` - When true, the store flushes its write buffer and
///   syncs file data after every append. Defaults to false: data is flushed
///   on read and on close, and reaches stable storage on close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Per-segment caps and the bootstrap offset.
    pub segment: SegmentConfig,
    /// Fsync after every append. Trades throughput for durability across
    /// process crash.
    pub sync_on_append: bool,
}

/// Per-segment limits.
///
/// # Fields
///
/// * `max_store_bytes` - Cap on a segment's store file size. Checked after
///   each append; reaching it seals the segment.
/// * `max_index_bytes` - Cap on a segment's index file size. Also the size of
///   the memory mapping, so it bounds the number of records per segment at
///   `max_index_bytes / 12`.
/// * `initial_offset` - Base offset of the first segment when bootstrapping
///   an empty log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Cap on a segment's store file size (rollover trigger).
    pub max_store_bytes: u64,
    /// Cap on a segment's index file size; determines the mmap window.
    pub max_index_bytes: u64,
    /// Base offset used when bootstrapping an empty log.
    pub initial_offset: u64,
}

impl Config {
    /// Returns a copy with zero-valued caps replaced by the defaults (1024
    /// bytes each). The log normalizes its configuration once, on open.
    pub(crate) fn normalized(mut self) -> Config {
        if self.segment.max_store_bytes == 0 {
            self.segment.max_store_bytes = DEFAULT_SEGMENT_BYTES;
        }
        if self.segment.max_index_bytes == 0 {
            self.segment.max_index_bytes = DEFAULT_SEGMENT_BYTES;
        }
        self
    }
}
