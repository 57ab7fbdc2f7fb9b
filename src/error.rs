//! Error types for SeglogDB.
//!
//! This module defines the unified error enum used throughout the crate. All
//! fallible operations return `Result<T, Error>`. The gRPC service layer maps
//! these variants to appropriate gRPC status codes.

/// Unified error type for all SeglogDB operations.
///
/// Each variant represents a distinct failure mode. The gRPC layer maps
/// variants to status codes:
///
/// - `OffsetOutOfRange` -> `NOT_FOUND`
/// - `EndOfData` -> `OUT_OF_RANGE`
/// - `Io` -> `INTERNAL`
/// - `Decode` -> `DATA_LOSS`
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A store or index read ran past the committed data, or an index write
    /// ran past the mapped window. On the write path this means the segment
    /// is full; on the read path it means the caller asked for an entry that
    /// was never written.
    #[error("end of data")]
    EndOfData,

    /// The requested absolute offset is not covered by any segment.
    #[error("offset out of range: {offset}")]
    OffsetOutOfRange {
        /// The offset the caller asked for.
        offset: u64,
    },

    /// An I/O error occurred during a file operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be decoded.
    #[error("record decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_of_data_display() {
        assert_eq!(Error::EndOfData.to_string(), "end of data");
    }

    #[test]
    fn offset_out_of_range_display_includes_offset() {
        let err = Error::OffsetOutOfRange { offset: 42 };
        let msg = err.to_string();
        assert!(msg.contains("42"), "expected '42' in: {msg}");
        assert!(
            msg.contains("offset out of range"),
            "expected 'offset out of range' in: {msg}"
        );
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
        let msg = err.to_string();
        assert!(msg.contains("I/O error"), "expected 'I/O error' in: {msg}");
    }

    #[test]
    fn io_error_question_mark_coercion() {
        fn fallible() -> Result<(), Error> {
            let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
            Err(io_err)?
        }

        let result = fallible();
        assert!(matches!(result.unwrap_err(), Error::Io(_)));
    }

    #[test]
    fn decode_error_from_conversion() {
        // A length-delimited field cut short is enough to trip the decoder.
        let result = <crate::types::Record as prost::Message>::decode(&[0x0a, 0x05, 0x61][..]);
        let err = Error::from(result.unwrap_err());
        assert!(matches!(err, Error::Decode(_)));
    }
}
