//! Core domain types for SeglogDB.
//!
//! This module defines the record type the log engine stores. The gRPC layer
//! has its own generated wire types (`crate::proto`); conversions between the
//! two live in the service module.

use bytes::Bytes;

/// A single log record: an opaque byte payload and the offset the log
/// assigned to it on append.
///
/// `Record` is a prost message, so the engine persists records in their
/// protobuf encoding. The payload is never interpreted by the log; the
/// `offset` field is overwritten by the active segment during append, and
/// callers should treat whatever value they pass in as ignored.
///
/// # Fields
///
/// * `value` - Opaque record payload.
/// * `offset` - Log-assigned 64-bit offset, globally monotonic within a log.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Record {
    /// Opaque record payload.
    #[prost(bytes = "bytes", tag = "1")]
    pub value: Bytes,
    /// Log-assigned offset. Overwritten on append.
    #[prost(uint64, tag = "2")]
    pub offset: u64,
}

impl Record {
    /// Build a record around a payload, leaving the offset for the log to
    /// assign.
    pub fn new(value: impl Into<Bytes>) -> Record {
        Record {
            value: value.into(),
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn record_new_leaves_offset_unassigned() {
        let record = Record::new(Bytes::from_static(b"hello"));
        assert_eq!(record.value, Bytes::from_static(b"hello"));
        assert_eq!(record.offset, 0);
    }

    #[test]
    fn record_round_trips_through_protobuf() {
        let record = Record {
            value: Bytes::from_static(b"hello world"),
            offset: 42,
        };

        let encoded = record.encode_to_vec();
        let decoded = Record::decode(encoded.as_slice()).expect("decode should succeed");
        assert_eq!(decoded, record);
    }

    #[test]
    fn record_clone_is_equal() {
        let record = Record {
            value: Bytes::from_static(b"payload"),
            offset: 7,
        };
        assert_eq!(record.clone(), record);
    }
}
