//! gRPC service layer for SeglogDB.
//!
//! This module defines the narrow capability the service consumes -- the
//! [`CommitLog`] trait -- and the `SeglogService` that implements the
//! generated `Log` service on top of it, along with conversion helpers that
//! translate between protobuf types and domain types and map domain errors
//! to gRPC status codes.

// `tonic::Status` is large enough to trigger clippy::result_large_err. This
// is inherent to tonic's API -- every gRPC handler returns
// `Result<T, tonic::Status>`. Suppressed at module level since all handlers
// and helpers share the pattern.
#![allow(clippy::result_large_err)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;

use crate::error::Error;
use crate::log::Log;
use crate::proto;
use crate::types::Record;

/// How long a tailing consume stream sleeps after catching up with the head
/// of the log before probing again.
const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The capability the service layer consumes from the log.
///
/// The production implementation is [`Log`]; tests substitute in-memory
/// doubles. Handlers hold it as `Arc<dyn CommitLog>`, so anything
/// thread-safe that can append, read, and report its offset bounds fits.
pub trait CommitLog: Send + Sync {
    /// Append a record, returning its assigned offset.
    fn append(&self, record: Record) -> Result<u64, Error>;
    /// Read the record at an absolute offset.
    fn read(&self, offset: u64) -> Result<Record, Error>;
    /// Offset of the oldest record held.
    fn lowest_offset(&self) -> u64;
    /// Offset of the newest record, or 0 when empty.
    fn highest_offset(&self) -> u64;
}

impl CommitLog for Log {
    fn append(&self, record: Record) -> Result<u64, Error> {
        Log::append(self, record)
    }

    fn read(&self, offset: u64) -> Result<Record, Error> {
        Log::read(self, offset)
    }

    fn lowest_offset(&self) -> u64 {
        Log::lowest_offset(self)
    }

    fn highest_offset(&self) -> u64 {
        Log::highest_offset(self)
    }
}

/// gRPC service implementation for SeglogDB.
///
/// Holds the single dependency every handler needs: the commit log behind
/// the [`CommitLog`] facade.
pub struct SeglogService {
    /// The log the handlers append to and read from.
    log: Arc<dyn CommitLog>,
}

impl SeglogService {
    /// Create a new `SeglogService` over the given commit log.
    pub fn new(log: Arc<dyn CommitLog>) -> Self {
        Self { log }
    }
}

/// Type alias for the server-streaming responses used by the streaming RPCs.
type ResponseStream<T> =
    std::pin::Pin<Box<dyn futures_core::Stream<Item = Result<T, tonic::Status>> + Send>>;

#[tonic::async_trait]
impl proto::log_server::Log for SeglogService {
    /// Append one record to the log.
    ///
    /// Validates that the request carries a record, delegates to the commit
    /// log, and returns the assigned offset.
    async fn produce(
        &self,
        request: tonic::Request<proto::ProduceRequest>,
    ) -> Result<tonic::Response<proto::ProduceResponse>, tonic::Status> {
        counter!("seglog_produce_total", "rpc" => "produce").increment(1);
        let req = request.into_inner();

        let record = req
            .record
            .ok_or_else(|| tonic::Status::invalid_argument("record must be set"))?;

        let offset = self
            .log
            .append(proto_to_record(record))
            .map_err(error_to_status)?;

        Ok(tonic::Response::new(proto::ProduceResponse { offset }))
    }

    /// Read the record stored at the requested offset.
    ///
    /// Maps the log's typed out-of-range condition to `NOT_FOUND`.
    async fn consume(
        &self,
        request: tonic::Request<proto::ConsumeRequest>,
    ) -> Result<tonic::Response<proto::ConsumeResponse>, tonic::Status> {
        counter!("seglog_consume_total", "rpc" => "consume").increment(1);
        let req = request.into_inner();

        let record = self.log.read(req.offset).map_err(error_to_status)?;

        Ok(tonic::Response::new(proto::ConsumeResponse {
            record: Some(record_to_proto(&record)),
        }))
    }

    type ProduceStreamStream = ResponseStream<proto::ProduceResponse>;

    /// Bidirectional streaming appends: one response per request, in order.
    ///
    /// The stream ends when the client closes its side; the first failed
    /// append ends it with that error.
    async fn produce_stream(
        &self,
        request: tonic::Request<tonic::Streaming<proto::ProduceRequest>>,
    ) -> Result<tonic::Response<Self::ProduceStreamStream>, tonic::Status> {
        let mut inbound = request.into_inner();
        // Owned handle so the returned stream is `'static` rather than
        // borrowing `&self`.
        let log = Arc::clone(&self.log);

        let outbound = async_stream::stream! {
            loop {
                match inbound.message().await {
                    Ok(Some(req)) => {
                        counter!("seglog_produce_total", "rpc" => "produce_stream")
                            .increment(1);
                        let Some(record) = req.record else {
                            yield Err(tonic::Status::invalid_argument("record must be set"));
                            return;
                        };
                        match log.append(proto_to_record(record)) {
                            Ok(offset) => yield Ok(proto::ProduceResponse { offset }),
                            Err(e) => {
                                yield Err(error_to_status(e));
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(status) => {
                        yield Err(status);
                        return;
                    }
                }
            }
        };

        Ok(tonic::Response::new(Box::pin(outbound)))
    }

    type ConsumeStreamStream = ResponseStream<proto::ConsumeResponse>;

    /// Server-streaming reads from the requested offset onward.
    ///
    /// Streams every committed record in offset order and then follows the
    /// tail: when the cursor catches up with the head of the log the handler
    /// sleeps briefly and probes again, so records appended later keep
    /// flowing to the client. The stream ends when the client disconnects or
    /// a non-boundary error surfaces.
    async fn consume_stream(
        &self,
        request: tonic::Request<proto::ConsumeRequest>,
    ) -> Result<tonic::Response<Self::ConsumeStreamStream>, tonic::Status> {
        let req = request.into_inner();
        let log = Arc::clone(&self.log);

        let outbound = async_stream::stream! {
            let mut offset = req.offset;
            loop {
                match log.read(offset) {
                    Ok(record) => {
                        counter!("seglog_consume_total", "rpc" => "consume_stream")
                            .increment(1);
                        offset += 1;
                        yield Ok(proto::ConsumeResponse {
                            record: Some(record_to_proto(&record)),
                        });
                    }
                    Err(Error::OffsetOutOfRange { .. }) => {
                        tokio::time::sleep(TAIL_POLL_INTERVAL).await;
                    }
                    Err(e) => {
                        yield Err(error_to_status(e));
                        return;
                    }
                }
            }
        };

        Ok(tonic::Response::new(Box::pin(outbound)))
    }

    /// Report the offset range currently covered by the log.
    async fn get_offsets(
        &self,
        _request: tonic::Request<proto::OffsetsRequest>,
    ) -> Result<tonic::Response<proto::OffsetsResponse>, tonic::Status> {
        Ok(tonic::Response::new(proto::OffsetsResponse {
            lowest: self.log.lowest_offset(),
            highest: self.log.highest_offset(),
        }))
    }
}

/// Convert a wire record into the domain record the log stores.
fn proto_to_record(record: proto::Record) -> Record {
    Record {
        value: Bytes::from(record.value),
        offset: record.offset,
    }
}

/// Convert a stored record into its wire representation.
fn record_to_proto(record: &Record) -> proto::Record {
    proto::Record {
        value: record.value.to_vec(),
        offset: record.offset,
    }
}

/// Map a domain error to the gRPC status the wire contract promises.
fn error_to_status(err: Error) -> tonic::Status {
    match err {
        Error::OffsetOutOfRange { offset } => {
            tonic::Status::not_found(format!("offset out of range: {offset}"))
        }
        Error::EndOfData => tonic::Status::out_of_range("read past the end of committed data"),
        Error::Io(e) => tonic::Status::internal(format!("I/O error: {e}")),
        Error::Decode(e) => tonic::Status::data_loss(format!("record decode error: {e}")),
    }
}
