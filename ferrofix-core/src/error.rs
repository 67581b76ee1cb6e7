/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the ferrofix persistence core.
//!
//! This module provides a unified error hierarchy using `thiserror`, plus the
//! [`ErrorSink`] trait. Agents never propagate errors across their thread
//! boundary: recoverable and transient failures are reported to the sink and
//! the duty cycle continues. Only startup-time failures (mapping a file,
//! schema mismatch) surface as `Err` to the caller.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using [`GatewayError`] as the error type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level error type for all ferrofix operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Error in the session-context store or another mapped file.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error in the replay index or replay-position file.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Error servicing a resend request.
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    /// Error querying the durable recording archive.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Error publishing to the ordered log.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// Error decoding an internal message frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error from the underlying filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in mapped-file storage operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A recovered file's schema header does not match this build.
    #[error("schema mismatch in {path}: expected template {expected}, found {actual}")]
    SchemaMismatch {
        /// Path of the offending file.
        path: String,
        /// Template id this build writes.
        expected: u16,
        /// Template id found on disk.
        actual: u16,
    },

    /// A sector's stored CRC32 does not match its data region.
    #[error("sector checksum mismatch in [{sector_start}, {sector_end}): saved {saved:#010x}, computed {computed:#010x}")]
    SectorChecksumMismatch {
        /// Byte offset of the corrupted sector's start.
        sector_start: usize,
        /// Byte offset one past the corrupted sector's end.
        sector_end: usize,
        /// Checksum stored in the sector trailer.
        saved: u32,
        /// Checksum computed over the data region.
        computed: u32,
    },

    /// The mapped file has no room left for another record.
    #[error("out of space storing record of {needed} bytes")]
    OutOfSpace {
        /// Bytes the record would have needed.
        needed: usize,
    },

    /// A composite key does not fit the encoding buffer.
    #[error("composite key of {length} bytes exceeds maximum {max}")]
    KeyTooLarge {
        /// Serialized key length.
        length: usize,
        /// Maximum serializable key length.
        max: usize,
    },

    /// A persisted composite key could not be decoded.
    #[error("composite key corrupt: {reason}")]
    KeyCorrupt {
        /// Description of the corruption.
        reason: String,
    },

    /// `reset` was requested while sessions are still authenticated.
    #[error("there are currently authenticated sessions: {session_ids:?}")]
    ActiveSessions {
        /// Ids of the sessions still logged on.
        session_ids: Vec<u64>,
    },

    /// The file is too small to hold the schema header and one record.
    #[error("file too small: {size} bytes, minimum {min}")]
    FileTooSmall {
        /// Actual file size.
        size: usize,
        /// Minimum usable size.
        min: usize,
    },

    /// A sectorised file must be a whole number of sectors.
    #[error("file size {size} is not a multiple of the {sector_size}-byte sector")]
    UnalignedFileSize {
        /// Actual file size.
        size: usize,
        /// The sector size in force.
        sector_size: usize,
    },

    /// I/O failure mapping or forcing the file.
    #[error("store i/o error: {0}")]
    Io(String),
}

/// Errors in replay-index operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The configured index file size cannot back a power-of-two ring.
    #[error("invalid index file size {size}: ring capacity must be a power of two and a multiple of the record length")]
    InvalidFileSize {
        /// The rejected file size.
        size: usize,
    },

    /// A recovered index file's schema header does not match this build.
    #[error("schema mismatch in {path}: expected template {expected}, found {actual}")]
    SchemaMismatch {
        /// Path of the offending file.
        path: String,
        /// Template id this build writes.
        expected: u16,
        /// Template id found on disk.
        actual: u16,
    },

    /// The replay-position file has no free record slot.
    #[error("replay-position file full: {capacity} slots")]
    PositionSlotsExhausted {
        /// Number of slots in the file.
        capacity: usize,
    },

    /// Cache geometry is invalid.
    #[error("invalid cache geometry: {num_sets} sets of {set_size}")]
    InvalidCacheGeometry {
        /// Requested number of sets.
        num_sets: usize,
        /// Requested entries per set.
        set_size: usize,
    },

    /// I/O failure mapping an index file.
    #[error("index i/o error: {0}")]
    Io(String),
}

/// Errors servicing a resend request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// A `ResendRequest` is missing `BeginSeqNo` or `EndSeqNo`.
    #[error("malformed resend request: {reason}")]
    MalformedRequest {
        /// What was missing or unparseable.
        reason: String,
    },

    /// A recorded message has no `SendingTime`, so `PossDupFlag` cannot be
    /// injected ahead of it.
    #[error("recorded message seq={sequence_number} has no SendingTime field")]
    MissingSendingTime {
        /// Sequence number of the unusable message.
        sequence_number: i32,
    },

    /// A recorded message is missing BodyLength or CheckSum framing.
    #[error("recorded message seq={sequence_number} is not a framed FIX message: {reason}")]
    MalformedRecordedMessage {
        /// Sequence number of the unusable message.
        sequence_number: i32,
        /// What was missing.
        reason: String,
    },
}

/// Errors querying the recording archive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// No recording exists with the given id.
    #[error("unknown recording: {recording_id}")]
    UnknownRecording {
        /// The unknown recording id.
        recording_id: u64,
    },

    /// No recording is associated with the given publisher.
    #[error("no recording for log session {log_session_id}")]
    UnknownPublisher {
        /// The log-level session id of the publisher.
        log_session_id: i32,
    },

    /// A read or replay range falls outside the recording.
    #[error("range [{position}, +{length}) outside recording {recording_id}")]
    OutOfRange {
        /// The recording queried.
        recording_id: u64,
        /// Requested start position.
        position: u64,
        /// Requested length.
        length: u64,
    },
}

/// Errors publishing to the ordered log.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// The log cannot accept the claim right now; retry after idling.
    #[error("publication back-pressured")]
    Backpressure,

    /// The claim exceeds the maximum claimable length.
    #[error("claim of {length} bytes exceeds maximum {max}")]
    ClaimTooLarge {
        /// Requested claim length.
        length: usize,
        /// Maximum claim length.
        max: usize,
    },

    /// `commit` or `abort` was called with no claim outstanding.
    #[error("no active claim")]
    NoActiveClaim,

    /// The publication has been closed.
    #[error("publication closed")]
    Closed,
}

/// Errors decoding an internal message frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The frame header names a template this build does not know.
    #[error("unknown template id: {template_id}")]
    UnknownTemplate {
        /// Template id found in the frame header.
        template_id: u16,
    },

    /// The frame header names a foreign schema.
    #[error("schema mismatch: expected {expected}, found {actual}")]
    SchemaMismatch {
        /// Schema id this build writes.
        expected: u16,
        /// Schema id found in the frame header.
        actual: u16,
    },

    /// The buffer is shorter than the frame claims to be.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the frame requires.
        needed: usize,
        /// Bytes available in the buffer.
        available: usize,
    },

    /// The status byte is not a known [`MessageStatus`](crate::MessageStatus).
    #[error("unknown message status: {value}")]
    UnknownStatus {
        /// The unrecognised status byte.
        value: u8,
    },
}

/// Sink that agents report recoverable errors through.
///
/// The core never throws across agent boundaries; each agent holds a shared
/// sink and continues its duty cycle after reporting.
pub trait ErrorSink: Send + Sync + std::fmt::Debug {
    /// Reports an error. Implementations must not panic.
    fn on_error(&self, error: &GatewayError);
}

/// Shared handle to an [`ErrorSink`].
pub type SharedErrorSink = Arc<dyn ErrorSink>;

/// Default sink that emits errors through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorSink;

impl ErrorSink for LoggingErrorSink {
    fn on_error(&self, error: &GatewayError) {
        tracing::error!(%error, "gateway error");
    }
}

/// Sink that retains error messages, for assertions in tests and tooling.
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    errors: Mutex<Vec<String>>,
}

impl CollectingErrorSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the collected error messages.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    /// Returns the number of collected errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Returns true if no errors have been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}

impl ErrorSink for CollectingErrorSink {
    fn on_error(&self, error: &GatewayError) {
        self.errors.lock().push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::SectorChecksumMismatch {
            sector_start: 0,
            sector_end: 4096,
            saved: 1,
            computed: 2,
        };
        assert!(err.to_string().contains("[0, 4096)"));
    }

    #[test]
    fn test_gateway_error_from_store() {
        let err: GatewayError = StoreError::OutOfSpace { needed: 100 }.into();
        assert!(matches!(
            err,
            GatewayError::Store(StoreError::OutOfSpace { needed: 100 })
        ));
    }

    #[test]
    fn test_publish_error_display() {
        assert_eq!(
            PublishError::Backpressure.to_string(),
            "publication back-pressured"
        );
    }

    #[test]
    fn test_collecting_sink_retains_messages() {
        let sink = CollectingErrorSink::new();
        assert!(sink.is_empty());
        sink.on_error(&StoreError::Io("boom".to_string()).into());
        assert_eq!(sink.len(), 1);
        assert!(sink.errors()[0].contains("boom"));
    }
}
