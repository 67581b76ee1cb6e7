/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Ordered-log seam.
//!
//! The persistence core treats the underlying transport as an abstract
//! durable ordered log: exclusive fragmented publication, subscription
//! polling, and recording-id replay. These traits are that seam; the
//! production shared-memory transport and the in-process
//! [`MemoryLog`](crate::memory::MemoryLog) both sit behind them.

use crate::frame::FragmentHandler;
use ferrofix_core::error::{ArchiveError, PublishError};

/// Descriptor of one durable recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingDescriptor {
    /// Durable identifier of the recording.
    pub recording_id: u64,
    /// Stream the recording captured.
    pub stream_id: i32,
    /// Log-level session id of the publisher that produced it.
    pub log_session_id: i32,
    /// First recorded position.
    pub start_position: u64,
    /// Position after the final frame, or `None` while still recording.
    pub stop_position: Option<u64>,
}

/// Exclusive claim-based publication onto one stream.
///
/// The claim/commit protocol mirrors the write path of the transport: a
/// claim reserves space, the caller renders the message into the returned
/// buffer, and `commit` makes it visible atomically. A claim is never left
/// partially written; commit (or abort) is the final action.
pub trait LogPublication {
    /// Stream this publication writes to.
    fn stream_id(&self) -> i32;

    /// Log-level session id identifying this publisher.
    fn log_session_id(&self) -> i32;

    /// Claims a buffer for a message of `length` bytes.
    ///
    /// # Errors
    /// [`PublishError::Backpressure`] when the log cannot accept the claim
    /// right now; callers back off and retry.
    fn try_claim(&mut self, length: usize) -> Result<&mut [u8], PublishError>;

    /// Commits the outstanding claim, returning the position after the
    /// message's final fragment.
    ///
    /// # Errors
    /// [`PublishError::NoActiveClaim`] when no claim is outstanding.
    fn commit(&mut self) -> Result<u64, PublishError>;

    /// Discards the outstanding claim.
    fn abort(&mut self);

    /// Position after the last committed fragment.
    fn position(&self) -> u64;
}

/// Polling subscription over one stream.
pub trait LogSubscription {
    /// Polls up to `fragment_limit` fragments into `handler`, returning the
    /// number delivered.
    fn poll(&mut self, handler: &mut dyn FragmentHandler, fragment_limit: usize) -> usize;
}

/// A bounded or open-ended replay of one recording.
pub trait ReplaySubscription: LogSubscription {
    /// Returns true once the replay image is attached and pollable.
    fn image_attached(&self) -> bool;

    /// Current replay position within the recording.
    fn position(&self) -> u64;
}

/// Query access to the durable recordings behind the log.
pub trait LogArchive {
    /// The subscription type returned by [`replay`](Self::replay).
    type Replay: ReplaySubscription;

    /// Resolves the recording a publisher writes to.
    ///
    /// # Errors
    /// [`ArchiveError::UnknownPublisher`] if no recording exists for the
    /// publisher.
    fn recording_id(&self, log_session_id: i32) -> Result<u64, ArchiveError>;

    /// Position after the last recorded frame, whether or not the recording
    /// has stopped.
    ///
    /// # Errors
    /// [`ArchiveError::UnknownRecording`] for an unknown id.
    fn recording_position(&self, recording_id: u64) -> Result<u64, ArchiveError>;

    /// Stop position of a completed recording, `None` while still active.
    ///
    /// # Errors
    /// [`ArchiveError::UnknownRecording`] for an unknown id.
    fn stop_position(&self, recording_id: u64) -> Result<Option<u64>, ArchiveError>;

    /// Enumerates recordings of `stream_id` in recording-id order.
    fn list_recordings(&self, stream_id: i32, consumer: &mut dyn FnMut(&RecordingDescriptor));

    /// Opens a replay of `[position, position + length)`; `None` length means
    /// open-ended.
    ///
    /// # Errors
    /// [`ArchiveError::OutOfRange`] if the range is outside the recording.
    fn replay(
        &self,
        recording_id: u64,
        position: u64,
        length: Option<u64>,
    ) -> Result<Self::Replay, ArchiveError>;

    /// Reads the frames of `[position, position + length)` into `handler`.
    ///
    /// `position` must be frame-aligned (the begin position of a recorded
    /// message); the range must end on a frame boundary.
    ///
    /// # Errors
    /// [`ArchiveError::OutOfRange`] if the range is outside the recording.
    fn read(
        &self,
        recording_id: u64,
        position: u64,
        length: u64,
        handler: &mut dyn FragmentHandler,
    ) -> Result<(), ArchiveError>;
}
