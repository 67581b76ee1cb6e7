/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! In-process ordered log.
//!
//! A process-local implementation of the log seam, backed by plain vectors
//! behind a `parking_lot` lock. Every publication records into its own
//! recording from position zero, so the archive side (positions, bounded
//! replay, raw reads) behaves exactly like the durable transport it stands in
//! for. Used by tests and offline tooling; not persistent.
//!
//! Polling copies frames out under the lock and dispatches after releasing
//! it, so handlers are free to publish back into the same log.

use crate::frame::{
    aligned_frame_length, FragmentHandler, FrameHeader, BEGIN_FRAG_FLAG, END_FRAG_FLAG,
    FRAGMENT_HEADER_LEN, UNFRAGMENTED,
};
use crate::traits::{
    LogArchive, LogPublication, LogSubscription, RecordingDescriptor, ReplaySubscription,
};
use bytes::Bytes;
use ferrofix_core::error::{ArchiveError, PublishError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Default maximum fragment payload, mirroring a transport MTU.
pub const DEFAULT_MAX_FRAGMENT_PAYLOAD: usize = 1344;

/// Maximum claimable message length.
pub const MAX_CLAIM_LENGTH: usize = 1 << 20;

/// Lowest log-level session id handed to publications.
const FIRST_LOG_SESSION_ID: i32 = 1;

#[derive(Debug)]
struct Recording {
    stream_id: i32,
    log_session_id: i32,
    bytes: Vec<u8>,
    stopped: bool,
}

#[derive(Debug, Default)]
struct LogState {
    recordings: BTreeMap<u64, Recording>,
    by_session: HashMap<i32, u64>,
    next_recording_id: u64,
    next_log_session_id: i32,
}

/// The in-process ordered log.
///
/// Cloning is cheap; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    state: Arc<RwLock<LogState>>,
}

impl MemoryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LogState {
                next_recording_id: 1,
                next_log_session_id: FIRST_LOG_SESSION_ID,
                ..LogState::default()
            })),
        }
    }

    /// Adds an exclusive publication on `stream_id`, creating its recording.
    #[must_use]
    pub fn add_publication(&self, stream_id: i32) -> MemoryPublication {
        let mut state = self.state.write();
        let recording_id = state.next_recording_id;
        state.next_recording_id += 1;
        let log_session_id = state.next_log_session_id;
        state.next_log_session_id += 1;

        state.recordings.insert(
            recording_id,
            Recording {
                stream_id,
                log_session_id,
                bytes: Vec::new(),
                stopped: false,
            },
        );
        state.by_session.insert(log_session_id, recording_id);

        MemoryPublication {
            state: Arc::clone(&self.state),
            recording_id,
            stream_id,
            log_session_id,
            max_fragment_payload: DEFAULT_MAX_FRAGMENT_PAYLOAD,
            claim: None,
            forced_backpressure: 0,
        }
    }

    /// Adds a subscription polling every recording of `stream_id`.
    #[must_use]
    pub fn add_subscription(&self, stream_id: i32) -> MemorySubscription {
        MemorySubscription {
            state: Arc::clone(&self.state),
            stream_id,
            cursors: HashMap::new(),
        }
    }

    /// Returns the archive view over this log.
    #[must_use]
    pub fn archive(&self) -> MemoryArchive {
        MemoryArchive {
            state: Arc::clone(&self.state),
        }
    }

    /// Marks a recording stopped; its stop position becomes visible and
    /// further commits are rejected.
    pub fn stop_recording(&self, recording_id: u64) {
        if let Some(recording) = self.state.write().recordings.get_mut(&recording_id) {
            recording.stopped = true;
        }
    }
}

/// Exclusive publication onto a [`MemoryLog`] stream.
#[derive(Debug)]
pub struct MemoryPublication {
    state: Arc<RwLock<LogState>>,
    recording_id: u64,
    stream_id: i32,
    log_session_id: i32,
    max_fragment_payload: usize,
    claim: Option<Vec<u8>>,
    forced_backpressure: usize,
}

impl MemoryPublication {
    /// Recording this publication writes to.
    #[must_use]
    pub fn recording_id(&self) -> u64 {
        self.recording_id
    }

    /// Sets the maximum fragment payload; smaller values force fragmentation.
    #[must_use]
    pub fn with_max_fragment_payload(mut self, max_fragment_payload: usize) -> Self {
        self.max_fragment_payload = max_fragment_payload;
        self
    }

    /// Makes the next `count` claims fail with back-pressure.
    pub fn inject_backpressure(&mut self, count: usize) {
        self.forced_backpressure = count;
    }

    fn append_frame(recording: &mut Recording, payload: &[u8], flags: u8) {
        let start = recording.bytes.len();
        let frame_length = aligned_frame_length(payload.len());
        recording.bytes.resize(start + frame_length, 0);

        let frame = &mut recording.bytes[start..];
        frame[..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        frame[4] = flags;
        frame[FRAGMENT_HEADER_LEN..FRAGMENT_HEADER_LEN + payload.len()].copy_from_slice(payload);
    }
}

impl LogPublication for MemoryPublication {
    fn stream_id(&self) -> i32 {
        self.stream_id
    }

    fn log_session_id(&self) -> i32 {
        self.log_session_id
    }

    fn try_claim(&mut self, length: usize) -> Result<&mut [u8], PublishError> {
        if self.forced_backpressure > 0 {
            self.forced_backpressure -= 1;
            return Err(PublishError::Backpressure);
        }
        if length > MAX_CLAIM_LENGTH {
            return Err(PublishError::ClaimTooLarge {
                length,
                max: MAX_CLAIM_LENGTH,
            });
        }

        self.claim = Some(vec![0u8; length]);
        Ok(self.claim.as_mut().map(Vec::as_mut_slice).unwrap_or_default())
    }

    fn commit(&mut self) -> Result<u64, PublishError> {
        let payload = self.claim.take().ok_or(PublishError::NoActiveClaim)?;

        let mut state = self.state.write();
        let recording = state
            .recordings
            .get_mut(&self.recording_id)
            .ok_or(PublishError::Closed)?;
        if recording.stopped {
            return Err(PublishError::Closed);
        }

        if payload.len() <= self.max_fragment_payload {
            Self::append_frame(recording, &payload, UNFRAGMENTED);
        } else {
            let chunks: Vec<&[u8]> = payload.chunks(self.max_fragment_payload).collect();
            let last = chunks.len() - 1;
            for (i, chunk) in chunks.into_iter().enumerate() {
                let flags = if i == 0 {
                    BEGIN_FRAG_FLAG
                } else if i == last {
                    END_FRAG_FLAG
                } else {
                    0
                };
                Self::append_frame(recording, chunk, flags);
            }
        }

        Ok(recording.bytes.len() as u64)
    }

    fn abort(&mut self) {
        self.claim = None;
    }

    fn position(&self) -> u64 {
        self.state
            .read()
            .recordings
            .get(&self.recording_id)
            .map_or(0, |r| r.bytes.len() as u64)
    }
}

/// One decoded frame, copied out of the lock before dispatch.
type PolledFrame = (Bytes, FrameHeader);

fn read_frames(
    recording: &Recording,
    mut cursor: u64,
    bound: u64,
    budget: usize,
    out: &mut Vec<PolledFrame>,
) -> u64 {
    let bytes = &recording.bytes;
    let end = bound.min(bytes.len() as u64) as usize;

    while out.len() < budget {
        let offset = cursor as usize;
        if offset + FRAGMENT_HEADER_LEN > end {
            break;
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[offset..offset + 4]);
        let payload_length = u32::from_le_bytes(len_bytes) as usize;
        let flags = bytes[offset + 4];
        let frame_length = aligned_frame_length(payload_length);
        if offset + frame_length > end {
            break;
        }

        let payload_start = offset + FRAGMENT_HEADER_LEN;
        cursor += frame_length as u64;
        out.push((
            Bytes::copy_from_slice(&bytes[payload_start..payload_start + payload_length]),
            FrameHeader {
                stream_id: recording.stream_id,
                log_session_id: recording.log_session_id,
                position: cursor,
                flags,
            },
        ));
    }

    cursor
}

/// Subscription over every recording of one stream.
#[derive(Debug)]
pub struct MemorySubscription {
    state: Arc<RwLock<LogState>>,
    stream_id: i32,
    cursors: HashMap<u64, u64>,
}

impl LogSubscription for MemorySubscription {
    fn poll(&mut self, handler: &mut dyn FragmentHandler, fragment_limit: usize) -> usize {
        let mut polled: Vec<PolledFrame> = Vec::new();
        {
            let state = self.state.read();
            for (&recording_id, recording) in &state.recordings {
                if recording.stream_id != self.stream_id {
                    continue;
                }
                let budget = fragment_limit.saturating_sub(polled.len());
                if budget == 0 {
                    break;
                }
                let cursor = self.cursors.entry(recording_id).or_insert(0);
                *cursor = read_frames(recording, *cursor, u64::MAX, budget, &mut polled);
            }
        }

        for (payload, header) in &polled {
            handler.on_fragment(payload, header);
        }
        polled.len()
    }
}

/// Bounded or open-ended replay of one recording.
#[derive(Debug)]
pub struct MemoryReplay {
    state: Arc<RwLock<LogState>>,
    recording_id: u64,
    cursor: u64,
    bound: Option<u64>,
}

impl LogSubscription for MemoryReplay {
    fn poll(&mut self, handler: &mut dyn FragmentHandler, fragment_limit: usize) -> usize {
        let mut polled: Vec<PolledFrame> = Vec::new();
        {
            let state = self.state.read();
            if let Some(recording) = state.recordings.get(&self.recording_id) {
                let bound = self.bound.unwrap_or(u64::MAX);
                self.cursor = read_frames(recording, self.cursor, bound, fragment_limit, &mut polled);
            }
        }

        for (payload, header) in &polled {
            handler.on_fragment(payload, header);
        }
        polled.len()
    }
}

impl ReplaySubscription for MemoryReplay {
    fn image_attached(&self) -> bool {
        true
    }

    fn position(&self) -> u64 {
        self.cursor
    }
}

/// Archive view over a [`MemoryLog`].
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    state: Arc<RwLock<LogState>>,
}

impl LogArchive for MemoryArchive {
    type Replay = MemoryReplay;

    fn recording_id(&self, log_session_id: i32) -> Result<u64, ArchiveError> {
        self.state
            .read()
            .by_session
            .get(&log_session_id)
            .copied()
            .ok_or(ArchiveError::UnknownPublisher { log_session_id })
    }

    fn recording_position(&self, recording_id: u64) -> Result<u64, ArchiveError> {
        self.state
            .read()
            .recordings
            .get(&recording_id)
            .map(|r| r.bytes.len() as u64)
            .ok_or(ArchiveError::UnknownRecording { recording_id })
    }

    fn stop_position(&self, recording_id: u64) -> Result<Option<u64>, ArchiveError> {
        self.state
            .read()
            .recordings
            .get(&recording_id)
            .map(|r| r.stopped.then_some(r.bytes.len() as u64))
            .ok_or(ArchiveError::UnknownRecording { recording_id })
    }

    fn list_recordings(&self, stream_id: i32, consumer: &mut dyn FnMut(&RecordingDescriptor)) {
        let state = self.state.read();
        for (&recording_id, recording) in &state.recordings {
            if recording.stream_id != stream_id {
                continue;
            }
            consumer(&RecordingDescriptor {
                recording_id,
                stream_id: recording.stream_id,
                log_session_id: recording.log_session_id,
                start_position: 0,
                stop_position: recording.stopped.then_some(recording.bytes.len() as u64),
            });
        }
    }

    fn replay(
        &self,
        recording_id: u64,
        position: u64,
        length: Option<u64>,
    ) -> Result<MemoryReplay, ArchiveError> {
        let state = self.state.read();
        let recording = state
            .recordings
            .get(&recording_id)
            .ok_or(ArchiveError::UnknownRecording { recording_id })?;

        let bound = length.map(|l| position + l);
        if position > recording.bytes.len() as u64 {
            return Err(ArchiveError::OutOfRange {
                recording_id,
                position,
                length: length.unwrap_or(0),
            });
        }

        Ok(MemoryReplay {
            state: Arc::clone(&self.state),
            recording_id,
            cursor: position,
            bound,
        })
    }

    fn read(
        &self,
        recording_id: u64,
        position: u64,
        length: u64,
        handler: &mut dyn FragmentHandler,
    ) -> Result<(), ArchiveError> {
        let mut polled: Vec<PolledFrame> = Vec::new();
        {
            let state = self.state.read();
            let recording = state
                .recordings
                .get(&recording_id)
                .ok_or(ArchiveError::UnknownRecording { recording_id })?;

            let bound = position + length;
            if bound > recording.bytes.len() as u64 {
                return Err(ArchiveError::OutOfRange {
                    recording_id,
                    position,
                    length,
                });
            }
            let after = read_frames(recording, position, bound, usize::MAX, &mut polled);
            if after != bound {
                return Err(ArchiveError::OutOfRange {
                    recording_id,
                    position,
                    length,
                });
            }
        }

        for (payload, header) in &polled {
            handler.on_fragment(payload, header);
        }
        Ok(())
    }
}
