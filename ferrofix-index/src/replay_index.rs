/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Seqlock-protected replay index.
//!
//! One mapped ring per `(FIX session id, stream id)` records, for every sent
//! message, where its bytes live: `(sequence_number, sequence_index) →
//! (recording_id, position, length)`. The file holds an 8-byte schema
//! header, the `begin_change` (tail) and `end_change` (head) counters, then
//! a power-of-two ring of fixed 32-byte records; old records are silently
//! overwritten once the ring wraps.
//!
//! Write protocol (single writer, many readers):
//! 1. read `begin_change`
//! 2. publish `begin_change + RECORD_LENGTH` with release semantics
//! 3. full fence
//! 4. store the record bytes
//! 5. update the replay-position file
//! 6. publish `end_change + RECORD_LENGTH` with release semantics
//!
//! Readers snapshot `end_change` first, copy a record, and validate against
//! `begin_change`; a record whose slot has been re-claimed is discarded.

use crate::cache::SetAssociativeCache;
use crate::indexer::Index;
use crate::position::{IndexedPositionReader, IndexedPositionWriter};
use ferrofix_core::error::{IndexError, SharedErrorSink};
use ferrofix_core::frame::{FixMessageFrame, MessageStatus};
use ferrofix_core::scanner::scan;
use ferrofix_log::frame::{aligned_frame_length, FragmentHandler, FrameHeader};
use ferrofix_log::traits::LogArchive;
use ferrofix_store::format::{
    self, get_i32, get_i64, put_i32, put_i64, FileHeader, STORAGE_SCHEMA_ID,
    STORAGE_SCHEMA_VERSION,
};
use ferrofix_store::mapped_file::MappedFile;
use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, AtomicI64, Ordering};

/// Template id of the replay index record schema.
pub(crate) const REPLAY_INDEX_TEMPLATE_ID: u16 = 2;

/// Length of one ring record.
pub const RECORD_LENGTH: usize = 32;

/// Offset of the `begin_change` counter.
pub(crate) const BEGIN_CHANGE_OFFSET: usize = 8;

/// Offset of the `end_change` counter.
pub(crate) const END_CHANGE_OFFSET: usize = 16;

/// Offset of the first ring record.
pub const RECORD_START: usize = 24;

const STREAM_ID_OFFSET: usize = 0;
const POSITION_OFFSET: usize = 4;
const SEQUENCE_NUMBER_OFFSET: usize = 12;
const SEQUENCE_INDEX_OFFSET: usize = 16;
const RECORDING_ID_OFFSET: usize = 20;
const LENGTH_OFFSET: usize = 28;

/// Path of the replay index ring for one session and stream.
#[must_use]
pub fn replay_index_path(log_dir: &Path, fix_session_id: u64, stream_id: i32) -> PathBuf {
    log_dir.join(format!("replay-index-{fix_session_id}-{stream_id}"))
}

/// Path of the replay-position file for one stream.
#[must_use]
pub fn replay_position_path(log_dir: &Path, stream_id: i32) -> PathBuf {
    log_dir.join(format!("replay-positions-{stream_id}"))
}

/// Ring capacity in bytes of an index file of `file_size` bytes.
///
/// # Errors
/// Returns [`IndexError::InvalidFileSize`] unless the capacity is a non-zero
/// power of two and a multiple of [`RECORD_LENGTH`].
pub fn record_capacity(file_size: usize) -> Result<usize, IndexError> {
    let capacity = file_size.saturating_sub(RECORD_START);
    if capacity == 0 || !capacity.is_power_of_two() || capacity % RECORD_LENGTH != 0 {
        return Err(IndexError::InvalidFileSize { size: file_size });
    }
    Ok(capacity)
}

/// Ring byte offset of an unbounded change position.
#[inline]
#[must_use]
pub(crate) fn ring_offset(position: i64, capacity: usize) -> usize {
    (position as u64 & (capacity as u64 - 1)) as usize
}

// The counters sit at fixed 8-byte-aligned offsets of a page-aligned
// mapping, so the cast below never misaligns. Readers in other threads and
// processes map the same file; the counters are the only cross-mapping
// synchronisation points.
#[inline]
pub(crate) fn change_counter(buffer: &[u8], offset: usize) -> &AtomicI64 {
    debug_assert_eq!((buffer.as_ptr() as usize + offset) % 8, 0);
    unsafe { &*buffer.as_ptr().add(offset).cast::<AtomicI64>() }
}

/// One decoded ring record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayIndexRecord {
    /// Stream the message was sent on.
    pub stream_id: i32,
    /// Begin byte position of the message in the recording.
    pub position: i64,
    /// FIX MsgSeqNum of the message.
    pub sequence_number: i32,
    /// Sequence index of the session when the message was sent.
    pub sequence_index: i32,
    /// Recording holding the bytes.
    pub recording_id: i64,
    /// Aligned byte length covering every fragment of the message.
    pub length: i32,
}

impl ReplayIndexRecord {
    pub(crate) fn encode(&self, buffer: &mut [u8], offset: usize) {
        put_i32(buffer, offset + STREAM_ID_OFFSET, self.stream_id);
        put_i64(buffer, offset + POSITION_OFFSET, self.position);
        put_i32(buffer, offset + SEQUENCE_NUMBER_OFFSET, self.sequence_number);
        put_i32(buffer, offset + SEQUENCE_INDEX_OFFSET, self.sequence_index);
        put_i64(buffer, offset + RECORDING_ID_OFFSET, self.recording_id);
        put_i32(buffer, offset + LENGTH_OFFSET, self.length);
    }

    pub(crate) fn decode(buffer: &[u8], offset: usize) -> Self {
        Self {
            stream_id: get_i32(buffer, offset + STREAM_ID_OFFSET),
            position: get_i64(buffer, offset + POSITION_OFFSET),
            sequence_number: get_i32(buffer, offset + SEQUENCE_NUMBER_OFFSET),
            sequence_index: get_i32(buffer, offset + SEQUENCE_INDEX_OFFSET),
            recording_id: get_i64(buffer, offset + RECORDING_ID_OFFSET),
            length: get_i32(buffer, offset + LENGTH_OFFSET),
        }
    }
}

pub(crate) fn index_file_header() -> FileHeader {
    FileHeader {
        block_length: RECORD_LENGTH as u16,
        template_id: REPLAY_INDEX_TEMPLATE_ID,
        schema_id: STORAGE_SCHEMA_ID,
        version: STORAGE_SCHEMA_VERSION,
    }
}

/// The mapped ring of one `(session id, stream id)` pair.
#[derive(Debug)]
struct SessionIndex {
    mapped_file: MappedFile,
    capacity: usize,
}

impl SessionIndex {
    fn open(
        log_dir: &Path,
        fix_session_id: u64,
        stream_id: i32,
        index_file_size: usize,
    ) -> Result<Self, IndexError> {
        let capacity = record_capacity(index_file_size)?;
        let path = replay_index_path(log_dir, fix_session_id, stream_id);
        let mut mapped_file = MappedFile::create_or_map(&path, index_file_size)
            .map_err(|e| IndexError::Io(e.to_string()))?;

        let path_text = path.display().to_string();
        let fresh =
            format::initialise_header(mapped_file.buffer_mut(), &index_file_header(), &path_text)
                .map_err(|e| match e {
                    ferrofix_core::error::StoreError::SchemaMismatch {
                        path,
                        expected,
                        actual,
                    } => IndexError::SchemaMismatch {
                        path,
                        expected,
                        actual,
                    },
                    other => IndexError::Io(other.to_string()),
                })?;

        if !fresh {
            // Normalise the counters into [0, capacity) so reopening never
            // starts with a wrap at slot zero.
            let buffer = mapped_file.buffer();
            let begin = change_counter(buffer, BEGIN_CHANGE_OFFSET).load(Ordering::Acquire);
            let reset = ring_offset(begin, capacity) as i64;
            change_counter(buffer, BEGIN_CHANGE_OFFSET).store(reset, Ordering::Release);
            change_counter(buffer, END_CHANGE_OFFSET).store(reset, Ordering::Release);
        }

        Ok(Self {
            mapped_file,
            capacity,
        })
    }

    fn on_record(
        &mut self,
        record: &ReplayIndexRecord,
        position_writer: &mut IndexedPositionWriter,
        log_session_id: i32,
        end_position: u64,
    ) {
        let buffer = self.mapped_file.buffer_mut();
        let begin_change = change_counter(buffer, BEGIN_CHANGE_OFFSET).load(Ordering::Acquire);
        let change_position = begin_change + RECORD_LENGTH as i64;

        change_counter(buffer, BEGIN_CHANGE_OFFSET).store(change_position, Ordering::Release);
        fence(Ordering::SeqCst);

        let offset = RECORD_START + ring_offset(begin_change, self.capacity);
        record.encode(buffer, offset);

        position_writer.indexed_up_to(log_session_id, record.recording_id as u64, end_position);
        position_writer.update_checksums();

        change_counter(self.mapped_file.buffer(), END_CHANGE_OFFSET)
            .store(change_position, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
struct ContinuedMessage {
    fix_session_id: u64,
    sequence_number: i32,
    sequence_index: i32,
    accumulated_length: usize,
}

/// Builds the per-session replay rings by consuming sent-message fragments.
#[derive(Debug)]
pub struct ReplayIndex<A: LogArchive> {
    log_dir: PathBuf,
    stream_id: i32,
    index_file_size: usize,
    cache: SetAssociativeCache<SessionIndex>,
    position_writer: IndexedPositionWriter,
    archive: A,
    continued: Option<ContinuedMessage>,
    skip_continuation: bool,
    error_sink: SharedErrorSink,
}

impl<A: LogArchive> ReplayIndex<A> {
    /// Creates the index for `stream_id`, opening the replay-position file.
    ///
    /// # Errors
    /// Returns [`IndexError`] if `index_file_size` cannot back a ring or the
    /// position file cannot be opened.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        log_dir: impl Into<PathBuf>,
        stream_id: i32,
        index_file_size: usize,
        position_file_size: usize,
        cache_num_sets: usize,
        cache_set_size: usize,
        archive: A,
        error_sink: SharedErrorSink,
    ) -> Result<Self, IndexError> {
        let log_dir = log_dir.into();
        record_capacity(index_file_size)?;

        let position_path = replay_position_path(&log_dir, stream_id);
        let position_file = MappedFile::create_or_map(&position_path, position_file_size)
            .map_err(|e| IndexError::Io(e.to_string()))?;
        let position_writer = IndexedPositionWriter::open(position_file, error_sink.clone())?;

        Ok(Self {
            log_dir,
            stream_id,
            index_file_size,
            cache: SetAssociativeCache::new(cache_num_sets, cache_set_size)?,
            position_writer,
            archive,
            continued: None,
            skip_continuation: false,
            error_sink,
        })
    }

    fn write_record(
        &mut self,
        fix_session_id: u64,
        record: ReplayIndexRecord,
        log_session_id: i32,
        end_position: u64,
    ) {
        let session_index = match self.cache.get_or_try_insert(fix_session_id, || {
            SessionIndex::open(
                &self.log_dir,
                fix_session_id,
                self.stream_id,
                self.index_file_size,
            )
        }) {
            Ok(session_index) => session_index,
            Err(error) => {
                self.error_sink.on_error(&error.into());
                return;
            }
        };

        session_index.on_record(&record, &mut self.position_writer, log_session_id, end_position);
    }
}

impl<A: LogArchive + Send> Index for ReplayIndex<A> {
    fn read_last_positions(&self, consumer: &mut dyn FnMut(i32, u64, u64)) {
        IndexedPositionReader::new(self.position_writer.buffer()).read_last_position(consumer);
    }

    fn close(&mut self) {
        self.cache.clear();
        self.position_writer.close();
    }

    fn name(&self) -> &'static str {
        "replay-index"
    }
}

impl<A: LogArchive + Send> FragmentHandler for ReplayIndex<A> {
    fn on_fragment(&mut self, payload: &[u8], header: &FrameHeader) {
        if header.stream_id != self.stream_id {
            return;
        }

        let aligned_length = aligned_frame_length(payload.len());
        let recording_id = match self.archive.recording_id(header.log_session_id) {
            Ok(recording_id) => recording_id,
            Err(error) => {
                self.error_sink.on_error(&error.into());
                return;
            }
        };

        if header.is_unfragmented() || header.is_begin() {
            // Only these fragments carry the parseable frame prefix; a BEGIN
            // fragment's body is still partial, but the standard header with
            // MsgSeqNum sits well within any realistic first fragment.
            let Ok(frame) = FixMessageFrame::decode_partial(payload) else {
                // Not a FIX message frame; nothing of ours to index.
                self.skip_continuation = header.is_begin();
                return;
            };
            if frame.status != MessageStatus::Ok {
                self.skip_continuation = header.is_begin();
                return;
            }
            let Some(sequence_number) = scan(frame.body).msg_seq_num else {
                self.skip_continuation = header.is_begin();
                return;
            };
            let sequence_number = sequence_number as i32;

            if header.is_begin() {
                self.skip_continuation = false;
                self.continued = Some(ContinuedMessage {
                    fix_session_id: frame.session_id,
                    sequence_number,
                    sequence_index: frame.sequence_index,
                    accumulated_length: aligned_length,
                });
            }

            let record = ReplayIndexRecord {
                stream_id: header.stream_id,
                position: header.position as i64 - aligned_length as i64,
                sequence_number,
                sequence_index: frame.sequence_index,
                recording_id: recording_id as i64,
                length: aligned_length as i32,
            };
            self.write_record(frame.session_id, record, header.log_session_id, header.position);
        } else {
            if self.skip_continuation {
                if header.is_end() {
                    self.skip_continuation = false;
                }
                return;
            }
            let Some(mut continued) = self.continued else {
                return;
            };
            continued.accumulated_length += aligned_length;

            // The running record always points back at the message begin, so
            // the final (END) record covers every fragment.
            let record = ReplayIndexRecord {
                stream_id: header.stream_id,
                position: header.position as i64 - continued.accumulated_length as i64,
                sequence_number: continued.sequence_number,
                sequence_index: continued.sequence_index,
                recording_id: recording_id as i64,
                length: continued.accumulated_length as i32,
            };
            self.write_record(
                continued.fix_session_id,
                record,
                header.log_session_id,
                header.position,
            );

            self.continued = if header.is_end() { None } else { Some(continued) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofix_core::error::LoggingErrorSink;
    use ferrofix_log::memory::MemoryLog;
    use ferrofix_log::traits::{LogPublication, LogSubscription};
    use std::sync::Arc;
    use tempfile::tempdir;

    const STREAM_ID: i32 = 2;
    const INDEX_FILE_SIZE: usize = RECORD_START + 1024;
    const POSITION_FILE_SIZE: usize = 4096;

    fn fix_message(seq_num: u32) -> Vec<u8> {
        format!("8=FIX.4.4\x019=20\x0135=D\x0134={seq_num}\x0152=t\x0110=000\x01").into_bytes()
    }

    fn publish_message(
        publication: &mut ferrofix_log::memory::MemoryPublication,
        session_id: u64,
        sequence_index: i32,
        status: MessageStatus,
        body: &[u8],
    ) {
        let length = FixMessageFrame::encoded_len(body.len());
        let claim = publication.try_claim(length).unwrap();
        FixMessageFrame::encode_into(claim, session_id, sequence_index, status, body);
        publication.commit().unwrap();
    }

    fn new_index(dir: &Path, log: &MemoryLog) -> ReplayIndex<ferrofix_log::memory::MemoryArchive> {
        ReplayIndex::new(
            dir,
            STREAM_ID,
            INDEX_FILE_SIZE,
            POSITION_FILE_SIZE,
            4,
            4,
            log.archive(),
            Arc::new(LoggingErrorSink),
        )
        .unwrap()
    }

    fn drain(log: &MemoryLog, index: &mut ReplayIndex<ferrofix_log::memory::MemoryArchive>) {
        let mut subscription = log.add_subscription(STREAM_ID);
        while subscription.poll(index, 16) > 0 {}
    }

    fn read_committed(dir: &Path, fix_session_id: u64) -> Vec<ReplayIndexRecord> {
        let path = replay_index_path(dir, fix_session_id, STREAM_ID);
        let bytes = std::fs::read(path).unwrap();
        let capacity = record_capacity(bytes.len()).unwrap();
        let end = get_i64(&bytes, END_CHANGE_OFFSET);
        let begin = (end - capacity as i64).max(0);

        (begin..end)
            .step_by(RECORD_LENGTH)
            .map(|p| ReplayIndexRecord::decode(&bytes, RECORD_START + ring_offset(p, capacity)))
            .collect()
    }

    #[test]
    fn test_record_capacity_validation() {
        assert!(record_capacity(RECORD_START + 1024).is_ok());
        assert!(record_capacity(RECORD_START + 1000).is_err());
        assert!(record_capacity(RECORD_START).is_err());
        assert!(record_capacity(16).is_err());
    }

    #[test]
    fn test_indexes_ok_messages_with_byte_roundtrip() {
        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        let mut publication = log.add_publication(STREAM_ID);
        let mut index = new_index(dir.path(), &log);

        for seq in 1..=3u32 {
            publish_message(&mut publication, 7, 0, MessageStatus::Ok, &fix_message(seq));
        }
        drain(&log, &mut index);

        let records = read_committed(dir.path(), 7);
        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.sequence_number, i as i32 + 1);
            assert_eq!(record.sequence_index, 0);
            assert_eq!(record.stream_id, STREAM_ID);

            // The indexed byte range round-trips to the original message.
            let mut payload = Vec::new();
            log.archive()
                .read(
                    record.recording_id as u64,
                    record.position as u64,
                    record.length as u64,
                    &mut |p: &[u8], _h: &FrameHeader| payload.extend_from_slice(p),
                )
                .unwrap();
            let frame = FixMessageFrame::decode(&payload).unwrap();
            assert_eq!(frame.body, fix_message(i as u32 + 1));
        }
    }

    #[test]
    fn test_skips_non_ok_and_foreign_frames() {
        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        let mut publication = log.add_publication(STREAM_ID);
        let mut index = new_index(dir.path(), &log);

        publish_message(
            &mut publication,
            7,
            0,
            MessageStatus::CatchupReplay,
            &fix_message(1),
        );
        // A non-FIX payload on the same stream.
        let claim = publication.try_claim(10).unwrap();
        claim.copy_from_slice(b"0123456789");
        publication.commit().unwrap();
        publish_message(&mut publication, 7, 0, MessageStatus::Ok, &fix_message(2));

        drain(&log, &mut index);
        let records = read_committed(dir.path(), 7);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence_number, 2);
    }

    #[test]
    fn test_fragmented_message_final_record_covers_whole_message() {
        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        // Small enough to fragment, large enough that the begin fragment
        // still carries the standard header through MsgSeqNum.
        let mut publication = log.add_publication(STREAM_ID).with_max_fragment_payload(52);
        let mut index = new_index(dir.path(), &log);

        let body = fix_message(5);
        publish_message(&mut publication, 7, 1, MessageStatus::Ok, &body);
        let end_position = publication.position();
        drain(&log, &mut index);

        let records = read_committed(dir.path(), 7);
        let last = records.last().unwrap();
        assert_eq!(last.sequence_number, 5);
        assert_eq!(last.sequence_index, 1);
        assert_eq!(last.position, 0);
        assert_eq!(last.position + i64::from(last.length), end_position as i64);

        // Reading the final record's range reassembles the original frame.
        let mut payload = Vec::new();
        log.archive()
            .read(
                last.recording_id as u64,
                last.position as u64,
                last.length as u64,
                &mut |p: &[u8], _h: &FrameHeader| payload.extend_from_slice(p),
            )
            .unwrap();
        let frame = FixMessageFrame::decode(&payload).unwrap();
        assert_eq!(frame.body, body);
    }

    #[test]
    fn test_ring_wraps_and_overwrites_oldest() {
        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        let mut publication = log.add_publication(STREAM_ID);

        // Four-record ring.
        let mut index = ReplayIndex::new(
            dir.path(),
            STREAM_ID,
            RECORD_START + 4 * RECORD_LENGTH,
            POSITION_FILE_SIZE,
            4,
            4,
            log.archive(),
            Arc::new(LoggingErrorSink),
        )
        .unwrap();

        for seq in 1..=6u32 {
            publish_message(&mut publication, 7, 0, MessageStatus::Ok, &fix_message(seq));
        }
        drain(&log, &mut index);

        let records = read_committed(dir.path(), 7);
        let mut seqs: Vec<i32> = records.iter().map(|r| r.sequence_number).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_reopen_normalises_counters() {
        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        let mut publication = log.add_publication(STREAM_ID);
        {
            let mut index = new_index(dir.path(), &log);
            for seq in 1..=5u32 {
                publish_message(&mut publication, 7, 0, MessageStatus::Ok, &fix_message(seq));
            }
            drain(&log, &mut index);
            index.close();
        }

        let session_index = SessionIndex::open(dir.path(), 7, STREAM_ID, INDEX_FILE_SIZE).unwrap();
        let buffer = session_index.mapped_file.buffer();
        let begin = change_counter(buffer, BEGIN_CHANGE_OFFSET).load(Ordering::Acquire);
        let end = change_counter(buffer, END_CHANGE_OFFSET).load(Ordering::Acquire);
        let capacity = session_index.capacity as i64;

        assert_eq!(begin, end);
        assert!(begin >= 0 && begin < capacity);
    }

    #[test]
    fn test_updates_position_file() {
        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        let mut publication = log.add_publication(STREAM_ID);
        let mut index = new_index(dir.path(), &log);

        publish_message(&mut publication, 7, 0, MessageStatus::Ok, &fix_message(1));
        let end_position = publication.position();
        drain(&log, &mut index);

        let mut triples = Vec::new();
        index.read_last_positions(&mut |s, r, p| triples.push((s, r, p)));
        assert_eq!(
            triples,
            vec![(
                publication.log_session_id(),
                publication.recording_id(),
                end_position
            )]
        );
    }
}
