/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Reader side of the replay index.
//!
//! Queries take their own read-only mapping of a session's ring file and run
//! lock-free against the live writer: snapshot `end_change` with acquire
//! semantics, copy candidate records, then validate each copy against
//! `begin_change`. A record whose slot was re-claimed mid-copy belongs to a
//! sequence number the ring no longer serves, so it is discarded rather than
//! retried.

use crate::replay_index::{
    record_capacity, replay_index_path, ring_offset, ReplayIndexRecord, BEGIN_CHANGE_OFFSET,
    END_CHANGE_OFFSET, RECORD_LENGTH, RECORD_START,
};
use ferrofix_core::error::IndexError;
use ferrofix_store::mapped_file::ReadOnlyMappedFile;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{fence, Ordering};

/// Lock-free query access to the replay rings of one stream.
#[derive(Debug, Clone)]
pub struct ReplayQuery {
    log_dir: PathBuf,
    stream_id: i32,
}

impl ReplayQuery {
    /// Creates a query handle over `log_dir` for `stream_id`.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>, stream_id: i32) -> Self {
        Self {
            log_dir: log_dir.into(),
            stream_id,
        }
    }

    /// Returns the indexed messages of `fix_session_id` with
    /// `begin_seq <= sequence_number <= end_seq`, in ascending
    /// `(sequence_index, sequence_number)` order.
    ///
    /// A session with no index file yet simply has nothing to replay.
    ///
    /// # Errors
    /// Returns [`IndexError`] if an existing index file cannot be mapped or
    /// has an invalid size.
    pub fn query(
        &self,
        fix_session_id: u64,
        begin_seq: i32,
        end_seq: i32,
    ) -> Result<Vec<ReplayIndexRecord>, IndexError> {
        let path = replay_index_path(&self.log_dir, fix_session_id, self.stream_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mapped = ReadOnlyMappedFile::open(&path).map_err(|e| IndexError::Io(e.to_string()))?;
        let buffer = mapped.buffer();
        let capacity = record_capacity(buffer.len())?;

        let end_change =
            crate::replay_index::change_counter(buffer, END_CHANGE_OFFSET).load(Ordering::Acquire);
        let mut position = (end_change - capacity as i64).max(0);

        // Later records overwrite earlier ones for the same key, so the
        // final record of a fragmented message wins.
        let mut matches: BTreeMap<(i32, i32), ReplayIndexRecord> = BTreeMap::new();

        while position < end_change {
            let offset = RECORD_START + ring_offset(position, capacity);
            let record = ReplayIndexRecord::decode(buffer, offset);

            // Seqlock validation: reject the copy if the writer has since
            // lapped this slot.
            fence(Ordering::Acquire);
            let begin_change = crate::replay_index::change_counter(buffer, BEGIN_CHANGE_OFFSET)
                .load(Ordering::Relaxed);
            let stable = begin_change <= position + capacity as i64;

            if stable
                && record.stream_id == self.stream_id
                && record.sequence_number >= begin_seq
                && record.sequence_number <= end_seq
            {
                matches.insert((record.sequence_index, record.sequence_number), record);
            }

            position += RECORD_LENGTH as i64;
        }

        Ok(matches.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Index;
    use crate::replay_index::ReplayIndex;
    use ferrofix_core::error::LoggingErrorSink;
    use ferrofix_core::frame::{FixMessageFrame, MessageStatus};
    use ferrofix_log::memory::MemoryLog;
    use ferrofix_log::traits::{LogPublication, LogSubscription};
    use std::sync::Arc;
    use tempfile::tempdir;

    const STREAM_ID: i32 = 2;

    fn fix_message(seq_num: u32) -> Vec<u8> {
        format!("8=FIX.4.4\x019=20\x0135=D\x0134={seq_num}\x0152=t\x0110=000\x01").into_bytes()
    }

    fn index_messages(
        dir: &std::path::Path,
        log: &MemoryLog,
        ring_records: usize,
        messages: &[(u64, i32, u32)],
    ) {
        let mut publication = log.add_publication(STREAM_ID);
        let mut index = ReplayIndex::new(
            dir,
            STREAM_ID,
            RECORD_START + ring_records * RECORD_LENGTH,
            4096,
            4,
            4,
            log.archive(),
            Arc::new(LoggingErrorSink),
        )
        .unwrap();

        for &(session_id, sequence_index, seq_num) in messages {
            let body = fix_message(seq_num);
            let length = FixMessageFrame::encoded_len(body.len());
            let claim = publication.try_claim(length).unwrap();
            FixMessageFrame::encode_into(claim, session_id, sequence_index, MessageStatus::Ok, &body);
            publication.commit().unwrap();
        }

        let mut subscription = log.add_subscription(STREAM_ID);
        while subscription.poll(&mut index, 16) > 0 {}
        index.close();
    }

    #[test]
    fn test_query_missing_session_is_empty() {
        let dir = tempdir().unwrap();
        let query = ReplayQuery::new(dir.path(), STREAM_ID);
        assert!(query.query(99, 1, 10).unwrap().is_empty());
    }

    #[test]
    fn test_query_range_and_order() {
        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        // Two sequence indexes: seq 8..10 before a reset, 1..4 after it.
        let messages: Vec<(u64, i32, u32)> = (8..=10)
            .map(|seq| (7u64, 0i32, seq))
            .chain((1..=4).map(|seq| (7u64, 1i32, seq)))
            .collect();
        index_messages(dir.path(), &log, 128, &messages);

        let query = ReplayQuery::new(dir.path(), STREAM_ID);
        let records = query.query(7, 2, 9).unwrap();

        let keys: Vec<(i32, i32)> = records
            .iter()
            .map(|r| (r.sequence_index, r.sequence_number))
            .collect();
        assert_eq!(keys, vec![(0, 8), (0, 9), (1, 2), (1, 3), (1, 4)]);
    }

    #[test]
    fn test_query_after_ring_wrap() {
        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        let messages: Vec<(u64, i32, u32)> = (1..=6).map(|seq| (7u64, 0i32, seq)).collect();
        index_messages(dir.path(), &log, 4, &messages);

        let query = ReplayQuery::new(dir.path(), STREAM_ID);
        // Overwritten sequence numbers are gone.
        assert!(query.query(7, 1, 1).unwrap().is_empty());
        assert!(query.query(7, 2, 2).unwrap().is_empty());

        let found: Vec<i32> = query
            .query(7, 1, 100)
            .unwrap()
            .iter()
            .map(|r| r.sequence_number)
            .collect();
        assert_eq!(found, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_query_ignores_other_sessions() {
        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        index_messages(dir.path(), &log, 128, &[(7, 0, 1), (8, 0, 2)]);

        let query = ReplayQuery::new(dir.path(), STREAM_ID);
        let records = query.query(7, 1, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence_number, 1);
    }

    #[test]
    fn test_concurrent_reader_never_sees_torn_records() {
        use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

        let dir = tempdir().unwrap();
        let log = MemoryLog::new();
        let dir_path = dir.path().to_path_buf();

        // Writer thread: index a long run of messages through a tiny ring so
        // the reader races against constant overwrites.
        let stop = Arc::new(AtomicBool::new(false));
        let writer_stop = Arc::clone(&stop);
        let writer_log = log.clone();
        let writer_dir = dir_path.clone();
        let writer = std::thread::spawn(move || {
            let mut publication = writer_log.add_publication(STREAM_ID);
            let mut index = ReplayIndex::new(
                &writer_dir,
                STREAM_ID,
                RECORD_START + 8 * RECORD_LENGTH,
                4096,
                4,
                4,
                writer_log.archive(),
                Arc::new(LoggingErrorSink),
            )
            .unwrap();
            let mut subscription = writer_log.add_subscription(STREAM_ID);

            for seq in 1..=4000u32 {
                let body = fix_message(seq);
                let length = FixMessageFrame::encoded_len(body.len());
                let claim = publication.try_claim(length).unwrap();
                FixMessageFrame::encode_into(claim, 7, 0, MessageStatus::Ok, &body);
                publication.commit().unwrap();
                subscription.poll(&mut index, 4);
                if writer_stop.load(AtomicOrdering::Relaxed) {
                    break;
                }
            }
            while subscription.poll(&mut index, 64) > 0 {}
            index.close();
        });

        // Every frame is the same size, so every valid record has a position
        // that is an exact multiple of the frame length and a fixed length.
        let frame_length =
            ferrofix_log::frame::aligned_frame_length(FixMessageFrame::encoded_len(
                fix_message(1).len(),
            )) as i64;

        let query = ReplayQuery::new(&dir_path, STREAM_ID);
        for _ in 0..2000 {
            if let Ok(records) = query.query(7, 1, i32::MAX) {
                for record in records {
                    assert_eq!(record.length as i64, frame_length);
                    assert_eq!(record.position % frame_length, 0);
                    // Position encodes the sequence number directly.
                    assert_eq!(
                        record.position / frame_length,
                        i64::from(record.sequence_number) - 1
                    );
                }
            }
        }

        stop.store(true, AtomicOrdering::Relaxed);
        writer.join().unwrap();
    }
}
