/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Indexed-position high-water marks.
//!
//! The replay-position file records, per `(log session id, recording id)`,
//! the highest contiguous log position whose indexing has completed. The
//! indexer writes it after every index record; at startup the reader yields
//! the saved triples so catch-up can replay only the gap between the index
//! and the recording.
//!
//! Layout: 8-byte schema header, then repeated 24-byte records
//! `{log_session_id:i32, recording_id:i64, position:i64, checksum:u32}`,
//! with the CRC32 computed over the record's first 20 bytes. A zero
//! `log_session_id` marks a free slot.

use ferrofix_core::error::{IndexError, SharedErrorSink, StoreError};
use ferrofix_store::format::{
    self, get_i32, get_i64, get_u32, put_i32, put_i64, put_u32, FileHeader, FILE_HEADER_LEN,
    STORAGE_SCHEMA_ID, STORAGE_SCHEMA_VERSION,
};
use ferrofix_store::mapped_file::MappedFile;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Template id of the indexed-position record schema.
const INDEXED_POSITION_TEMPLATE_ID: u16 = 3;

/// Length of one position record.
pub const POSITION_RECORD_LENGTH: usize = 24;

const LOG_SESSION_OFFSET: usize = 0;
const RECORDING_OFFSET: usize = 4;
const POSITION_OFFSET: usize = 12;
const CHECKSUM_OFFSET: usize = 20;
const CHECKSUMMED_LENGTH: usize = CHECKSUM_OFFSET;

fn header() -> FileHeader {
    FileHeader {
        block_length: POSITION_RECORD_LENGTH as u16,
        template_id: INDEXED_POSITION_TEMPLATE_ID,
        schema_id: STORAGE_SCHEMA_ID,
        version: STORAGE_SCHEMA_VERSION,
    }
}

/// Writer of the replay-position file. Single writer: the indexer.
#[derive(Debug)]
pub struct IndexedPositionWriter {
    mapped_file: MappedFile,
    slots: HashMap<(i32, u64), usize>,
    next_free: usize,
    error_sink: SharedErrorSink,
    dirty: SmallVec<[usize; 4]>,
    exhausted_reported: bool,
}

impl IndexedPositionWriter {
    /// Opens the writer over `mapped_file`, validating or writing the schema
    /// header and re-learning existing slots.
    ///
    /// # Errors
    /// Returns [`IndexError`] on a schema mismatch or an unusably small file.
    pub fn open(
        mut mapped_file: MappedFile,
        error_sink: SharedErrorSink,
    ) -> Result<Self, IndexError> {
        let path = mapped_file.path().display().to_string();
        format::initialise_header(mapped_file.buffer_mut(), &header(), &path).map_err(
            |error| match error {
                StoreError::SchemaMismatch {
                    path,
                    expected,
                    actual,
                } => IndexError::SchemaMismatch {
                    path,
                    expected,
                    actual,
                },
                other => IndexError::Io(other.to_string()),
            },
        )?;

        let mut slots = HashMap::new();
        let mut next_free = FILE_HEADER_LEN;
        let buffer = mapped_file.buffer();
        let mut offset = FILE_HEADER_LEN;
        while offset + POSITION_RECORD_LENGTH <= buffer.len() {
            let log_session_id = get_i32(buffer, offset + LOG_SESSION_OFFSET);
            if log_session_id == 0 {
                break;
            }
            let recording_id = get_i64(buffer, offset + RECORDING_OFFSET) as u64;
            slots.insert((log_session_id, recording_id), offset);
            offset += POSITION_RECORD_LENGTH;
            next_free = offset;
        }

        Ok(Self {
            mapped_file,
            slots,
            next_free,
            error_sink,
            dirty: SmallVec::new(),
            exhausted_reported: false,
        })
    }

    /// Records that indexing has completed up to `position` of
    /// `(log_session_id, recording_id)`.
    ///
    /// Slot exhaustion is reported once through the error sink; the update is
    /// then dropped (the index itself remains correct, only catch-up
    /// resolution is lost).
    pub fn indexed_up_to(&mut self, log_session_id: i32, recording_id: u64, position: u64) {
        let offset = match self.slots.get(&(log_session_id, recording_id)) {
            Some(&offset) => offset,
            None => {
                let capacity = self.mapped_file.capacity();
                if self.next_free + POSITION_RECORD_LENGTH > capacity {
                    if !self.exhausted_reported {
                        self.exhausted_reported = true;
                        self.error_sink.on_error(
                            &IndexError::PositionSlotsExhausted {
                                capacity: (capacity - FILE_HEADER_LEN) / POSITION_RECORD_LENGTH,
                            }
                            .into(),
                        );
                    }
                    return;
                }
                let offset = self.next_free;
                self.next_free += POSITION_RECORD_LENGTH;
                self.slots.insert((log_session_id, recording_id), offset);

                let buffer = self.mapped_file.buffer_mut();
                put_i32(buffer, offset + LOG_SESSION_OFFSET, log_session_id);
                put_i64(buffer, offset + RECORDING_OFFSET, recording_id as i64);
                offset
            }
        };

        put_i64(
            self.mapped_file.buffer_mut(),
            offset + POSITION_OFFSET,
            position as i64,
        );
        self.dirty.push(offset);
    }

    /// Recomputes the checksum of every record dirtied since the last call.
    pub fn update_checksums(&mut self) {
        let buffer = self.mapped_file.buffer_mut();
        for &offset in &self.dirty {
            let checksum = crc32fast::hash(&buffer[offset..offset + CHECKSUMMED_LENGTH]);
            put_u32(buffer, offset + CHECKSUM_OFFSET, checksum);
        }
        self.dirty.clear();
    }

    /// The mapped bytes, for the reader side.
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        self.mapped_file.buffer()
    }

    /// Flushes the file on shutdown.
    pub fn close(&mut self) {
        self.update_checksums();
        if let Err(error) = self.mapped_file.force() {
            self.error_sink.on_error(&error.into());
        }
    }
}

/// Reader of the replay-position file, used at catch-up only.
#[derive(Debug)]
pub struct IndexedPositionReader<'a> {
    buffer: &'a [u8],
}

impl<'a> IndexedPositionReader<'a> {
    /// Creates a reader over the position file's bytes.
    #[must_use]
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Yields every valid `(log_session_id, recording_id, position)` triple.
    ///
    /// Records whose checksum does not validate are skipped with a warning;
    /// catch-up then simply re-indexes from further back.
    pub fn read_last_position(&self, consumer: &mut dyn FnMut(i32, u64, u64)) {
        let mut offset = FILE_HEADER_LEN;
        while offset + POSITION_RECORD_LENGTH <= self.buffer.len() {
            let log_session_id = get_i32(self.buffer, offset + LOG_SESSION_OFFSET);
            if log_session_id == 0 {
                return;
            }

            let saved = get_u32(self.buffer, offset + CHECKSUM_OFFSET);
            let computed = crc32fast::hash(&self.buffer[offset..offset + CHECKSUMMED_LENGTH]);
            if saved == computed {
                consumer(
                    log_session_id,
                    get_i64(self.buffer, offset + RECORDING_OFFSET) as u64,
                    get_i64(self.buffer, offset + POSITION_OFFSET) as u64,
                );
            } else {
                tracing::warn!(
                    offset,
                    saved,
                    computed,
                    "skipping corrupt indexed-position record"
                );
            }
            offset += POSITION_RECORD_LENGTH;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofix_core::error::{CollectingErrorSink, LoggingErrorSink};
    use std::sync::Arc;
    use tempfile::tempdir;

    const FILE_SIZE: usize = FILE_HEADER_LEN + 4 * POSITION_RECORD_LENGTH;

    fn read_all(buffer: &[u8]) -> Vec<(i32, u64, u64)> {
        let mut triples = Vec::new();
        IndexedPositionReader::new(buffer)
            .read_last_position(&mut |s, r, p| triples.push((s, r, p)));
        triples
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let mapped = MappedFile::create_or_map(dir.path().join("positions"), FILE_SIZE).unwrap();
        let mut writer = IndexedPositionWriter::open(mapped, Arc::new(LoggingErrorSink)).unwrap();

        writer.indexed_up_to(1, 10, 128);
        writer.indexed_up_to(2, 20, 256);
        writer.indexed_up_to(1, 10, 512);
        writer.update_checksums();

        assert_eq!(read_all(writer.buffer()), vec![(1, 10, 512), (2, 20, 256)]);
    }

    #[test]
    fn test_positions_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions");
        {
            let mapped = MappedFile::create_or_map(&path, FILE_SIZE).unwrap();
            let mut writer =
                IndexedPositionWriter::open(mapped, Arc::new(LoggingErrorSink)).unwrap();
            writer.indexed_up_to(1, 10, 999);
            writer.close();
        }

        let mapped = MappedFile::create_or_map(&path, FILE_SIZE).unwrap();
        let mut writer = IndexedPositionWriter::open(mapped, Arc::new(LoggingErrorSink)).unwrap();
        assert_eq!(read_all(writer.buffer()), vec![(1, 10, 999)]);

        // Reopened writer reuses the learned slot rather than a new one.
        writer.indexed_up_to(1, 10, 1024);
        writer.update_checksums();
        assert_eq!(read_all(writer.buffer()), vec![(1, 10, 1024)]);
    }

    #[test]
    fn test_unchecksummed_update_is_skipped_by_reader() {
        let dir = tempdir().unwrap();
        let mapped = MappedFile::create_or_map(dir.path().join("positions"), FILE_SIZE).unwrap();
        let mut writer = IndexedPositionWriter::open(mapped, Arc::new(LoggingErrorSink)).unwrap();

        writer.indexed_up_to(1, 10, 128);
        // No update_checksums: the record is torn as far as readers go.
        assert_eq!(read_all(writer.buffer()), Vec::<(i32, u64, u64)>::new());
    }

    #[test]
    fn test_slot_exhaustion_reported_once() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(CollectingErrorSink::new());
        let mapped = MappedFile::create_or_map(
            dir.path().join("positions"),
            FILE_HEADER_LEN + POSITION_RECORD_LENGTH,
        )
        .unwrap();
        let mut writer = IndexedPositionWriter::open(mapped, sink.clone()).unwrap();

        writer.indexed_up_to(1, 10, 1);
        writer.indexed_up_to(2, 20, 2);
        writer.indexed_up_to(3, 30, 3);
        writer.update_checksums();

        assert_eq!(sink.len(), 1);
        assert_eq!(read_all(writer.buffer()), vec![(1, 10, 1)]);
    }
}
