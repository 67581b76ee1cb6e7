/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Durable session identity store.
//!
//! Maps each FIX composite identity to an internal numeric session id and
//! tracks which sessions are currently authenticated. The id table is saved
//! into a sector-checksummed mapped file: records are written with a fixed
//! 24-byte header followed by the serialized composite key, never straddle a
//! sector, and each sector's CRC32 trailer is updated after every committed
//! write.
//!
//! A persist failure never fails the logon: the context is returned
//! unpersisted (`file_position() == None`) and the failure is reported
//! through the error sink, so the session still runs but is not durable.

use crate::format::{
    self, get_i32, get_i64, get_u32, get_u64, put_i32, put_i64, put_u32, put_u64, FileHeader,
    FILE_HEADER_LEN, STORAGE_SCHEMA_ID, STORAGE_SCHEMA_VERSION,
};
use crate::mapped_file::MappedFile;
use crate::sector::{
    self, next_sector_start, update_sector_checksum, SectorFramer, SECTOR_DATA_LENGTH,
    SECTOR_SIZE,
};
use ferrofix_core::error::{SharedErrorSink, StoreError};
use ferrofix_core::scanner::scan;
use ferrofix_core::types::CompositeKey;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Lowest session id ever assigned.
pub const LOWEST_VALID_SESSION_ID: u64 = 1;

/// Sentinel logon time of a session that has never logged on.
pub const NO_LOGON_TIME: i64 = -1;

/// Sentinel sequence index of a session that has never reset.
pub const UNKNOWN_SEQUENCE_INDEX: i32 = -1;

/// Template id of the session id record schema.
const SESSION_ID_TEMPLATE_ID: u16 = 1;

/// Fixed record header: session_id, sequence_index, logon_time, key length.
const BLOCK_LENGTH: usize = 24;

const SESSION_ID_OFFSET: usize = 0;
const SEQUENCE_INDEX_OFFSET: usize = 8;
const LOGON_TIME_OFFSET: usize = 12;
const KEY_LENGTH_OFFSET: usize = 20;

const HEADER_SIZE: usize = FILE_HEADER_LEN;

/// The in-memory identity of one FIX session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session_id: u64,
    sequence_index: i32,
    logon_time: i64,
    file_position: Option<usize>,
}

impl SessionContext {
    /// Internal numeric id of the session.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Number of sequence resets this session has performed,
    /// [`UNKNOWN_SEQUENCE_INDEX`] before the first is known.
    #[inline]
    #[must_use]
    pub fn sequence_index(&self) -> i32 {
        self.sequence_index
    }

    /// Epoch-nanosecond logon time, [`NO_LOGON_TIME`] if never logged on.
    #[inline]
    #[must_use]
    pub fn logon_time(&self) -> i64 {
        self.logon_time
    }

    /// Byte offset of this record's mutable fields in the contexts file, or
    /// `None` if the context is not durable.
    #[inline]
    #[must_use]
    pub fn file_position(&self) -> Option<usize> {
        self.file_position
    }

    /// Returns true if the context has a durable record.
    #[inline]
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.file_position.is_some()
    }
}

/// Result of a logon attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogonOutcome {
    /// The session is now authenticated under this context.
    Session(SessionContext),
    /// The same session id is already authenticated.
    Duplicate,
}

/// Durable mapping from composite identity to session context.
#[derive(Debug)]
pub struct SessionContexts {
    mapped_file: MappedFile,
    sector_framer: SectorFramer,
    error_sink: SharedErrorSink,
    contexts: HashMap<CompositeKey, SessionContext>,
    currently_authenticated: HashSet<u64>,
    recorded_sessions: HashSet<u64>,
    key_buffer: Vec<u8>,
    file_position: Option<usize>,
    counter: u64,
}

impl SessionContexts {
    /// Opens the store over `mapped_file`, recovering any persisted records.
    ///
    /// Sector checksum mismatches are reported through `error_sink` and do
    /// not abort recovery.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the file is too small or carries a foreign
    /// schema header.
    pub fn open(mapped_file: MappedFile, error_sink: SharedErrorSink) -> Result<Self, StoreError> {
        let capacity = mapped_file.capacity();
        if capacity < SECTOR_SIZE {
            return Err(StoreError::FileTooSmall {
                size: capacity,
                min: SECTOR_SIZE,
            });
        }
        if capacity % SECTOR_SIZE != 0 {
            return Err(StoreError::UnalignedFileSize {
                size: capacity,
                sector_size: SECTOR_SIZE,
            });
        }

        let mut store = Self {
            sector_framer: SectorFramer::new(capacity),
            mapped_file,
            error_sink,
            contexts: HashMap::new(),
            currently_authenticated: HashSet::new(),
            recorded_sessions: HashSet::new(),
            key_buffer: vec![0u8; SECTOR_DATA_LENGTH],
            file_position: Some(HEADER_SIZE),
            counter: LOWEST_VALID_SESSION_ID,
        };
        store.initialise_buffer()?;
        store.recover();
        Ok(store)
    }

    fn header() -> FileHeader {
        FileHeader {
            block_length: BLOCK_LENGTH as u16,
            template_id: SESSION_ID_TEMPLATE_ID,
            schema_id: STORAGE_SCHEMA_ID,
            version: STORAGE_SCHEMA_VERSION,
        }
    }

    fn initialise_buffer(&mut self) -> Result<(), StoreError> {
        let path = self.mapped_file.path().display().to_string();
        let fresh = format::initialise_header(self.mapped_file.buffer_mut(), &Self::header(), &path)?;
        if fresh {
            update_sector_checksum(
                self.mapped_file.buffer_mut(),
                0,
                sector::FIRST_CHECKSUM_LOCATION,
            );
            self.force();
        }
        Ok(())
    }

    fn recover(&mut self) {
        let capacity = self.mapped_file.capacity();
        let last_record_start = capacity - BLOCK_LENGTH;
        let mut sector_end = 0usize;
        let mut file_position = HEADER_SIZE;

        while file_position < last_record_start {
            sector_end = self.validate_crossed_sector(file_position, sector_end);

            let buffer = self.mapped_file.buffer();
            let mut session_id = get_u64(buffer, file_position + SESSION_ID_OFFSET);
            if session_id == 0 {
                // End of data within this sector; peek at the next sector.
                let peek_position = sector_end;
                if peek_position > last_record_start {
                    break;
                }
                session_id = get_u64(buffer, peek_position + SESSION_ID_OFFSET);
                if session_id == 0 {
                    break;
                }
                file_position = peek_position;
            }

            let buffer = self.mapped_file.buffer();
            let sequence_index = get_i32(buffer, file_position + SEQUENCE_INDEX_OFFSET);
            let logon_time = get_i64(buffer, file_position + LOGON_TIME_OFFSET);
            let key_length = get_u32(buffer, file_position + KEY_LENGTH_OFFSET) as usize;

            let key_start = file_position + BLOCK_LENGTH;
            let Some(key_bytes) = buffer.get(key_start..key_start + key_length) else {
                break;
            };
            let key = match CompositeKey::decode(key_bytes) {
                Ok(key) => key,
                Err(error) => {
                    self.error_sink.on_error(&error.into());
                    break;
                }
            };

            self.contexts.insert(
                key,
                SessionContext {
                    session_id,
                    sequence_index,
                    logon_time,
                    file_position: Some(file_position),
                },
            );
            self.recorded_sessions.insert(session_id);
            self.counter = self.counter.max(session_id + 1);

            file_position += BLOCK_LENGTH + key_length;
        }

        self.file_position = Some(file_position);
    }

    fn validate_crossed_sector(&self, position: usize, sector_end: usize) -> usize {
        if position > sector_end {
            if let Err(error) = sector::validate_sector_checksum(self.mapped_file.buffer(), sector_end)
            {
                self.error_sink.on_error(&error.into());
            }
            return sector_end + SECTOR_SIZE;
        }
        sector_end
    }

    /// Authenticates a session under `key`, assigning a fresh session id on
    /// first sight of the key.
    ///
    /// Returns [`LogonOutcome::Duplicate`] if the id is already
    /// authenticated. A persist failure still returns the context, marked
    /// non-durable, with the failure reported through the error sink.
    pub fn on_logon(&mut self, key: &CompositeKey) -> LogonOutcome {
        let context = match self.contexts.get(key) {
            Some(context) => context.clone(),
            None => {
                let session_id = self.counter;
                self.counter += 1;
                let context = self.assign_session_id(key, session_id, UNKNOWN_SEQUENCE_INDEX);
                self.contexts.insert(key.clone(), context.clone());
                context
            }
        };

        if !self.currently_authenticated.insert(context.session_id) {
            return LogonOutcome::Duplicate;
        }
        LogonOutcome::Session(context)
    }

    fn assign_session_id(
        &mut self,
        key: &CompositeKey,
        session_id: u64,
        sequence_index: i32,
    ) -> SessionContext {
        let unpersisted = SessionContext {
            session_id,
            sequence_index,
            logon_time: NO_LOGON_TIME,
            file_position: None,
        };

        let key_length = match key.encode_into(&mut self.key_buffer) {
            Ok(length) => length,
            Err(error) => {
                self.error_sink.on_error(&error.into());
                return unpersisted;
            }
        };

        let Some(proposed) = self.file_position else {
            return unpersisted;
        };
        let Some(claimed) = self.sector_framer.claim(proposed, BLOCK_LENGTH + key_length) else {
            // The file stays exhausted; later logons skip persistence too.
            self.file_position = None;
            self.error_sink.on_error(
                &StoreError::OutOfSpace {
                    needed: BLOCK_LENGTH + key_length,
                }
                .into(),
            );
            return unpersisted;
        };

        let buffer = self.mapped_file.buffer_mut();
        put_u64(buffer, claimed + SESSION_ID_OFFSET, session_id);
        put_i32(buffer, claimed + SEQUENCE_INDEX_OFFSET, sequence_index);
        put_i64(buffer, claimed + LOGON_TIME_OFFSET, NO_LOGON_TIME);
        put_u32(buffer, claimed + KEY_LENGTH_OFFSET, key_length as u32);
        buffer[claimed + BLOCK_LENGTH..claimed + BLOCK_LENGTH + key_length]
            .copy_from_slice(&self.key_buffer[..key_length]);
        self.file_position = Some(claimed + BLOCK_LENGTH + key_length);

        update_sector_checksum(
            self.mapped_file.buffer_mut(),
            self.sector_framer.sector_start(),
            self.sector_framer.checksum_offset(),
        );
        self.force();

        SessionContext {
            file_position: Some(claimed),
            ..unpersisted
        }
    }

    /// Removes the session from the authenticated set; on-disk state is
    /// untouched.
    pub fn on_disconnect(&mut self, session_id: u64) {
        self.currently_authenticated.remove(&session_id);
    }

    /// Increments the session's sequence index and persists the change.
    pub fn sequence_reset(&mut self, session_id: u64) {
        let mut update = None;
        for context in self.contexts.values_mut() {
            if context.session_id == session_id {
                context.sequence_index += 1;
                update = context
                    .file_position
                    .map(|position| (position, context.sequence_index, context.logon_time));
            }
        }
        if let Some((position, sequence_index, logon_time)) = update {
            self.update_saved_data(position, sequence_index, logon_time);
        }
    }

    /// Writes a record's two mutable fields at `file_position`, recomputes
    /// the owning sector's checksum, and forces the mapping.
    pub fn update_saved_data(&mut self, file_position: usize, sequence_index: i32, logon_time: i64) {
        let buffer = self.mapped_file.buffer_mut();
        put_i32(buffer, file_position + SEQUENCE_INDEX_OFFSET, sequence_index);
        put_i64(buffer, file_position + LOGON_TIME_OFFSET, logon_time);

        let sector_start = next_sector_start(file_position) - SECTOR_SIZE;
        let checksum_offset = sector_start + SECTOR_DATA_LENGTH;
        update_sector_checksum(self.mapped_file.buffer_mut(), sector_start, checksum_offset);
        self.force();
    }

    /// Records a session id chosen elsewhere by decoding a sent `Logon`.
    ///
    /// Used when running as a cluster follower: the leader assigned
    /// `session_id`, and the counter is bumped past it so a later leadership
    /// takeover cannot collide.
    pub fn on_sent_follower_message(&mut self, session_id: u64, sequence_index: i32, message: &[u8]) {
        let scanned = scan(message);
        if !scanned.is_logon(message) || !self.recorded_sessions.insert(session_id) {
            return;
        }
        self.counter = self.counter.max(session_id + 1);

        // Sent message, so the initiator orientation of the header is ours.
        if let Some(key) = scanned.composite_key(message) {
            self.on_sent_follower_logon(key, session_id, sequence_index);
        }
    }

    /// Persists `(key, session_id, sequence_index)` as decoded from a sent
    /// follower `Logon`.
    pub fn on_sent_follower_logon(
        &mut self,
        key: CompositeKey,
        session_id: u64,
        sequence_index: i32,
    ) {
        let context = self.assign_session_id(&key, session_id, sequence_index);
        self.contexts.insert(key, context);
    }

    /// Looks up the session id persisted for `key`.
    #[must_use]
    pub fn lookup_session_id(&self, key: &CompositeKey) -> Option<u64> {
        self.contexts.get(key).map(|context| context.session_id)
    }

    /// Returns true if the session is currently authenticated.
    #[must_use]
    pub fn is_authenticated(&self, session_id: u64) -> bool {
        self.currently_authenticated.contains(&session_id)
    }

    /// Returns true if any known context carries `session_id`.
    #[must_use]
    pub fn is_known_session_id(&self, session_id: u64) -> bool {
        self.contexts
            .values()
            .any(|context| context.session_id == session_id)
    }

    /// Backs the file up to `backup` (when given), zeroes the mapping, and
    /// re-initialises the header.
    ///
    /// # Errors
    /// Returns [`StoreError::ActiveSessions`] while any session is
    /// authenticated; the store is untouched in that case.
    pub fn reset(&mut self, backup: Option<&Path>) -> Result<(), StoreError> {
        if !self.currently_authenticated.is_empty() {
            let mut session_ids: Vec<u64> = self.currently_authenticated.iter().copied().collect();
            session_ids.sort_unstable();
            return Err(StoreError::ActiveSessions { session_ids });
        }

        self.counter = LOWEST_VALID_SESSION_ID;
        self.contexts.clear();
        self.recorded_sessions.clear();

        if let Some(backup) = backup {
            self.mapped_file.transfer_to(backup)?;
        }

        self.mapped_file.buffer_mut().fill(0);
        self.sector_framer = SectorFramer::new(self.mapped_file.capacity());
        self.file_position = Some(HEADER_SIZE);
        self.initialise_buffer()
    }

    fn force(&self) {
        if let Err(error) = self.mapped_file.force() {
            self.error_sink.on_error(&error.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofix_core::error::{CollectingErrorSink, LoggingErrorSink};
    use ferrofix_core::types::CompId;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    const FILE_SIZE: usize = 4 * SECTOR_SIZE;

    fn key(sender: &str, target: &str) -> CompositeKey {
        CompositeKey::new(CompId::new(sender).unwrap(), CompId::new(target).unwrap())
    }

    fn open_store(dir: &TempDir) -> SessionContexts {
        let mapped = MappedFile::create_or_map(dir.path().join("session-ids"), FILE_SIZE).unwrap();
        SessionContexts::open(mapped, Arc::new(LoggingErrorSink)).unwrap()
    }

    fn logon_id(store: &mut SessionContexts, k: &CompositeKey) -> u64 {
        match store.on_logon(k) {
            LogonOutcome::Session(context) => context.session_id(),
            LogonOutcome::Duplicate => panic!("unexpected duplicate"),
        }
    }

    #[test]
    fn test_fresh_store_assigns_and_persists() {
        let dir = tempdir().unwrap();
        {
            let mut store = open_store(&dir);
            assert_eq!(logon_id(&mut store, &key("A", "B")), 1);
        }

        let mut store = open_store(&dir);
        assert_eq!(store.lookup_session_id(&key("A", "B")), Some(1));
        assert!(store.is_known_session_id(1));
        // The counter recovered past the persisted id.
        assert_eq!(logon_id(&mut store, &key("C", "D")), 2);
    }

    #[test]
    fn test_duplicate_logon() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);
        let k = key("A", "B");

        assert_eq!(logon_id(&mut store, &k), 1);
        assert!(store.is_authenticated(1));
        assert_eq!(store.on_logon(&k), LogonOutcome::Duplicate);

        store.on_disconnect(1);
        assert!(!store.is_authenticated(1));
        assert_eq!(logon_id(&mut store, &k), 1);
    }

    #[test]
    fn test_record_never_straddles_sector() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        // 200-byte records: 24-byte header + 176-byte key.
        let big_key = |i: usize| {
            let comp = |c: char, n: usize| CompId::new(&c.to_string().repeat(n)).unwrap();
            CompositeKey::new(
                CompId::new(&format!("{i:032}")).unwrap(),
                comp('T', 32),
            )
            .with_sender_sub_id(comp('U', 22))
            .with_sender_location_id(comp('L', 32))
            .with_target_sub_id(comp('V', 32))
            .with_target_location_id(comp('W', 20))
        };
        assert_eq!(big_key(0).encoded_len(), 176);

        let mut bumped = None;
        for i in 0..30 {
            let LogonOutcome::Session(context) = store.on_logon(&big_key(i)) else {
                panic!("duplicate");
            };
            let position = context.file_position().unwrap();
            if position >= SECTOR_SIZE {
                bumped = Some((i, position));
                break;
            }
            // Entirely inside sector 0's data region.
            assert!(position + 200 <= SECTOR_DATA_LENGTH);
        }

        let (i, position) = bumped.expect("a record should have been bumped");
        // The straddler starts exactly at the next sector.
        assert_eq!(position, SECTOR_SIZE);

        // The tail of sector 0's data region is zero, and its CRC validates.
        let tail_start = 8 + 200 * i;
        let buffer = store.mapped_file.buffer();
        assert!(buffer[tail_start..SECTOR_DATA_LENGTH].iter().all(|&b| b == 0));
        sector::validate_sector_checksum(buffer, 0).unwrap();
        sector::validate_sector_checksum(buffer, SECTOR_SIZE).unwrap();
    }

    #[test]
    fn test_crc_tamper_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session-ids");
        {
            let mut store = open_store(&dir);
            logon_id(&mut store, &key("A", "B"));
        }

        // Flip one data byte inside sector 0.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[100] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let sink = Arc::new(CollectingErrorSink::new());
        let mapped = MappedFile::create_or_map(&path, FILE_SIZE).unwrap();
        let store = SessionContexts::open(mapped, sink.clone()).unwrap();

        assert!(sink.errors().iter().any(|e| e.contains("checksum mismatch")));
        // Recovery continued: the record itself was untouched.
        assert_eq!(store.lookup_session_id(&key("A", "B")), Some(1));
    }

    #[test]
    fn test_sequence_reset_persists() {
        let dir = tempdir().unwrap();
        {
            let mut store = open_store(&dir);
            logon_id(&mut store, &key("A", "B"));
            store.sequence_reset(1);
            store.sequence_reset(1);
        }

        let store = open_store(&dir);
        let context = store.contexts.get(&key("A", "B")).unwrap();
        assert_eq!(context.sequence_index(), UNKNOWN_SEQUENCE_INDEX + 2);
    }

    #[test]
    fn test_update_saved_data_persists_logon_time() {
        let dir = tempdir().unwrap();
        {
            let mut store = open_store(&dir);
            let LogonOutcome::Session(context) = store.on_logon(&key("A", "B")) else {
                panic!("duplicate");
            };
            store.update_saved_data(context.file_position().unwrap(), 0, 123_456_789);
        }

        let store = open_store(&dir);
        let context = store.contexts.get(&key("A", "B")).unwrap();
        assert_eq!(context.logon_time(), 123_456_789);
        assert_eq!(context.sequence_index(), 0);
    }

    #[test]
    fn test_out_of_space_returns_unpersisted_context() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(CollectingErrorSink::new());
        let mapped =
            MappedFile::create_or_map(dir.path().join("tiny"), SECTOR_SIZE).unwrap();
        let mut store = SessionContexts::open(mapped, sink.clone()).unwrap();

        // Fill sector 0 with 200-byte records until the claim fails.
        let mut unpersisted = None;
        for i in 0..40 {
            let k = key(&format!("SENDER{i:026}"), &"T".repeat(32));
            let k = k
                .with_sender_sub_id(CompId::new(&"U".repeat(32)).unwrap())
                .with_sender_location_id(CompId::new(&"L".repeat(32)).unwrap())
                .with_target_sub_id(CompId::new(&"V".repeat(32)).unwrap())
                .with_target_location_id(CompId::new(&"W".repeat(16)).unwrap());
            let LogonOutcome::Session(context) = store.on_logon(&k) else {
                panic!("duplicate");
            };
            if !context.is_persisted() {
                unpersisted = Some(context);
                break;
            }
        }

        let context = unpersisted.expect("store should have filled up");
        // The logon still succeeded, with a live session id.
        assert!(store.is_authenticated(context.session_id()));
        assert!(sink.errors().iter().any(|e| e.contains("out of space")));
    }

    #[test]
    fn test_follower_logon_bumps_counter() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        let logon = b"8=FIX.4.4\x019=30\x0135=A\x0149=LEADER\x0156=VENUE\x0134=1\x0110=000\x01";
        store.on_sent_follower_message(17, 2, logon);

        assert!(store.is_known_session_id(17));
        let k = key("LEADER", "VENUE");
        assert_eq!(store.lookup_session_id(&k), Some(17));
        // No collision after a takeover.
        assert_eq!(logon_id(&mut store, &key("A", "B")), 18);

        // Replaying the same follower message is a no-op.
        store.on_sent_follower_message(17, 2, logon);
        assert_eq!(store.lookup_session_id(&k), Some(17));
    }

    #[test]
    fn test_reset_requires_no_authenticated_sessions() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);
        logon_id(&mut store, &key("A", "B"));

        assert!(matches!(
            store.reset(None),
            Err(StoreError::ActiveSessions { .. })
        ));

        store.on_disconnect(1);
        store.reset(None).unwrap();
        assert_eq!(store.lookup_session_id(&key("A", "B")), None);
        assert_eq!(logon_id(&mut store, &key("A", "B")), 1);
    }

    #[test]
    fn test_reset_backs_up_and_reinitialises() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session-ids");
        let backup = dir.path().join("session-ids.bak");

        let mut store = open_store(&dir);
        logon_id(&mut store, &key("A", "B"));
        store.on_disconnect(1);
        let before_reset = std::fs::read(&path).unwrap();

        store.reset(Some(&backup)).unwrap();
        drop(store);

        assert_eq!(std::fs::read(&backup).unwrap(), before_reset);

        // Byte-equivalent to a freshly initialised file.
        let fresh_dir = tempdir().unwrap();
        let fresh = open_store(&fresh_dir);
        drop(fresh);
        assert_eq!(
            std::fs::read(&path).unwrap(),
            std::fs::read(fresh_dir.path().join("session-ids")).unwrap()
        );
    }

    #[test]
    fn test_schema_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session-ids");
        {
            let _store = open_store(&dir);
        }
        // Corrupt the template id.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[2] = 0xEE;
        std::fs::write(&path, &bytes).unwrap();

        let mapped = MappedFile::create_or_map(&path, FILE_SIZE).unwrap();
        assert!(matches!(
            SessionContexts::open(mapped, Arc::new(LoggingErrorSink)),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }
}
