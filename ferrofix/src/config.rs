/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine configuration.
//!
//! File sizes, stream ids, and cache geometry for the persistence core,
//! with defaults suitable for a production gateway. Index file sizes must
//! leave a power-of-two ring after the header; the per-component
//! constructors validate on use.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default inbound (received) stream id.
pub const DEFAULT_INBOUND_STREAM_ID: i32 = 1;

/// Default outbound (sent) stream id.
pub const DEFAULT_OUTBOUND_STREAM_ID: i32 = 2;

/// Configuration of the persistence core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the contexts file, replay indexes, and positions.
    pub log_dir: PathBuf,
    /// Size of the session contexts file in bytes.
    pub session_contexts_file_size: usize,
    /// Size of each per-session replay index file in bytes.
    pub index_file_size: usize,
    /// Size of the per-stream replay-position file in bytes.
    pub position_file_size: usize,
    /// Number of sets in the session index cache (a power of two).
    pub cache_num_sets: usize,
    /// Entries per set in the session index cache.
    pub cache_set_size: usize,
    /// Stream id of received messages.
    pub inbound_stream_id: i32,
    /// Stream id of sent messages.
    pub outbound_stream_id: i32,
    /// Prefix of agent thread names.
    pub agent_name_prefix: String,
}

impl EngineConfig {
    /// Creates a configuration rooted at `log_dir` with default sizes.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            session_contexts_file_size: 4 * 1024 * 1024,
            index_file_size: ferrofix_index::RECORD_START + 4 * 1024 * 1024,
            position_file_size: 4096,
            cache_num_sets: 16,
            cache_set_size: 8,
            inbound_stream_id: DEFAULT_INBOUND_STREAM_ID,
            outbound_stream_id: DEFAULT_OUTBOUND_STREAM_ID,
            agent_name_prefix: "ferrofix-".to_string(),
        }
    }

    /// Sets the session contexts file size.
    #[must_use]
    pub const fn with_session_contexts_file_size(mut self, size: usize) -> Self {
        self.session_contexts_file_size = size;
        self
    }

    /// Sets the per-session replay index file size.
    #[must_use]
    pub const fn with_index_file_size(mut self, size: usize) -> Self {
        self.index_file_size = size;
        self
    }

    /// Sets the replay-position file size.
    #[must_use]
    pub const fn with_position_file_size(mut self, size: usize) -> Self {
        self.position_file_size = size;
        self
    }

    /// Sets the session index cache geometry.
    #[must_use]
    pub const fn with_cache_geometry(mut self, num_sets: usize, set_size: usize) -> Self {
        self.cache_num_sets = num_sets;
        self.cache_set_size = set_size;
        self
    }

    /// Sets the stream ids of received and sent messages.
    #[must_use]
    pub const fn with_stream_ids(mut self, inbound: i32, outbound: i32) -> Self {
        self.inbound_stream_id = inbound;
        self.outbound_stream_id = outbound;
        self
    }

    /// Sets the agent thread-name prefix.
    #[must_use]
    pub fn with_agent_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.agent_name_prefix = prefix.into();
        self
    }

    /// Path of the session contexts file.
    #[must_use]
    pub fn session_contexts_path(&self) -> PathBuf {
        self.log_dir.join("session-contexts")
    }
}
