/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Ferrofix
//!
//! The persistence and replay core of a FIX gateway: it durably records
//! every FIX business message that passes through the gateway, maintains
//! per-session indexes keyed by sequence number, and services
//! `ResendRequest` by replaying the exact historical bytes, tagged as
//! possible duplicates, back onto the outbound wire.
//!
//! ## Crates
//!
//! - [`ferrofix_core`]: types, framing, errors, agents
//! - [`ferrofix_log`]: the ordered-log seam and in-process reference log
//! - [`ferrofix_store`]: sector-checksummed storage and session contexts
//! - [`ferrofix_index`]: the seqlock replay index and the indexer agent
//! - [`ferrofix_replay`]: resend servicing and archive scanning
//!
//! This facade re-exports the public surface and wires the agents together
//! behind [`PersistenceEngine`].
//!
//! ## Recovery model
//!
//! After a crash, the session contexts file recovers every assigned session
//! id (sector CRCs catch torn writes), and the indexer catches each index up
//! from its durable high-water mark to the recording's end before going
//! live. Counterparties that request a resend receive an exactly-equivalent
//! stream with `PossDupFlag=Y`.

pub mod config;
pub mod engine;

pub use config::{EngineConfig, DEFAULT_INBOUND_STREAM_ID, DEFAULT_OUTBOUND_STREAM_ID};
pub use engine::PersistenceEngine;

pub use ferrofix_core::{
    Agent, AgentRunner, BackoffIdleStrategy, CompId, CompositeKey, ErrorSink, FixMessageFrame,
    GatewayError, HeaderScan, LoggingErrorSink, MessageStatus, SharedErrorSink, Timestamp,
};
pub use ferrofix_index::{Index, Indexer, ReplayIndex, ReplayIndexRecord, ReplayQuery};
pub use ferrofix_log::{
    CompletionPosition, FragmentAssembler, FragmentHandler, FrameHeader, LogArchive,
    LogPublication, LogSubscription, MemoryLog, RecordingDescriptor, ReplaySubscription,
};
pub use ferrofix_replay::{ArchiveScanner, FixMessageConsumer, Replayer, ScanDirection};
pub use ferrofix_store::{
    LogonOutcome, MappedFile, SessionContext, SessionContexts, LOWEST_VALID_SESSION_ID,
};
