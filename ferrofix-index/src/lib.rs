/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Ferrofix Index
//!
//! Sequence-number indexing over the recorded message log.
//!
//! This crate provides:
//! - [`ReplayIndex`]: one seqlock-protected mapped ring per
//!   `(session id, stream id)`, mapping `(sequence number, sequence index)`
//!   to `(recording id, byte position, length)`
//! - [`IndexedPositionWriter`] / [`IndexedPositionReader`]: the durable
//!   high-water mark of indexing per recording, used for crash-consistent
//!   catch-up
//! - [`ReplayQuery`]: the lock-free reader side of the ring
//! - [`Indexer`]: the agent that tails the sent-message stream and fans each
//!   fragment out to its indexes
//!
//! Writers and readers coordinate exclusively through the `begin_change` /
//! `end_change` counters at the head of each ring file; there are no locks.

pub mod cache;
pub mod indexer;
pub mod position;
pub mod query;
pub mod replay_index;

pub use cache::SetAssociativeCache;
pub use indexer::{Index, Indexer};
pub use position::{IndexedPositionReader, IndexedPositionWriter};
pub use query::ReplayQuery;
pub use replay_index::{
    replay_index_path, replay_position_path, ReplayIndex, ReplayIndexRecord, RECORD_LENGTH,
    RECORD_START,
};
