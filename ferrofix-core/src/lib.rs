/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Ferrofix Core
//!
//! Core types, traits, and error definitions for the ferrofix FIX gateway
//! persistence core.
//!
//! This crate provides the fundamental building blocks used across all
//! ferrofix crates:
//! - **Error types**: Unified error handling with `thiserror`, plus the
//!   [`ErrorSink`] trait that agents report recoverable failures through
//! - **Core types**: `Timestamp`, `CompId`, and the `CompositeKey` session
//!   identity
//! - **FIX utilities**: checksum arithmetic and the single-pass header
//!   [`scanner`]
//! - **Message framing**: the internal [`FixMessageFrame`] schema that wraps
//!   raw FIX bytes on the ordered log
//! - **Agents**: the cooperative duty-cycle [`Agent`] trait, backoff idle
//!   strategy, and thread runner
//!
//! ## Design
//!
//! The persistence core is single-threaded cooperative per agent: distinct
//! agents run on distinct threads and communicate exclusively through the
//! shared ordered log and memory-mapped files with explicit memory ordering.
//! Nothing in this crate blocks except the idle strategy.

pub mod agent;
pub mod checksum;
pub mod error;
pub mod frame;
pub mod scanner;
pub mod types;

pub use agent::{Agent, AgentRunner, BackoffIdleStrategy};
pub use error::{
    ArchiveError, ErrorSink, FrameError, GatewayError, IndexError, LoggingErrorSink, PublishError,
    ReplayError, Result, SharedErrorSink, StoreError,
};
pub use frame::{FixMessageFrame, MessageStatus};
pub use scanner::{scan, HeaderScan};
pub use types::{CompId, CompositeKey, Timestamp, COMP_ID_MAX_LEN};
