/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Ferrofix Replay
//!
//! Servicing of `ResendRequest` and offline archive queries.
//!
//! This crate provides:
//! - [`possdup`]: rewrites a recorded FIX message as a possible duplicate,
//!   injecting or flipping `PossDupFlag` (43), adding `OrigSendingTime`
//!   (122), and recomputing `BodyLength` (9) and `CheckSum` (10)
//! - [`Replayer`]: the agent that answers `ResendRequest(begin, end)` by
//!   replaying the exact historical bytes, rewritten, onto the outbound
//!   stream
//! - [`ArchiveScanner`]: an offline reader that enumerates durable
//!   recordings and streams their messages to a consumer

pub mod possdup;
pub mod replayer;
pub mod scanner;

pub use possdup::RewritePlan;
pub use replayer::Replayer;
pub use scanner::{ArchiveScanner, FixMessageConsumer, ScanDirection};
