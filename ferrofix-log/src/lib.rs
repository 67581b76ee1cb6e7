/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Ferrofix Log
//!
//! The durable ordered log that the persistence core records to and replays
//! from, expressed as a small set of traits plus one in-process reference
//! implementation.
//!
//! This crate provides:
//! - **Frame layout**: fragment header format, alignment arithmetic, and the
//!   [`FragmentAssembler`] for reassembling fragmented messages
//! - **Traits**: [`LogPublication`], [`LogSubscription`], [`LogArchive`],
//!   the seam behind which a production shared-memory transport sits
//! - **CompletionPosition**: the cooperative shutdown signal agents observe
//! - **MemoryLog**: a process-local implementation of the whole seam, used by
//!   tests and offline tooling
//!
//! The log is fragmenting: a published message larger than the maximum
//! fragment payload is split into BEGIN/MID/END frames, and positions are
//! byte offsets into a recording, aligned to [`frame::FRAME_ALIGNMENT`].

pub mod completion;
pub mod frame;
pub mod memory;
pub mod traits;

pub use completion::CompletionPosition;
pub use frame::{
    aligned_frame_length, AssemblingHandler, FragmentAssembler, FragmentHandler, FrameHeader,
};
pub use memory::{MemoryArchive, MemoryLog, MemoryPublication, MemoryReplay, MemorySubscription};
pub use traits::{LogArchive, LogPublication, LogSubscription, RecordingDescriptor, ReplaySubscription};
