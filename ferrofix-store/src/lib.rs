/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Ferrofix Store
//!
//! Sector-checksummed memory-mapped storage for the ferrofix persistence
//! core.
//!
//! This crate provides:
//! - [`MappedFile`]: a writable memory mapping with explicit `force`
//! - [`format`]: the 8-byte schema header shared by every mapped file
//! - [`SectorFramer`]: packs variable-length records into fixed-size sectors
//!   without straddling, maintaining a trailing CRC32 per sector
//! - [`SessionContexts`]: the durable mapping from FIX composite identity to
//!   internal session id

pub mod contexts;
pub mod format;
pub mod mapped_file;
pub mod sector;

pub use contexts::{
    LogonOutcome, SessionContext, SessionContexts, LOWEST_VALID_SESSION_ID, NO_LOGON_TIME,
    UNKNOWN_SEQUENCE_INDEX,
};
pub use format::FileHeader;
pub use mapped_file::{MappedFile, ReadOnlyMappedFile};
pub use sector::{SectorFramer, SECTOR_DATA_LENGTH, SECTOR_SIZE};
