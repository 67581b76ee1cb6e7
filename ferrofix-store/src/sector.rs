/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Sector framing.
//!
//! Mapped files that survive crashes are partitioned into fixed 4 KiB
//! sectors: [`SECTOR_DATA_LENGTH`] bytes of records followed by a 4-byte
//! little-endian CRC32 over the data region. A record never straddles a
//! sector boundary; the [`SectorFramer`] allocator bumps a would-be
//! straddler to the next sector's start, leaving the tail of the previous
//! sector zero.

use ferrofix_core::error::StoreError;
use crate::format::{get_u32, put_u32};

/// Size of one sector in bytes.
pub const SECTOR_SIZE: usize = 4096;

/// Size of the trailing checksum in bytes.
pub const CHECKSUM_SIZE: usize = 4;

/// Bytes of record data per sector.
pub const SECTOR_DATA_LENGTH: usize = SECTOR_SIZE - CHECKSUM_SIZE;

/// Checksum offset of the first sector.
pub const FIRST_CHECKSUM_LOCATION: usize = SECTOR_DATA_LENGTH;

/// Returns the start of the sector after the one containing `position`.
#[inline]
#[must_use]
pub const fn next_sector_start(position: usize) -> usize {
    (position / SECTOR_SIZE + 1) * SECTOR_SIZE
}

/// Computes the CRC32 (IEEE) of a sector's data region.
#[inline]
#[must_use]
pub fn sector_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Recomputes and stores the checksum of the sector starting at
/// `sector_start`, whose checksum trailer sits at `checksum_offset`.
pub fn update_sector_checksum(buffer: &mut [u8], sector_start: usize, checksum_offset: usize) {
    let checksum = sector_checksum(&buffer[sector_start..checksum_offset]);
    put_u32(buffer, checksum_offset, checksum);
}

/// Validates the checksum of the sector `[sector_start, sector_start + SECTOR_SIZE)`.
///
/// # Errors
/// Returns [`StoreError::SectorChecksumMismatch`] naming the corrupted
/// sector's bounds.
pub fn validate_sector_checksum(buffer: &[u8], sector_start: usize) -> Result<(), StoreError> {
    let checksum_offset = sector_start + SECTOR_DATA_LENGTH;
    let computed = sector_checksum(&buffer[sector_start..checksum_offset]);
    let saved = get_u32(buffer, checksum_offset);
    if saved != computed {
        return Err(StoreError::SectorChecksumMismatch {
            sector_start,
            sector_end: sector_start + SECTOR_SIZE,
            saved,
            computed,
        });
    }
    Ok(())
}

/// Allocator that packs records into sectors without straddling.
///
/// After a successful [`claim`](Self::claim) the framer exposes the claimed
/// record's owning sector via [`sector_start`](Self::sector_start) and
/// [`checksum_offset`](Self::checksum_offset) so the writer can re-checksum
/// exactly that sector.
#[derive(Debug)]
pub struct SectorFramer {
    capacity: usize,
    sector_start: usize,
    checksum_offset: usize,
}

impl SectorFramer {
    /// Creates a framer over a buffer of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sector_start: 0,
            checksum_offset: FIRST_CHECKSUM_LOCATION,
        }
    }

    /// Claims `needed` bytes at `position`, or at the next sector's start if
    /// the record would reach into the checksum trailer.
    ///
    /// # Returns
    /// The record's position, or `None` when the file is exhausted.
    #[must_use]
    pub fn claim(&mut self, position: usize, needed: usize) -> Option<usize> {
        let sector_start = next_sector_start(position) - SECTOR_SIZE;
        let mut checksum_offset = sector_start + SECTOR_DATA_LENGTH;
        let mut claimed = position;

        if claimed + needed > checksum_offset {
            claimed = sector_start + SECTOR_SIZE;
            checksum_offset = claimed + SECTOR_DATA_LENGTH;
        }

        if needed > SECTOR_DATA_LENGTH || claimed + needed > self.capacity {
            return None;
        }

        self.sector_start = checksum_offset - SECTOR_DATA_LENGTH;
        self.checksum_offset = checksum_offset;
        Some(claimed)
    }

    /// Start of the sector owning the last claimed record.
    #[inline]
    #[must_use]
    pub fn sector_start(&self) -> usize {
        self.sector_start
    }

    /// Checksum offset of the sector owning the last claimed record.
    #[inline]
    #[must_use]
    pub fn checksum_offset(&self) -> usize {
        self.checksum_offset
    }
}
