/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Internal message framing for the ordered log.
//!
//! Every FIX business message crossing the gateway is published to the log
//! wrapped in a [`FixMessageFrame`]: a fixed schema header identifying the
//! frame type and version, a fixed block carrying `session_id`,
//! `sequence_index`, `status` and `body_length`, then the raw FIX bytes.
//! Only frames with [`MessageStatus::Ok`] are indexed and replayed; replayed
//! copies are re-published as [`MessageStatus::CatchupReplay`] so the indexer
//! skips them.

use crate::error::FrameError;

/// Schema id written into every frame header.
pub const FRAME_SCHEMA_ID: u16 = 20;

/// Schema version written into every frame header.
pub const FRAME_SCHEMA_VERSION: u16 = 1;

/// Template id of the FIX message frame.
pub const FIX_MESSAGE_TEMPLATE_ID: u16 = 1;

/// Length of the frame schema header in bytes.
pub const FRAME_HEADER_LEN: usize = 8;

/// Length of the fixed block: session_id + sequence_index + status + body_length.
pub const FIX_MESSAGE_BLOCK_LENGTH: u16 = 17;

/// Offset of the FIX body within an encoded frame.
pub const FIX_MESSAGE_BODY_OFFSET: usize = FRAME_HEADER_LEN + FIX_MESSAGE_BLOCK_LENGTH as usize;

/// Delivery status of a framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageStatus {
    /// A valid business message; indexed and replayable.
    Ok = 0,
    /// The framer rejected the message's checksum.
    InvalidChecksum = 1,
    /// The framer rejected the message's body length.
    InvalidBodyLength = 2,
    /// A replayed copy of an already-recorded message; never re-indexed.
    CatchupReplay = 3,
}

impl TryFrom<u8> for MessageStatus {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::InvalidChecksum),
            2 => Ok(Self::InvalidBodyLength),
            3 => Ok(Self::CatchupReplay),
            _ => Err(FrameError::UnknownStatus { value }),
        }
    }
}

/// Zero-copy view of an encoded FIX message frame.
#[derive(Debug, Clone, Copy)]
pub struct FixMessageFrame<'a> {
    /// Internal session id of the FIX session the message belongs to.
    pub session_id: u64,
    /// Sequence index of the session at send time.
    pub sequence_index: i32,
    /// Delivery status of the message.
    pub status: MessageStatus,
    /// Declared length of the full FIX message.
    pub body_length: usize,
    /// The available FIX message bytes; shorter than `body_length` when the
    /// frame was decoded from an initial fragment.
    pub body: &'a [u8],
}

impl<'a> FixMessageFrame<'a> {
    /// Returns the encoded length of a frame carrying `body_len` FIX bytes.
    #[inline]
    #[must_use]
    pub const fn encoded_len(body_len: usize) -> usize {
        FIX_MESSAGE_BODY_OFFSET + body_len
    }

    /// Decodes a complete frame from `buffer`, validating the schema header.
    ///
    /// # Errors
    /// Returns [`FrameError`] if the buffer is truncated, the schema or
    /// template id is foreign, or the status byte is unknown.
    pub fn decode(buffer: &'a [u8]) -> Result<Self, FrameError> {
        let frame = Self::decode_partial(buffer)?;
        if !frame.is_complete() {
            return Err(FrameError::Truncated {
                needed: FIX_MESSAGE_BODY_OFFSET + frame.body_length,
                available: buffer.len(),
            });
        }
        Ok(frame)
    }

    /// Decodes a frame whose body may still be truncated.
    ///
    /// A BEGIN fragment of a fragmented message carries the full prefix but
    /// only the leading part of the FIX bytes; the indexer decodes those
    /// fragments with this method and reads what header fields it needs from
    /// the partial body.
    ///
    /// # Errors
    /// Returns [`FrameError`] if even the fixed prefix is truncated, or the
    /// schema, template id, or status byte is foreign.
    pub fn decode_partial(buffer: &'a [u8]) -> Result<Self, FrameError> {
        if buffer.len() < FIX_MESSAGE_BODY_OFFSET {
            return Err(FrameError::Truncated {
                needed: FIX_MESSAGE_BODY_OFFSET,
                available: buffer.len(),
            });
        }

        let template_id = read_u16(buffer, 2);
        if template_id != FIX_MESSAGE_TEMPLATE_ID {
            return Err(FrameError::UnknownTemplate { template_id });
        }
        let schema_id = read_u16(buffer, 4);
        if schema_id != FRAME_SCHEMA_ID {
            return Err(FrameError::SchemaMismatch {
                expected: FRAME_SCHEMA_ID,
                actual: schema_id,
            });
        }

        let session_id = read_u64(buffer, FRAME_HEADER_LEN);
        let sequence_index = read_i32(buffer, FRAME_HEADER_LEN + 8);
        let status = MessageStatus::try_from(buffer[FRAME_HEADER_LEN + 12])?;
        let body_length = read_u32(buffer, FRAME_HEADER_LEN + 13) as usize;

        let body_end = (FIX_MESSAGE_BODY_OFFSET + body_length).min(buffer.len());
        Ok(Self {
            session_id,
            sequence_index,
            status,
            body_length,
            body: &buffer[FIX_MESSAGE_BODY_OFFSET..body_end],
        })
    }

    /// Returns true if every declared body byte is present.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.body.len() == self.body_length
    }

    /// Encodes a frame into `out`.
    ///
    /// `out` must be exactly [`encoded_len`](Self::encoded_len)`(body.len())`
    /// bytes; the fixed prefix is written first, then `body` is copied in.
    pub fn encode_into(
        out: &mut [u8],
        session_id: u64,
        sequence_index: i32,
        status: MessageStatus,
        body: &[u8],
    ) {
        encode_prefix(out, session_id, sequence_index, status, body.len());
        out[FIX_MESSAGE_BODY_OFFSET..FIX_MESSAGE_BODY_OFFSET + body.len()].copy_from_slice(body);
    }

    /// Encodes only the fixed prefix, leaving the body region untouched.
    ///
    /// Used by writers that render the FIX bytes directly into a claimed
    /// buffer after the prefix.
    pub fn encode_prefix(
        out: &mut [u8],
        session_id: u64,
        sequence_index: i32,
        status: MessageStatus,
        body_len: usize,
    ) {
        encode_prefix(out, session_id, sequence_index, status, body_len);
    }
}

fn encode_prefix(
    out: &mut [u8],
    session_id: u64,
    sequence_index: i32,
    status: MessageStatus,
    body_len: usize,
) {
    write_u16(out, 0, FIX_MESSAGE_BLOCK_LENGTH);
    write_u16(out, 2, FIX_MESSAGE_TEMPLATE_ID);
    write_u16(out, 4, FRAME_SCHEMA_ID);
    write_u16(out, 6, FRAME_SCHEMA_VERSION);
    out[FRAME_HEADER_LEN..FRAME_HEADER_LEN + 8].copy_from_slice(&session_id.to_le_bytes());
    out[FRAME_HEADER_LEN + 8..FRAME_HEADER_LEN + 12]
        .copy_from_slice(&sequence_index.to_le_bytes());
    out[FRAME_HEADER_LEN + 12] = status as u8;
    out[FRAME_HEADER_LEN + 13..FRAME_HEADER_LEN + 17]
        .copy_from_slice(&(body_len as u32).to_le_bytes());
}

#[inline]
fn read_u16(buf: &[u8], offset: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_le_bytes(b)
}

#[inline]
fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(b)
}

#[inline]
fn read_i32(buf: &[u8], offset: usize) -> i32 {
    read_u32(buf, offset) as i32
}

#[inline]
fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(b)
}
