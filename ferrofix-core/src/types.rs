/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Core types for the persistence core.
//!
//! This module provides:
//! - [`Timestamp`]: epoch-nanosecond timestamp with FIX-style formatting
//! - [`CompId`]: bounded component identifier (SenderCompID, TargetCompID, ...)
//! - [`CompositeKey`]: the six-part FIX composite session identity, with its
//!   on-disk serialization

use crate::error::StoreError;
use arrayvec::ArrayString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length for CompID strings in bytes.
pub const COMP_ID_MAX_LEN: usize = 32;

/// Number of components in a [`CompositeKey`].
const KEY_COMPONENTS: usize = 6;

/// Timestamp with nanosecond precision since the Unix epoch.
///
/// Logon times are persisted as signed epoch nanoseconds; this wrapper keeps
/// the arithmetic and the FIX `YYYYMMDD-HH:MM:SS.sss` rendering in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from nanoseconds since the Unix epoch.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the current UTC timestamp.
    #[inline]
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(0))
    }

    /// Returns nanoseconds since the Unix epoch.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Converts to a chrono `DateTime<Utc>`.
    #[must_use]
    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    /// Formats the timestamp in FIX format with millisecond precision.
    ///
    /// Format: `YYYYMMDD-HH:MM:SS.sss`
    #[must_use]
    pub fn format_millis(self) -> ArrayString<21> {
        let mut buf = ArrayString::new();
        let _ = std::fmt::write(
            &mut buf,
            format_args!("{}", self.to_datetime().format("%Y%m%d-%H:%M:%S%.3f")),
        );
        buf
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_millis())
    }
}

/// Component identifier for FIX sessions.
///
/// Used for SenderCompID (tag 49), TargetCompID (tag 56), and the sub and
/// location variants. Maximum length is [`COMP_ID_MAX_LEN`] bytes.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct CompId(ArrayString<COMP_ID_MAX_LEN>);

impl CompId {
    /// Creates a new CompId from a string slice.
    ///
    /// # Returns
    /// `Some(CompId)` if the string fits within the maximum length, `None`
    /// otherwise.
    #[must_use]
    pub fn new(s: &str) -> Option<Self> {
        ArrayString::from(s).ok().map(Self)
    }

    /// Returns the empty CompId, used for absent sub and location ids.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(ArrayString::new_const())
    }

    /// Returns the CompId as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the CompId as raw bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns the length of the CompId in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the CompId is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for CompId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CompId {
    type Err = arrayvec::CapacityError<()>;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ArrayString::try_from(s)
            .map(Self)
            .map_err(|_| arrayvec::CapacityError::new(()))
    }
}

/// The FIX composite session identity.
///
/// Six components: sender CompID/SubID/LocationID and target
/// CompID/SubID/LocationID. Equality is exact byte equality per component.
/// A composite key maps to exactly one session context for the life of the
/// store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    /// SenderCompID (tag 49).
    pub sender_comp_id: CompId,
    /// SenderSubID (tag 50).
    pub sender_sub_id: CompId,
    /// SenderLocationID (tag 142).
    pub sender_location_id: CompId,
    /// TargetCompID (tag 56).
    pub target_comp_id: CompId,
    /// TargetSubID (tag 57).
    pub target_sub_id: CompId,
    /// TargetLocationID (tag 143).
    pub target_location_id: CompId,
}

impl CompositeKey {
    /// Creates a key from the two mandatory components, leaving sub and
    /// location ids empty.
    #[must_use]
    pub fn new(sender_comp_id: CompId, target_comp_id: CompId) -> Self {
        Self {
            sender_comp_id,
            target_comp_id,
            ..Self::default()
        }
    }

    /// Sets the sender sub id.
    #[must_use]
    pub fn with_sender_sub_id(mut self, id: CompId) -> Self {
        self.sender_sub_id = id;
        self
    }

    /// Sets the sender location id.
    #[must_use]
    pub fn with_sender_location_id(mut self, id: CompId) -> Self {
        self.sender_location_id = id;
        self
    }

    /// Sets the target sub id.
    #[must_use]
    pub fn with_target_sub_id(mut self, id: CompId) -> Self {
        self.target_sub_id = id;
        self
    }

    /// Sets the target location id.
    #[must_use]
    pub fn with_target_location_id(mut self, id: CompId) -> Self {
        self.target_location_id = id;
        self
    }

    fn components(&self) -> [&CompId; KEY_COMPONENTS] {
        [
            &self.sender_comp_id,
            &self.sender_sub_id,
            &self.sender_location_id,
            &self.target_comp_id,
            &self.target_sub_id,
            &self.target_location_id,
        ]
    }

    /// Returns the serialized length of this key.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        KEY_COMPONENTS + self.components().iter().map(|c| c.len()).sum::<usize>()
    }

    /// Serializes the key into `out`.
    ///
    /// Each component is written as a one-byte length prefix followed by its
    /// bytes, in sender-comp/sub/location, target-comp/sub/location order.
    ///
    /// # Errors
    /// Returns [`StoreError::KeyTooLarge`] if `out` is too small.
    pub fn encode_into(&self, out: &mut [u8]) -> std::result::Result<usize, StoreError> {
        let needed = self.encoded_len();
        if out.len() < needed {
            return Err(StoreError::KeyTooLarge {
                length: needed,
                max: out.len(),
            });
        }

        let mut offset = 0;
        for component in self.components() {
            out[offset] = component.len() as u8;
            offset += 1;
            out[offset..offset + component.len()].copy_from_slice(component.as_bytes());
            offset += component.len();
        }
        Ok(offset)
    }

    /// Deserializes a key previously written by [`encode_into`](Self::encode_into).
    ///
    /// # Errors
    /// Returns [`StoreError::KeyCorrupt`] if the buffer is truncated or a
    /// component is not valid UTF-8 of a legal length.
    pub fn decode(buffer: &[u8]) -> std::result::Result<Self, StoreError> {
        let mut offset = 0;
        let mut parts: [CompId; KEY_COMPONENTS] = Default::default();

        for part in &mut parts {
            let length = *buffer.get(offset).ok_or_else(|| StoreError::KeyCorrupt {
                reason: "truncated length prefix".to_string(),
            })? as usize;
            offset += 1;

            if length > COMP_ID_MAX_LEN {
                return Err(StoreError::KeyCorrupt {
                    reason: format!("component length {length} exceeds {COMP_ID_MAX_LEN}"),
                });
            }
            let bytes = buffer
                .get(offset..offset + length)
                .ok_or_else(|| StoreError::KeyCorrupt {
                    reason: "truncated component".to_string(),
                })?;
            let text = std::str::from_utf8(bytes).map_err(|_| StoreError::KeyCorrupt {
                reason: "component is not valid utf-8".to_string(),
            })?;
            *part = CompId::new(text).unwrap_or_default();
            offset += length;
        }

        let [sender_comp_id, sender_sub_id, sender_location_id, target_comp_id, target_sub_id, target_location_id] =
            parts;
        Ok(Self {
            sender_comp_id,
            sender_sub_id,
            sender_location_id,
            target_comp_id,
            target_sub_id,
            target_location_id,
        })
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.sender_comp_id, self.target_comp_id)
    }
}
