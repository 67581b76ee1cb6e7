/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Single-pass FIX header scanner.
//!
//! The persistence core never validates FIX semantics; it only needs the
//! offsets of a handful of standard-header fields to index a message and to
//! rewrite it on replay. [`scan`] walks the `tag=value\x01` pairs once and
//! returns every offset of interest as a plain value, so callers get
//! `(poss_dup_offset, sending_time_offset)` and friends without any callback
//! plumbing.

use crate::checksum::{parse_ascii_u32, SOH};
use crate::types::{CompId, CompositeKey};
use memchr::memchr;
use std::ops::Range;

/// Equals sign delimiter between tag and value.
const EQUALS: u8 = b'=';

/// Offsets and values recorded by one pass over a FIX message.
///
/// All ranges and offsets are relative to the start of the scanned buffer.
/// A `None` means the tag was not present before the `10=` field.
#[derive(Debug, Clone, Default)]
pub struct HeaderScan {
    /// Value range of MsgType (tag 35).
    pub msg_type: Option<Range<usize>>,
    /// MsgSeqNum (tag 34).
    pub msg_seq_num: Option<u32>,
    /// BeginSeqNo (tag 7), present on resend requests.
    pub begin_seq_no: Option<u32>,
    /// EndSeqNo (tag 16), present on resend requests.
    pub end_seq_no: Option<u32>,
    /// Offset of the value byte of PossDupFlag (tag 43).
    pub poss_dup_offset: Option<usize>,
    /// Offset of the start of the SendingTime field (the `5` of `52=`).
    pub sending_time_offset: Option<usize>,
    /// Value range of SendingTime (tag 52).
    pub sending_time: Option<Range<usize>>,
    /// Offset of the start of the OrigSendingTime field (tag 122).
    pub orig_sending_time_offset: Option<usize>,
    /// BodyLength (tag 9).
    pub body_length: Option<u32>,
    /// Value range of BodyLength (tag 9).
    pub body_length_value: Option<Range<usize>>,
    /// Offset of the start of the CheckSum field (the `1` of `10=`).
    pub checksum_offset: Option<usize>,
    /// Value range of SenderCompID (tag 49).
    pub sender_comp_id: Option<Range<usize>>,
    /// Value range of SenderSubID (tag 50).
    pub sender_sub_id: Option<Range<usize>>,
    /// Value range of SenderLocationID (tag 142).
    pub sender_location_id: Option<Range<usize>>,
    /// Value range of TargetCompID (tag 56).
    pub target_comp_id: Option<Range<usize>>,
    /// Value range of TargetSubID (tag 57).
    pub target_sub_id: Option<Range<usize>>,
    /// Value range of TargetLocationID (tag 143).
    pub target_location_id: Option<Range<usize>>,
}

impl HeaderScan {
    /// Returns the MsgType value bytes.
    #[must_use]
    pub fn msg_type_bytes<'a>(&self, message: &'a [u8]) -> Option<&'a [u8]> {
        self.msg_type.clone().map(|r| &message[r])
    }

    /// Returns true if the scanned message is a `ResendRequest` (35=2).
    #[must_use]
    pub fn is_resend_request(&self, message: &[u8]) -> bool {
        self.msg_type_bytes(message) == Some(b"2")
    }

    /// Returns true if the scanned message is a `Logon` (35=A).
    #[must_use]
    pub fn is_logon(&self, message: &[u8]) -> bool {
        self.msg_type_bytes(message) == Some(b"A")
    }

    /// Builds the composite session key from the scanned comp id fields.
    ///
    /// # Returns
    /// `None` if SenderCompID or TargetCompID is absent, over-long, or not
    /// valid UTF-8. Absent sub and location ids are left empty.
    #[must_use]
    pub fn composite_key(&self, message: &[u8]) -> Option<CompositeKey> {
        let comp_id = |range: &Option<Range<usize>>| -> Option<CompId> {
            match range {
                Some(r) => CompId::new(std::str::from_utf8(&message[r.clone()]).ok()?),
                None => Some(CompId::empty()),
            }
        };

        let sender = comp_id(&self.sender_comp_id)?;
        let target = comp_id(&self.target_comp_id)?;
        if sender.is_empty() || target.is_empty() {
            return None;
        }

        Some(
            CompositeKey::new(sender, target)
                .with_sender_sub_id(comp_id(&self.sender_sub_id)?)
                .with_sender_location_id(comp_id(&self.sender_location_id)?)
                .with_target_sub_id(comp_id(&self.target_sub_id)?)
                .with_target_location_id(comp_id(&self.target_location_id)?),
        )
    }
}

/// Scans a FIX message, recording header field offsets of interest.
///
/// Scanning stops after the `10=` field. Malformed trailing bytes terminate
/// the scan early; whatever was recorded up to that point is returned.
#[must_use]
pub fn scan(message: &[u8]) -> HeaderScan {
    let mut result = HeaderScan::default();
    let mut offset = 0;

    while offset < message.len() {
        let remaining = &message[offset..];
        let Some(eq) = memchr(EQUALS, remaining) else {
            break;
        };
        let Some(tag) = parse_ascii_u32(&remaining[..eq]) else {
            break;
        };
        let value_start = offset + eq + 1;
        let Some(soh) = memchr(SOH, &message[value_start..]) else {
            break;
        };
        let value = value_start..value_start + soh;

        match tag {
            7 => result.begin_seq_no = parse_ascii_u32(&message[value.clone()]),
            9 => {
                result.body_length = parse_ascii_u32(&message[value.clone()]);
                result.body_length_value = Some(value.clone());
            }
            10 => {
                result.checksum_offset = Some(offset);
                return result;
            }
            16 => result.end_seq_no = parse_ascii_u32(&message[value.clone()]),
            34 => result.msg_seq_num = parse_ascii_u32(&message[value.clone()]),
            35 => result.msg_type = Some(value.clone()),
            43 => result.poss_dup_offset = Some(value.start),
            49 => result.sender_comp_id = Some(value.clone()),
            50 => result.sender_sub_id = Some(value.clone()),
            52 => {
                result.sending_time_offset = Some(offset);
                result.sending_time = Some(value.clone());
            }
            56 => result.target_comp_id = Some(value.clone()),
            57 => result.target_sub_id = Some(value.clone()),
            122 => result.orig_sending_time_offset = Some(offset),
            142 => result.sender_location_id = Some(value.clone()),
            143 => result.target_location_id = Some(value.clone()),
            _ => {}
        }

        offset = value.end + 1;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: &[u8] = b"8=FIX.4.4\x019=68\x0135=D\x0149=INIT\x0150=DESK\x0156=EXCH\x0134=7\x0152=20260127-10:00:00.000\x0111=abc\x0110=123\x01";

    #[test]
    fn test_scan_order_header() {
        let scan = scan(ORDER);
        assert_eq!(scan.msg_type_bytes(ORDER), Some(&b"D"[..]));
        assert_eq!(scan.msg_seq_num, Some(7));
        assert_eq!(scan.body_length, Some(68));
        assert!(scan.poss_dup_offset.is_none());

        let st = scan.sending_time_offset.unwrap();
        assert_eq!(&ORDER[st..st + 3], b"52=");
        let cs = scan.checksum_offset.unwrap();
        assert_eq!(&ORDER[cs..cs + 3], b"10=");
    }

    #[test]
    fn test_scan_poss_dup_value_offset() {
        let msg = b"8=FIX.4.4\x019=20\x0135=0\x0143=N\x0152=x\x0110=000\x01";
        let scanned = scan(msg);
        let offset = scanned.poss_dup_offset.unwrap();
        assert_eq!(msg[offset], b'N');
    }

    #[test]
    fn test_scan_resend_request() {
        let msg = b"8=FIX.4.4\x019=16\x0135=2\x017=2\x0116=4\x0110=000\x01";
        let scanned = scan(msg);
        assert!(scanned.is_resend_request(msg));
        assert_eq!(scanned.begin_seq_no, Some(2));
        assert_eq!(scanned.end_seq_no, Some(4));
    }

    #[test]
    fn test_scan_stops_at_checksum() {
        // A 34= after 10= must not be picked up.
        let msg = b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x0134=9\x01";
        let scanned = scan(msg);
        assert_eq!(scanned.msg_seq_num, None);
    }

    #[test]
    fn test_composite_key_from_logon() {
        let msg =
            b"8=FIX.4.4\x019=40\x0135=A\x0149=INIT\x0156=EXCH\x0157=GW\x01143=LDN\x0134=1\x0110=000\x01";
        let scanned = scan(msg);
        assert!(scanned.is_logon(msg));

        let key = scanned.composite_key(msg).unwrap();
        assert_eq!(key.sender_comp_id.as_str(), "INIT");
        assert_eq!(key.target_comp_id.as_str(), "EXCH");
        assert_eq!(key.target_sub_id.as_str(), "GW");
        assert_eq!(key.target_location_id.as_str(), "LDN");
        assert!(key.sender_sub_id.is_empty());
    }

    #[test]
    fn test_composite_key_requires_comp_ids() {
        let msg = b"8=FIX.4.4\x019=10\x0135=A\x0134=1\x0110=000\x01";
        assert!(scan(msg).composite_key(msg).is_none());
    }

    #[test]
    fn test_scan_tolerates_garbage() {
        let scanned = scan(b"not a fix message at all");
        assert!(scanned.msg_type.is_none());
        assert!(scanned.checksum_offset.is_none());
    }
}
