/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Possible-duplicate rewriting.
//!
//! A replayed message must be byte-equivalent to the original except for the
//! duplicate marking: `PossDupFlag` (43) set to `Y`, injected immediately
//! before `SendingTime` (52) when absent per the standard header
//! convention, and `OrigSendingTime` (122) carrying the original
//! `SendingTime` when the injection path runs. `BodyLength` (9) and
//! `CheckSum` (10) are recomputed whenever the rewrite changes any byte they
//! cover, so every replayed message re-validates on the counterparty's
//! framer.
//!
//! Rewrites are planned first and rendered second: the plan computes the
//! exact target length so the replayer can claim a publication buffer of
//! that size and render straight into it.

use ferrofix_core::checksum::{
    ascii_u32_len, calculate_checksum, encode_ascii_u32, format_checksum,
};
use ferrofix_core::error::ReplayError;
use ferrofix_core::scanner::{scan, HeaderScan};

/// The injected PossDupFlag field.
pub const POSS_DUP_FIELD: &[u8] = b"43=Y\x01";

#[derive(Debug)]
enum Mode {
    /// Tag 43 absent: splice `insertion` in ahead of SendingTime and reframe.
    Inject {
        insertion: Vec<u8>,
        body_length_value: std::ops::Range<usize>,
        new_body_length: u32,
        sending_time_offset: usize,
        checksum_offset: usize,
    },
    /// Tag 43 present: overwrite its value byte, re-patching the checksum
    /// only if that byte actually changes.
    Flip {
        poss_dup_offset: usize,
        checksum_offset: Option<usize>,
        changed: bool,
    },
}

/// A planned possible-duplicate rewrite of one recorded message.
#[derive(Debug)]
pub struct RewritePlan<'a> {
    message: &'a [u8],
    mode: Mode,
    target_len: usize,
}

impl<'a> RewritePlan<'a> {
    /// Plans the rewrite of `message`.
    ///
    /// # Errors
    /// Returns [`ReplayError`] if the message lacks the fields the rewrite
    /// pivots on: `SendingTime` for the injection point, or `BodyLength` /
    /// `CheckSum` framing for the recomputation.
    pub fn plan(message: &'a [u8]) -> Result<Self, ReplayError> {
        let scanned: HeaderScan = scan(message);
        let sequence_number = scanned.msg_seq_num.map_or(-1, |seq| seq as i32);

        if let Some(poss_dup_offset) = scanned.poss_dup_offset {
            return Ok(Self {
                message,
                mode: Mode::Flip {
                    poss_dup_offset,
                    checksum_offset: scanned.checksum_offset,
                    changed: message[poss_dup_offset] != b'Y',
                },
                target_len: message.len(),
            });
        }

        let Some(sending_time_offset) = scanned.sending_time_offset else {
            return Err(ReplayError::MissingSendingTime { sequence_number });
        };
        let (Some(body_length), Some(body_length_value)) =
            (scanned.body_length, scanned.body_length_value.clone())
        else {
            return Err(ReplayError::MalformedRecordedMessage {
                sequence_number,
                reason: "no BodyLength field".to_string(),
            });
        };
        let Some(checksum_offset) = scanned.checksum_offset else {
            return Err(ReplayError::MalformedRecordedMessage {
                sequence_number,
                reason: "no CheckSum field".to_string(),
            });
        };

        let mut insertion = POSS_DUP_FIELD.to_vec();
        if scanned.orig_sending_time_offset.is_none() {
            if let Some(sending_time) = scanned.sending_time.clone() {
                insertion.extend_from_slice(b"122=");
                insertion.extend_from_slice(&message[sending_time]);
                insertion.push(0x01);
            }
        }

        let new_body_length = body_length + insertion.len() as u32;
        let delta =
            ascii_u32_len(new_body_length) as isize - body_length_value.len() as isize;
        let target_len =
            (message.len() as isize + insertion.len() as isize + delta) as usize;

        Ok(Self {
            message,
            mode: Mode::Inject {
                insertion,
                body_length_value,
                new_body_length,
                sending_time_offset,
                checksum_offset,
            },
            target_len,
        })
    }

    /// Length of the rewritten message.
    #[inline]
    #[must_use]
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    /// Renders the rewritten message into `out`, which must be exactly
    /// [`target_len`](Self::target_len) bytes.
    pub fn render(&self, out: &mut [u8]) {
        match &self.mode {
            Mode::Flip {
                poss_dup_offset,
                checksum_offset,
                changed,
            } => {
                out.copy_from_slice(self.message);
                out[*poss_dup_offset] = b'Y';
                if *changed {
                    if let Some(checksum_offset) = checksum_offset {
                        patch_trailer(out, *checksum_offset);
                    }
                }
            }
            Mode::Inject {
                insertion,
                body_length_value,
                new_body_length,
                sending_time_offset,
                checksum_offset,
            } => {
                // Everything up to the BodyLength value is unchanged.
                let mut written = body_length_value.start;
                out[..written].copy_from_slice(&self.message[..written]);

                // The recomputed BodyLength value.
                let digits = ascii_u32_len(*new_body_length);
                encode_ascii_u32(*new_body_length, &mut out[written..written + digits]);
                written += digits;

                // Header fields between BodyLength and SendingTime.
                let head = &self.message[body_length_value.end..*sending_time_offset];
                out[written..written + head.len()].copy_from_slice(head);
                written += head.len();

                // The duplicate marking, immediately before SendingTime.
                out[written..written + insertion.len()].copy_from_slice(insertion);
                written += insertion.len();

                // SendingTime through the end of the body.
                let tail = &self.message[*sending_time_offset..*checksum_offset];
                out[written..written + tail.len()].copy_from_slice(tail);
                written += tail.len();

                // Fresh trailer.
                write_trailer(out, written);
            }
        }
    }
}

fn write_trailer(out: &mut [u8], checksum_offset: usize) {
    let digits = format_checksum(calculate_checksum(&out[..checksum_offset]));
    out[checksum_offset..checksum_offset + 3].copy_from_slice(b"10=");
    out[checksum_offset + 3..checksum_offset + 6].copy_from_slice(&digits);
    out[checksum_offset + 6] = 0x01;
}

fn patch_trailer(out: &mut [u8], checksum_offset: usize) {
    let digits = format_checksum(calculate_checksum(&out[..checksum_offset]));
    out[checksum_offset + 3..checksum_offset + 6].copy_from_slice(&digits);
}
