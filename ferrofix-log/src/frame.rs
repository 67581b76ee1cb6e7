/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Fragment frame layout and reassembly.
//!
//! Every committed message occupies one or more frames in a recording. Each
//! frame is an 8-byte header (`payload_length: u32`, `flags: u8`, 3 bytes of
//! padding) followed by the payload, padded so the frame occupies a multiple
//! of [`FRAME_ALIGNMENT`] bytes. A subscription delivers one payload per
//! frame together with a [`FrameHeader`] whose `position` is the log position
//! immediately after the frame.

use std::collections::HashMap;

/// Alignment of every frame in a recording, in bytes.
pub const FRAME_ALIGNMENT: usize = 32;

/// Length of the per-fragment header in bytes.
pub const FRAGMENT_HEADER_LEN: usize = 8;

/// Flag bit marking the first fragment of a message.
pub const BEGIN_FRAG_FLAG: u8 = 0x80;

/// Flag bit marking the last fragment of a message.
pub const END_FRAG_FLAG: u8 = 0x40;

/// Flags value of a message that fits a single frame.
pub const UNFRAGMENTED: u8 = BEGIN_FRAG_FLAG | END_FRAG_FLAG;

/// Returns the aligned number of recording bytes a fragment payload occupies,
/// including its frame header and padding.
#[inline]
#[must_use]
pub const fn aligned_frame_length(payload_length: usize) -> usize {
    (FRAGMENT_HEADER_LEN + payload_length + FRAME_ALIGNMENT - 1) & !(FRAME_ALIGNMENT - 1)
}

/// Delivery metadata of one polled fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Stream the fragment was published on.
    pub stream_id: i32,
    /// Log-level session id of the publisher.
    pub log_session_id: i32,
    /// Log position immediately after this fragment.
    pub position: u64,
    /// Fragmentation flags.
    pub flags: u8,
}

impl FrameHeader {
    /// Returns true if the fragment is a whole message.
    #[inline]
    #[must_use]
    pub const fn is_unfragmented(&self) -> bool {
        self.flags & UNFRAGMENTED == UNFRAGMENTED
    }

    /// Returns true if the fragment begins a message.
    #[inline]
    #[must_use]
    pub const fn is_begin(&self) -> bool {
        self.flags & BEGIN_FRAG_FLAG == BEGIN_FRAG_FLAG
    }

    /// Returns true if the fragment ends a message.
    #[inline]
    #[must_use]
    pub const fn is_end(&self) -> bool {
        self.flags & END_FRAG_FLAG == END_FRAG_FLAG
    }
}

/// Receiver of polled fragments.
pub trait FragmentHandler {
    /// Handles one fragment. `payload` excludes the frame header and padding.
    fn on_fragment(&mut self, payload: &[u8], header: &FrameHeader);
}

impl<F: FnMut(&[u8], &FrameHeader)> FragmentHandler for F {
    fn on_fragment(&mut self, payload: &[u8], header: &FrameHeader) {
        self(payload, header)
    }
}

/// Reassembles fragmented messages before handing them on.
///
/// Buffers BEGIN/MID fragments per publisher; on the END fragment the
/// complete payload is delivered with the END fragment's header, flags
/// rewritten to [`UNFRAGMENTED`]. Unfragmented messages pass straight
/// through. The assembler holds state across polls, so it must outlive the
/// poll loop that feeds it.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    buffers: HashMap<i32, Vec<u8>>,
}

impl FragmentAssembler {
    /// Creates an assembler with no buffered fragments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment, invoking `handler` for each completed message.
    pub fn on_fragment(
        &mut self,
        payload: &[u8],
        header: &FrameHeader,
        handler: &mut dyn FragmentHandler,
    ) {
        if header.is_unfragmented() {
            handler.on_fragment(payload, header);
            return;
        }

        if header.is_begin() {
            let buffer = self.buffers.entry(header.log_session_id).or_default();
            buffer.clear();
            buffer.extend_from_slice(payload);
            return;
        }

        let Some(buffer) = self.buffers.get_mut(&header.log_session_id) else {
            // Continuation with no begin: joined mid-message, drop it.
            tracing::trace!(
                log_session_id = header.log_session_id,
                position = header.position,
                "dropping unassemblable continuation fragment"
            );
            return;
        };
        buffer.extend_from_slice(payload);

        if header.is_end() {
            let assembled = self.buffers.remove(&header.log_session_id).unwrap_or_default();
            let assembled_header = FrameHeader {
                flags: UNFRAGMENTED,
                ..*header
            };
            handler.on_fragment(&assembled, &assembled_header);
        }
    }
}

/// Adapter that threads a borrowed [`FragmentAssembler`] in front of a
/// handler, so poll loops can pass a single `FragmentHandler`.
pub struct AssemblingHandler<'a, H: FragmentHandler> {
    assembler: &'a mut FragmentAssembler,
    handler: H,
}

impl<'a, H: FragmentHandler> AssemblingHandler<'a, H> {
    /// Wraps `handler` behind `assembler`.
    pub fn new(assembler: &'a mut FragmentAssembler, handler: H) -> Self {
        Self { assembler, handler }
    }
}

impl<H: FragmentHandler> FragmentHandler for AssemblingHandler<'_, H> {
    fn on_fragment(&mut self, payload: &[u8], header: &FrameHeader) {
        self.assembler.on_fragment(payload, header, &mut self.handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(log_session_id: i32, position: u64, flags: u8) -> FrameHeader {
        FrameHeader {
            stream_id: 1,
            log_session_id,
            position,
            flags,
        }
    }

    #[test]
    fn test_aligned_frame_length() {
        assert_eq!(aligned_frame_length(0), 32);
        assert_eq!(aligned_frame_length(24), 32);
        assert_eq!(aligned_frame_length(25), 64);
        assert_eq!(aligned_frame_length(56), 64);
    }

    #[test]
    fn test_assembler_passes_unfragmented() {
        let mut assembler = FragmentAssembler::new();
        let mut seen = Vec::new();
        assembler.on_fragment(
            b"whole",
            &header(7, 32, UNFRAGMENTED),
            &mut |payload: &[u8], _h: &FrameHeader| seen.push(payload.to_vec()),
        );
        assert_eq!(seen, vec![b"whole".to_vec()]);
    }

    #[test]
    fn test_assembler_reassembles() {
        let mut assembler = FragmentAssembler::new();
        let mut seen: Vec<(Vec<u8>, FrameHeader)> = Vec::new();

        assembler.on_fragment(b"one-", &header(7, 32, BEGIN_FRAG_FLAG), &mut |p: &[u8],
                                                                              h: &FrameHeader| {
            seen.push((p.to_vec(), *h))
        });
        assembler.on_fragment(b"two-", &header(7, 64, 0), &mut |p: &[u8], h: &FrameHeader| {
            seen.push((p.to_vec(), *h))
        });
        assembler.on_fragment(b"three", &header(7, 96, END_FRAG_FLAG), &mut |p: &[u8],
                                                                             h: &FrameHeader| {
            seen.push((p.to_vec(), *h))
        });

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, b"one-two-three".to_vec());
        assert_eq!(seen[0].1.position, 96);
        assert!(seen[0].1.is_unfragmented());
    }

    #[test]
    fn test_assembler_interleaves_publishers() {
        let mut assembler = FragmentAssembler::new();
        let mut seen = Vec::new();
        let mut push = |p: &[u8], _h: &FrameHeader| seen.push(p.to_vec());

        assembler.on_fragment(b"a1", &header(1, 32, BEGIN_FRAG_FLAG), &mut push);
        assembler.on_fragment(b"b1", &header(2, 32, BEGIN_FRAG_FLAG), &mut push);
        assembler.on_fragment(b"a2", &header(1, 64, END_FRAG_FLAG), &mut push);
        assembler.on_fragment(b"b2", &header(2, 64, END_FRAG_FLAG), &mut push);

        assert_eq!(seen, vec![b"a1a2".to_vec(), b"b1b2".to_vec()]);
    }

    #[test]
    fn test_assembler_drops_mid_without_begin() {
        let mut assembler = FragmentAssembler::new();
        let mut seen = Vec::new();
        assembler.on_fragment(
            b"tail",
            &header(9, 64, END_FRAG_FLAG),
            &mut |p: &[u8], _h: &FrameHeader| seen.push(p.to_vec()),
        );
        assert!(seen.is_empty());
    }
}
