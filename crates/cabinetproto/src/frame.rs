// Inbound notification frames sent by cabinet controllers.
//
// A controller reports a panel closure as exactly five bytes:
//   68 03 08 <func> <panel_id>
// There is no length prefix and no checksum, so the decoder recovers framing
// by scanning for the sync byte and dropping one byte at a time on mismatch.

use bytes::{Bytes, BytesMut};
use std::fmt;

// Protocol constants
pub const SYNC_BYTE: u8 = 0x68;
pub const NOTIFY_LEN_BYTE: u8 = 0x03;
pub const NOTIFY_GROUP_BYTE: u8 = 0x08;
pub const NOTIFY_HEADER: [u8; 3] = [SYNC_BYTE, NOTIFY_LEN_BYTE, NOTIFY_GROUP_BYTE];
pub const FRAME_LEN: usize = 5;

/// One complete, validated notification frame
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationFrame {
    raw: [u8; FRAME_LEN],
}

impl NotificationFrame {
    /// Build a frame from its function and panel bytes
    pub fn new(function: u8, panel_id: u8) -> Self {
        Self {
            raw: [
                SYNC_BYTE,
                NOTIFY_LEN_BYTE,
                NOTIFY_GROUP_BYTE,
                function,
                panel_id,
            ],
        }
    }

    /// Validate and copy a frame out of `bytes`
    ///
    /// Returns None unless `bytes` is exactly [`FRAME_LEN`] long and starts
    /// with [`NOTIFY_HEADER`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FRAME_LEN || bytes[..NOTIFY_HEADER.len()] != NOTIFY_HEADER {
            return None;
        }
        let mut raw = [0u8; FRAME_LEN];
        raw.copy_from_slice(bytes);
        Some(Self { raw })
    }

    pub fn function(&self) -> u8 {
        self.raw[3]
    }

    pub fn panel_id(&self) -> u8 {
        self.raw[4]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Lowercase hex dump used in log fields
    pub fn hex(&self) -> String {
        hex::encode(self.raw)
    }
}

impl fmt::Debug for NotificationFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationFrame")
            .field("function", &format_args!("0x{:02x}", self.function()))
            .field("panel_id", &self.panel_id())
            .finish()
    }
}

/// Extract the panel id from a raw notification packet
///
/// Format: 68 03 08 [Function] [Panel_ID]. Returns None if the packet is
/// shorter than a frame or carries a different header.
pub fn parse_notification(packet: &[u8]) -> Option<u8> {
    if packet.len() < FRAME_LEN {
        return None;
    }

    if packet[..NOTIFY_HEADER.len()] != NOTIFY_HEADER {
        return None;
    }

    Some(packet[4])
}

/// Framing state of the bytes currently buffered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Buffer is empty or does not start with a sync byte
    Seeking,
    /// Buffer starts with a sync byte but holds less than a frame
    HaveSync,
    /// Buffer holds at least one full frame not yet extracted
    Complete,
}

/// Incremental decoder for the unframed notification stream
///
/// Bytes are appended with [`FrameDecoder::extend`] and frames pulled with
/// [`FrameDecoder::next_frame`]. After `next_frame` returns None the buffer is
/// either empty or holds the prefix of an incomplete frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    discarded: u64,
    // Bytes skipped during resync, held until taken
    dropped: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete frame, discarding garbage on the way
    pub fn next_frame(&mut self) -> Option<NotificationFrame> {
        while self.buf.len() >= FRAME_LEN {
            let Some(sync_pos) = self.buf.iter().position(|&b| b == SYNC_BYTE) else {
                let len = self.buf.len();
                self.discard(len);
                return None;
            };

            if sync_pos > 0 {
                self.discard(sync_pos);
            }

            if self.buf.len() < FRAME_LEN {
                return None;
            }

            if self.buf[..NOTIFY_HEADER.len()] == NOTIFY_HEADER {
                let raw = self.buf.split_to(FRAME_LEN);
                return NotificationFrame::from_bytes(&raw);
            }

            // False sync, resynchronize one byte further
            self.discard(1);
        }
        None
    }

    /// Extract every complete frame currently buffered, in arrival order
    pub fn drain_frames(&mut self) -> Vec<NotificationFrame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    pub fn state(&self) -> DecoderState {
        match self.buf.first() {
            Some(&SYNC_BYTE) if self.buf.len() < FRAME_LEN => DecoderState::HaveSync,
            Some(&SYNC_BYTE) if self.buf[..NOTIFY_HEADER.len()] == NOTIFY_HEADER => {
                DecoderState::Complete
            }
            _ => DecoderState::Seeking,
        }
    }

    /// Bytes waiting for more input
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total number of bytes dropped while resynchronizing
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Take the bytes skipped since the previous call
    pub fn take_dropped(&mut self) -> Bytes {
        self.dropped.split().freeze()
    }

    fn discard(&mut self, n: usize) {
        let skipped = self.buf.split_to(n);
        tracing::trace!("Discarding {} byte(s) while seeking sync: {}", n, hex::encode(&skipped));
        self.dropped.extend_from_slice(&skipped);
        self.discarded += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<NotificationFrame> {
        let mut decoder = FrameDecoder::new();
        decoder.extend(input);
        decoder.drain_frames()
    }

    #[test]
    fn test_single_frame() {
        let frames = decode_all(&[0x68, 0x03, 0x08, 0x01, 0x0b]);
        assert_eq!(frames, vec![NotificationFrame::new(0x01, 0x0b)]);
        assert_eq!(frames[0].panel_id(), 11);
        assert_eq!(frames[0].function(), 1);
        assert_eq!(frames[0].hex(), "680308010b");
    }

    #[test]
    fn test_garbage_between_frames() {
        let mut stream = vec![0x00, 0xff, 0x13];
        stream.extend_from_slice(NotificationFrame::new(1, 2).as_bytes());
        stream.extend_from_slice(&[0x68, 0x99, 0x42]);
        stream.extend_from_slice(NotificationFrame::new(1, 3).as_bytes());
        stream.extend_from_slice(&[0x10, 0x20]);
        stream.extend_from_slice(NotificationFrame::new(3, 4).as_bytes());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&stream);
        let frames = decoder.drain_frames();

        let panels: Vec<u8> = frames.iter().map(|f| f.panel_id()).collect();
        assert_eq!(panels, vec![2, 3, 4]);
        assert!(decoder.is_empty());
        assert_eq!(decoder.discarded(), 3 + 3 + 2);
        assert_eq!(
            &decoder.take_dropped()[..],
            &[0x00, 0xff, 0x13, 0x68, 0x99, 0x42, 0x10, 0x20]
        );
        assert!(decoder.take_dropped().is_empty());
    }

    #[test]
    fn test_chunk_size_independent() {
        let mut stream = vec![0x68, 0x68, 0x03];
        for panel in 0..20u8 {
            stream.extend_from_slice(NotificationFrame::new(0x01, panel).as_bytes());
            stream.extend_from_slice(&[0x68, 0x03, 0x07, panel]);
        }
        stream.extend_from_slice(&[0x68, 0x03, 0x08, 0x01]);

        let whole = decode_all(&stream);

        for chunk in [1usize, 2, 3, 4, 5, 7, 64] {
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();
            for piece in stream.chunks(chunk) {
                decoder.extend(piece);
                frames.extend(decoder.drain_frames());
            }
            assert_eq!(frames, whole, "chunk size {}", chunk);
            assert_eq!(decoder.buffered(), &[0x68, 0x03, 0x08, 0x01]);
        }
        assert_eq!(whole.len(), 20);
    }

    #[test]
    fn test_short_buffer_untouched() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x01, 0x02, 0x03, 0x04]);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(decoder.discarded(), 0);
    }

    #[test]
    fn test_partial_frame_after_sync_kept() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0xaa, 0xbb, 0x68, 0x03, 0x08]);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), &[0x68, 0x03, 0x08]);
        assert_eq!(decoder.state(), DecoderState::HaveSync);

        decoder.extend(&[0x02, 0x09]);
        assert_eq!(decoder.state(), DecoderState::Complete);
        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.panel_id(), 9);
        assert_eq!(decoder.state(), DecoderState::Seeking);
    }

    #[test]
    fn test_no_sync_discards_everything() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert!(decoder.next_frame().is_none());
        assert!(decoder.is_empty());
        assert_eq!(decoder.discarded(), 6);
    }

    #[test]
    fn test_false_sync_drops_one_byte() {
        // The second 0x68 starts the real frame.
        let frames = decode_all(&[0x68, 0x68, 0x03, 0x08, 0x05, 0x06]);
        assert_eq!(frames, vec![NotificationFrame::new(0x05, 0x06)]);
    }

    #[test]
    fn test_parse_notification() {
        assert_eq!(parse_notification(&[0x68, 0x03, 0x08, 0x01, 0x07]), Some(7));
        assert_eq!(parse_notification(&[0x68, 0x03, 0x08, 0x01]), None);
        assert_eq!(parse_notification(&[0x68, 0x04, 0x09, 0x01, 0x07]), None);
    }

    #[test]
    fn test_from_bytes_rejects_bad_header() {
        assert!(NotificationFrame::from_bytes(&[0x68, 0x03, 0x09, 0x01, 0x02]).is_none());
        assert!(NotificationFrame::from_bytes(&[0x68, 0x03, 0x08, 0x01]).is_none());
    }
}
