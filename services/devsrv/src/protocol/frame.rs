//! Frame codec
//!
//! Every frame is `F5 AA <type> <payload..> <checksum>`, where the checksum
//! is the low byte of the sum of all preceding bytes.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt::Write;

/// Leading bytes of every frame in both directions
pub const HEADER: [u8; 2] = [0xF5, 0xAA];

/// Index of the type byte
pub const TYPE_INDEX: usize = 2;

/// Fixed length of an unsolicited device report
pub const REPORT_LEN: usize = 6;

/// Frame type bytes
pub mod frame_type {
    /// Connectivity test and heartbeat
    pub const LINK: u8 = 0x01;
    /// Heater control and status
    pub const HEATER: u8 = 0x03;
    /// Temperature and humidity read
    pub const CLIMATE: u8 = 0x04;
    /// Remaining potion read
    pub const POTION: u8 = 0x07;
    /// Unsolicited report and its acknowledgement
    pub const REPORT: u8 = 0x08;
}

/// Low byte of the sum of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Build `header + type + payload + checksum`
pub fn encode(frame_type: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER.len() + 2 + payload.len());
    buf.put_slice(&HEADER);
    buf.put_u8(frame_type);
    buf.put_slice(payload);
    let sum = checksum(&buf);
    buf.put_u8(sum);
    buf.freeze()
}

/// True iff the last byte equals the checksum of everything before it
///
/// An empty slice is never valid.
pub fn verify_checksum(bytes: &[u8]) -> bool {
    match bytes.split_last() {
        Some((last, body)) => *last == checksum(body),
        None => false,
    }
}

/// Borrowed view over one received buffer
///
/// Devices do not pad or length-prefix frames, so every accessor takes the
/// length that is meaningful for the frame being inspected.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Type byte, if the buffer is long enough to carry one
    pub fn frame_type(&self) -> Option<u8> {
        self.bytes.get(TYPE_INDEX).copied()
    }

    /// The first `len` bytes, if present
    pub fn window(&self, len: usize) -> Option<&'a [u8]> {
        self.bytes.get(..len)
    }

    /// Checksum check over the first `len` bytes
    pub fn is_valid(&self, len: usize) -> bool {
        self.window(len).is_some_and(verify_checksum)
    }

    /// Bytes between the type byte and the checksum of a `len`-byte frame
    pub fn payload(&self, len: usize) -> Option<&'a [u8]> {
        if len < TYPE_INDEX + 2 {
            return None;
        }
        self.window(len).map(|w| &w[TYPE_INDEX + 1..len - 1])
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Uppercase hex rendering for frame logs, e.g. `F5AA0800A7`
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail
        let _ = write!(&mut out, "{:02X}", byte);
    }
    out
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_checksum() {
        let frame = encode(frame_type::LINK, &[0x00, 0x01]);
        // F5 + AA + 01 + 00 + 01 = 0x1A1 -> A1
        assert_eq!(&frame[..], &[0xF5, 0xAA, 0x01, 0x00, 0x01, 0xA1]);
        assert_eq!(to_hex(&frame), "F5AA010001A1");
    }

    #[test]
    fn test_encode_without_payload() {
        let frame = encode(frame_type::POTION, &[]);
        assert_eq!(&frame[..], &[0xF5, 0xAA, 0x07, 0xA6]);
    }

    #[test]
    fn test_encoded_frames_verify() {
        let payloads: [&[u8]; 5] = [&[], &[0x00], &[0x01, 0x08], &[0xFF; 16], &[0x80, 0x7F, 0x00]];
        for (i, payload) in payloads.iter().enumerate() {
            let frame = encode(i as u8, payload);
            assert!(verify_checksum(&frame), "frame {} must verify", to_hex(&frame));

            // Header, type and payload come back unchanged, checksum last
            let (sum, body) = frame.split_last().unwrap();
            assert_eq!(&body[..2], &HEADER);
            assert_eq!(body[2], i as u8);
            assert_eq!(&body[3..], *payload);
            assert_eq!(*sum, checksum(body));
        }
    }

    #[test]
    fn test_single_byte_tamper_detected() {
        let frame = encode(frame_type::HEATER, &[0x01, 0x05]).to_vec();
        for index in 0..frame.len() {
            for delta in [1u8, 0x10, 0x80] {
                let mut tampered = frame.clone();
                tampered[index] = tampered[index].wrapping_add(delta);
                assert!(
                    !verify_checksum(&tampered),
                    "flip at {} by {:#x} went unnoticed",
                    index,
                    delta
                );
            }
        }
    }

    #[test]
    fn test_verify_rejects_empty_and_short() {
        assert!(!verify_checksum(&[]));
        assert!(verify_checksum(&[0x00]));
        assert!(!verify_checksum(&[0x01]));
    }

    #[test]
    fn test_frame_view_payload() {
        // Heater response with two trailing junk bytes
        let mut bytes = encode(frame_type::HEATER, &[0x00, 0x01, 0x05, 0x02]).to_vec();
        bytes.extend_from_slice(&[0xDE, 0xAD]);

        let view = FrameView::new(&bytes);
        assert_eq!(view.frame_type(), Some(frame_type::HEATER));
        assert!(view.is_valid(8));
        assert!(!view.is_valid(10));
        assert_eq!(view.payload(8), Some(&[0x00, 0x01, 0x05, 0x02][..]));
        assert_eq!(view.payload(20), None);
    }

    #[test]
    fn test_frame_view_short_buffer() {
        let view = FrameView::new(&[0xF5, 0xAA]);
        assert_eq!(view.frame_type(), None);
        assert!(!view.is_valid(5));
        assert_eq!(view.payload(2), None);
    }
}
