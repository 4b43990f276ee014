//! TCP packet framing: fixed 16-byte header + variable body.
//!
//! ```text
//! offset  bytes  field
//! 0       2      magic       0xEF89
//! 2       1      version     1
//! 3       1      flags       reserved, must be 0
//! 4       2      command     command id
//! 6       4      sequence    request/response correlation
//! 10      4      body_length
//! 14      2      crc16       CRC-16/CCITT over body
//! ```
//!
//! `feed()` accumulates bytes across calls and yields every complete frame
//! it can assemble; partial frames remain buffered for the next call.

use bytes::{Buf, BytesMut};
use std::time::{Duration, Instant};

pub const MAGIC: u16 = 0xEF89;
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 16;
pub const MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum CodecError {
    #[error("invalid magic bytes")]
    InvalidMagic,
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("body length {0} exceeds cap {MAX_BODY_LEN}")]
    BodyTooLong(u32),
    #[error("CRC mismatch: expected {expected:#06x}, computed {computed:#06x}")]
    CrcMismatch { expected: u16, computed: u16 },
}

impl CodecError {
    /// `InvalidMagic` and `CrcMismatch` are fatal for the byte stream: the
    /// buffer must be cleared and the supervisor notified to reconnect.
    pub fn is_fatal_stream_error(&self) -> bool {
        matches!(self, CodecError::InvalidMagic | CodecError::CrcMismatch { .. })
    }
}

/// A single fully-decoded frame: command id, correlation sequence, body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u16,
    pub sequence: u32,
    pub body: Vec<u8>,
}

/// Severity tiers for a detected sequence gap in a correlated server-push
/// stream (see `PacketCodec::feed`'s gap-detection contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLoss {
    pub expected: u32,
    pub received: u32,
    pub gap: u32,
}

impl PacketLoss {
    /// `gap <= 3`: rely on send-ACK retransmission (log only).
    /// `4..=10`: ask the sync engine to pull.
    /// `>10`: force a reconnect plus full incremental sync.
    pub fn severity(&self) -> PacketLossSeverity {
        match self.gap {
            0..=3 => PacketLossSeverity::LogOnly,
            4..=10 => PacketLossSeverity::RequestSync,
            _ => PacketLossSeverity::ForceReconnect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLossSeverity {
    LogOnly,
    RequestSync,
    ForceReconnect,
}

/// Encode a single frame: header (with computed CRC) followed by the body.
pub fn encode(command: u16, sequence: u32, body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let body_len = body.len();
    if body_len > MAX_BODY_LEN as usize {
        return Err(CodecError::BodyTooLong(body_len as u32));
    }
    let crc = crc16_ccitt(body);
    let mut out = Vec::with_capacity(HEADER_LEN + body_len);
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.push(VERSION);
    out.push(0); // flags, reserved
    out.extend_from_slice(&command.to_be_bytes());
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(&(body_len as u32).to_be_bytes());
    out.extend_from_slice(&crc.to_be_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(10);

/// Stream-reassembling TCP frame decoder. Keeps an internal buffer across
/// `feed()` calls so partial frames delivered by the kernel TCP stack are
/// reassembled transparently.
pub struct PacketCodec {
    buf: BytesMut,
    last_seen_push_seq: Option<u32>,
    last_loss_signal_at: Option<Instant>,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketCodec {
    pub fn new() -> Self {
        PacketCodec {
            buf: BytesMut::new(),
            last_seen_push_seq: None,
            last_loss_signal_at: None,
        }
    }

    /// Feed newly-received bytes and return every frame that can be fully
    /// assembled from the internal buffer. On a fatal error the buffer is
    /// cleared before the error is returned; callers must stop feeding this
    /// codec and reconnect.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, CodecError> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }

            let magic = u16::from_be_bytes([self.buf[0], self.buf[1]]);
            if magic != MAGIC {
                self.buf.clear();
                return Err(CodecError::InvalidMagic);
            }

            let version = self.buf[2];
            if version != VERSION {
                self.buf.clear();
                return Err(CodecError::UnsupportedVersion(version));
            }

            let command = u16::from_be_bytes([self.buf[4], self.buf[5]]);
            let sequence = u32::from_be_bytes([self.buf[6], self.buf[7], self.buf[8], self.buf[9]]);
            let body_len =
                u32::from_be_bytes([self.buf[10], self.buf[11], self.buf[12], self.buf[13]]);
            if body_len > MAX_BODY_LEN {
                self.buf.clear();
                return Err(CodecError::BodyTooLong(body_len));
            }
            let expected_crc = u16::from_be_bytes([self.buf[14], self.buf[15]]);

            let total_len = HEADER_LEN + body_len as usize;
            if self.buf.len() < total_len {
                // Partial frame; wait for more bytes.
                break;
            }

            let body = self.buf[HEADER_LEN..total_len].to_vec();
            let computed_crc = crc16_ccitt(&body);
            if computed_crc != expected_crc {
                self.buf.clear();
                return Err(CodecError::CrcMismatch {
                    expected: expected_crc,
                    computed: computed_crc,
                });
            }

            self.buf.advance(total_len);
            frames.push(Frame {
                command,
                sequence,
                body,
            });
        }

        Ok(frames)
    }

    /// Observe a server-push frame's sequence and return a `PacketLoss`
    /// signal if a gap was detected and the debounce window (10s) has
    /// elapsed since the last signal. `now` is injectable for deterministic
    /// tests.
    pub fn observe_push_sequence(&mut self, received: u32, now: Instant) -> Option<PacketLoss> {
        let expected = self.last_seen_push_seq.map(|s| s.wrapping_add(1));
        self.last_seen_push_seq = Some(received);

        let expected = expected?;
        if received == expected {
            return None;
        }

        if let Some(last) = self.last_loss_signal_at {
            if now.duration_since(last) < DEBOUNCE_WINDOW {
                return None;
            }
        }

        self.last_loss_signal_at = Some(now);
        Some(PacketLoss {
            expected,
            received,
            gap: received.wrapping_sub(expected),
        })
    }
}

/// CRC-16/CCITT (poly 0x1021, init 0xFFFF), the variant required by §4.1.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_frame() {
        let body = b"hello world".to_vec();
        let bytes = encode(7, 42, &body).unwrap();
        let mut codec = PacketCodec::new();
        let frames = codec.feed(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, 7);
        assert_eq!(frames[0].sequence, 42);
        assert_eq!(frames[0].body, body);
    }

    #[test]
    fn partial_frame_buffers_across_calls() {
        let body = b"split across two reads".to_vec();
        let bytes = encode(1, 1, &body).unwrap();
        let mut codec = PacketCodec::new();
        let (first, second) = bytes.split_at(10);
        assert!(codec.feed(first).unwrap().is_empty());
        let frames = codec.feed(second).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, body);
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut bytes = encode(1, 1, b"a").unwrap();
        bytes.extend(encode(2, 2, b"bb").unwrap());
        let mut codec = PacketCodec::new();
        let frames = codec.feed(&bytes).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, 1);
        assert_eq!(frames[1].command, 2);
    }

    #[test]
    fn invalid_magic_clears_buffer_and_errors() {
        let mut bytes = encode(1, 1, b"x").unwrap();
        bytes[0] = 0x00;
        let mut codec = PacketCodec::new();
        let err = codec.feed(&bytes).unwrap_err();
        assert_eq!(err, CodecError::InvalidMagic);
        assert!(err.is_fatal_stream_error());
        assert!(codec.buf.is_empty());
    }

    #[test]
    fn crc_mismatch_detected() {
        let mut bytes = encode(1, 1, b"payload").unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut codec = PacketCodec::new();
        let err = codec.feed(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::CrcMismatch { .. }));
        assert!(err.is_fatal_stream_error());
    }

    #[test]
    fn body_too_long_rejected_at_encode() {
        let huge = vec![0u8; MAX_BODY_LEN as usize + 1];
        assert_eq!(encode(1, 1, &huge), Err(CodecError::BodyTooLong(huge.len() as u32)));
    }

    #[test]
    fn gap_detection_single_signal_within_debounce() {
        let mut codec = PacketCodec::new();
        let t0 = Instant::now();
        assert!(codec.observe_push_sequence(100, t0).is_none());
        assert!(codec.observe_push_sequence(101, t0).is_none());
        assert!(codec.observe_push_sequence(102, t0).is_none());
        // sequence 103,104,105 omitted -> gap of 3
        let loss = codec.observe_push_sequence(106, t0).unwrap();
        assert_eq!(loss, PacketLoss { expected: 103, received: 106, gap: 3 });
        assert_eq!(loss.severity(), PacketLossSeverity::RequestSync);

        // A further gap within the debounce window is suppressed.
        let t1 = t0 + Duration::from_secs(2);
        assert!(codec.observe_push_sequence(110, t1).is_none());

        // After the debounce window elapses, a new gap signals again.
        let t2 = t0 + Duration::from_secs(11);
        let loss2 = codec.observe_push_sequence(120, t2);
        assert!(loss2.is_some());
    }

    #[test]
    fn gap_detection_severity_tiers() {
        let small = PacketLoss { expected: 1, received: 2, gap: 1 };
        assert_eq!(small.severity(), PacketLossSeverity::LogOnly);
        let medium = PacketLoss { expected: 1, received: 6, gap: 5 };
        assert_eq!(medium.severity(), PacketLossSeverity::RequestSync);
        let large = PacketLoss { expected: 1, received: 20, gap: 19 };
        assert_eq!(large.severity(), PacketLossSeverity::ForceReconnect);
    }
}
