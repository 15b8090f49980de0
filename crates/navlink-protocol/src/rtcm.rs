//! RTCM 3 framing.
//!
//! ```text
//! +------+----------------------+---------------+-----------+
//! | 0xD3 | 6 reserved + 10 len  | payload[len]  | CRC-24Q 3 |
//! +------+----------------------+---------------+-----------+
//! ```
//!
//! Correction streams carry no other framing, so after a CRC failure the
//! decoder resumes the search one byte past the bad preamble.

use crate::constants::{MAX_RTCM3_PAYLOAD, RTCM3_PREAMBLE};
use crate::crc::crc24q;
use crate::error::ProtocolError;

const HEADER_SIZE: usize = 3;
const CRC24_SIZE: usize = 3;

/// One validated RTCM 3 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcmFrame {
    /// 12-bit message number (1005, 1077, ...). Zero for empty payloads.
    pub message_type: u16,
    /// Message body.
    pub payload: Vec<u8>,
    /// Complete frame including preamble and CRC.
    pub raw: Vec<u8>,
}

/// Wrap a message body in an RTCM 3 frame.
pub fn encode_rtcm(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_RTCM3_PAYLOAD {
        return Err(ProtocolError::PayloadTooLong {
            max: MAX_RTCM3_PAYLOAD,
            actual: payload.len(),
        });
    }
    let len = payload.len() as u16;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC24_SIZE);
    frame.push(RTCM3_PREAMBLE);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    let crc = crc24q(&frame);
    frame.extend_from_slice(&crc.to_be_bytes()[1..]);
    Ok(frame)
}

/// Incremental RTCM 3 decoder.
#[derive(Debug, Default)]
pub struct Rtcm3Decoder {
    buffer: Vec<u8>,
}

impl Rtcm3Decoder {
    /// Create a decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Consume a chunk, appending decoded frames or CRC errors to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<Result<RtcmFrame, ProtocolError>>) {
        self.buffer.extend_from_slice(chunk);
        loop {
            match self.buffer.iter().position(|&b| b == RTCM3_PREAMBLE) {
                Some(start) => {
                    self.buffer.drain(..start);
                }
                None => {
                    self.buffer.clear();
                    return;
                }
            }
            if self.buffer.len() < HEADER_SIZE {
                return;
            }
            if self.buffer[1] & 0xFC != 0 {
                // Reserved bits set: not a real preamble.
                self.buffer.drain(..1);
                continue;
            }
            let len = (((self.buffer[1] & 0x03) as usize) << 8) | self.buffer[2] as usize;
            let total = HEADER_SIZE + len + CRC24_SIZE;
            if self.buffer.len() < total {
                return;
            }

            let body_end = HEADER_SIZE + len;
            let carried = u32::from_be_bytes([
                0,
                self.buffer[body_end],
                self.buffer[body_end + 1],
                self.buffer[body_end + 2],
            ]);
            let computed = crc24q(&self.buffer[..body_end]);
            if carried != computed {
                log::debug!("rtcm crc mismatch: carried {:06X}, computed {:06X}", carried, computed);
                out.push(Err(ProtocolError::CrcMismatch {
                    expected: carried,
                    actual: computed,
                }));
                self.buffer.drain(..1);
                continue;
            }

            let raw: Vec<u8> = self.buffer.drain(..total).collect();
            let payload = raw[HEADER_SIZE..body_end].to_vec();
            let message_type = match payload.as_slice() {
                [a, b, ..] => ((*a as u16) << 4) | ((*b as u16) >> 4),
                _ => 0,
            };
            out.push(Ok(RtcmFrame {
                message_type,
                payload,
                raw,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Message 1005 header bits followed by filler.
    fn msg_1005() -> Vec<u8> {
        let mut body = vec![0x3E, 0xD0];
        body.extend_from_slice(&[0x11; 17]);
        body
    }

    #[test]
    fn test_encode_decode_with_noise() {
        let frame = encode_rtcm(&msg_1005()).unwrap();
        assert_eq!(frame[0], RTCM3_PREAMBLE);
        assert_eq!(frame.len(), 3 + 19 + 3);

        let mut stream = vec![0x00, 0x42];
        stream.extend_from_slice(&frame);
        let mut decoder = Rtcm3Decoder::new();
        let mut out = Vec::new();
        decoder.feed(&stream[..10], &mut out);
        assert!(out.is_empty());
        decoder.feed(&stream[10..], &mut out);

        assert_eq!(out.len(), 1);
        let decoded = out.remove(0).unwrap();
        assert_eq!(decoded.message_type, 1005);
        assert_eq!(decoded.payload, msg_1005());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_corrupt_frame_is_reported_and_next_frame_recovered() {
        let mut bad = encode_rtcm(&msg_1005()).unwrap();
        bad[8] ^= 0x01;
        let good = encode_rtcm(&[0x43, 0x50, 0x00]).unwrap();

        let mut decoder = Rtcm3Decoder::new();
        let mut out = Vec::new();
        decoder.feed(&[bad, good].concat(), &mut out);

        assert!(matches!(out.first(), Some(Err(ProtocolError::CrcMismatch { .. }))));
        let frames: Vec<_> = out.into_iter().filter_map(Result::ok).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_type, 1077);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        assert!(encode_rtcm(&[0u8; MAX_RTCM3_PAYLOAD + 1]).is_err());
    }
}
