//! UART packet framing.
//!
//! ```text
//! +------+------+--------+--------+-----+-------------+--------+--------+
//! | 0x55 | 0x55 | type_0 | type_1 | len | payload[len]| crc_hi | crc_lo |
//! +------+------+--------+--------+-----+-------------+--------+--------+
//! ```
//!
//! The CRC-16 covers `type + len + payload`.

use bytes::BufMut;

use crate::constants::{CRC_SIZE, MAX_UART_PAYLOAD, UART_HEADER, UART_TYPE_LEN_SIZE};
use crate::crc::crc16_ccitt;
use crate::error::ProtocolError;
use crate::frame::{DecodeEvent, DecoderStats, FrameDecoder};
use crate::packet::{Frame, Packet, PacketType};

/// Encode a UART packet.
pub fn encode_uart(packet_type: PacketType, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_UART_PAYLOAD {
        return Err(ProtocolError::PayloadTooLong {
            max: MAX_UART_PAYLOAD,
            actual: payload.len(),
        });
    }
    let mut buf = Vec::with_capacity(UART_HEADER.len() + UART_TYPE_LEN_SIZE + payload.len() + CRC_SIZE);
    buf.put_slice(&UART_HEADER);
    buf.put_slice(packet_type.as_bytes());
    buf.put_u8(payload.len() as u8);
    buf.put_slice(payload);
    let crc = crc16_ccitt(&buf[UART_HEADER.len()..]);
    buf.put_u16(crc);
    Ok(buf)
}

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Sliding a two-byte window over the stream looking for `55 55`.
    SeekingHeader,
    /// Header seen, collecting the type bytes.
    HeaderFound,
    /// Collecting the length byte.
    ReadingLength,
    /// Collecting payload and CRC.
    ReadingPayload,
    /// Checking the CRC of a complete frame.
    Validating,
}

/// What to do with the bytes of a frame that failed its CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResyncPolicy {
    /// Drop the frame and look for a header in the bytes that follow it.
    #[default]
    ResetToHeader,
    /// Rescan the dropped bytes for an embedded header. Recovers a frame that
    /// started inside a corrupted one sooner; opt-in.
    RescanPayload,
}

/// Byte-at-a-time UART frame decoder.
#[derive(Debug)]
pub struct UartDecoder {
    state: DecodeState,
    window: [u8; 2],
    /// `type + len + payload + crc`, without the header.
    frame: Vec<u8>,
    payload_len: usize,
    policy: ResyncPolicy,
    stats: DecoderStats,
}

impl Default for UartDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl UartDecoder {
    /// Create a decoder with the default resync policy.
    pub fn new() -> Self {
        Self::with_policy(ResyncPolicy::default())
    }

    /// Create a decoder with an explicit resync policy.
    pub fn with_policy(policy: ResyncPolicy) -> Self {
        UartDecoder {
            state: DecodeState::SeekingHeader,
            window: [0; 2],
            frame: Vec::with_capacity(UART_TYPE_LEN_SIZE + MAX_UART_PAYLOAD + CRC_SIZE),
            payload_len: 0,
            policy,
            stats: DecoderStats::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Feed one byte.
    pub fn push_byte(&mut self, byte: u8, out: &mut Vec<DecodeEvent>) {
        match self.state {
            DecodeState::SeekingHeader => {
                self.window = [self.window[1], byte];
                if self.window == UART_HEADER {
                    self.window = [0; 2];
                    self.frame.clear();
                    self.state = DecodeState::HeaderFound;
                } else {
                    self.stats.bytes_discarded += 1;
                }
            }
            DecodeState::HeaderFound => {
                self.frame.push(byte);
                if self.frame.len() == 2 {
                    self.state = DecodeState::ReadingLength;
                }
            }
            DecodeState::ReadingLength => {
                self.frame.push(byte);
                self.payload_len = byte as usize;
                self.state = DecodeState::ReadingPayload;
            }
            DecodeState::ReadingPayload => {
                self.frame.push(byte);
                if self.frame.len() == UART_TYPE_LEN_SIZE + self.payload_len + CRC_SIZE {
                    self.state = DecodeState::Validating;
                    self.validate(out);
                }
            }
            DecodeState::Validating => {
                // validate() always leaves this state before returning
                self.reset();
                self.push_byte(byte, out);
            }
        }
    }

    fn validate(&mut self, out: &mut Vec<DecodeEvent>) {
        let body_len = UART_TYPE_LEN_SIZE + self.payload_len;
        let computed = crc16_ccitt(&self.frame[..body_len]);
        let carried = u16::from_be_bytes([self.frame[body_len], self.frame[body_len + 1]]);
        let packet_type = PacketType::new([self.frame[0], self.frame[1]]);

        if computed == carried {
            let mut raw = Vec::with_capacity(UART_HEADER.len() + self.frame.len());
            raw.extend_from_slice(&UART_HEADER);
            raw.extend_from_slice(&self.frame);
            let payload = self.frame[UART_TYPE_LEN_SIZE..body_len].to_vec();
            log::trace!("uart frame {} ({} bytes)", packet_type, payload.len());
            self.stats.frames += 1;
            out.push(DecodeEvent::Frame(Frame::Packet(Packet {
                packet_type,
                payload,
                raw,
            })));
            self.reset();
            return;
        }

        log::debug!(
            "uart CRC mismatch for {}: carried 0x{:04X}, computed 0x{:04X}",
            packet_type,
            carried,
            computed
        );
        self.stats.crc_errors += 1;
        out.push(DecodeEvent::CrcMismatch {
            packet_type: Some(packet_type),
            expected: carried as u32,
            actual: computed as u32,
        });

        match self.policy {
            ResyncPolicy::ResetToHeader => self.reset(),
            ResyncPolicy::RescanPayload => {
                let dropped = std::mem::take(&mut self.frame);
                self.reset();
                for byte in dropped {
                    self.push_byte(byte, out);
                }
            }
        }
    }

    fn reset(&mut self) {
        self.state = DecodeState::SeekingHeader;
        self.window = [0; 2];
        self.frame.clear();
        self.payload_len = 0;
    }
}

impl FrameDecoder for UartDecoder {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<DecodeEvent>) {
        for &byte in chunk {
            self.push_byte(byte, out);
        }
    }

    fn clear(&mut self) {
        self.reset();
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}
