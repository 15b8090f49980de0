//! Frame decoding interface shared by every wire dialect.
//!
//! A dialect is described by a [`WireFormat`]: it encodes [`Command`]s into
//! wire bytes and hands out a [`StreamDecoder`] that turns received chunks
//! back into [`DecodeEvent`]s. Chunks are whatever one transport read
//! returned; streaming dialects ignore chunk boundaries, the Ethernet dialect
//! treats each chunk as one raw frame.

use crate::error::ProtocolError;
use crate::ethernet::{EthernetCodec, EthernetConfig};
use crate::line::{encode_line, LineDecoder};
use crate::nmea::NmeaDecoder;
use crate::packet::{Command, CommandBody, Frame, PacketType};
use crate::uart::{encode_uart, ResyncPolicy, UartDecoder};

/// Output of a decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// A validated frame.
    Frame(Frame),
    /// A frame was discarded because its checksum did not match. Not fatal.
    CrcMismatch {
        /// Type code of the discarded frame, when the framing carries one.
        packet_type: Option<PacketType>,
        /// Checksum carried by the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },
}

/// Running counters kept by a decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames emitted.
    pub frames: u64,
    /// Frames dropped on checksum mismatch.
    pub crc_errors: u64,
    /// Bytes skipped while hunting for a frame start.
    pub bytes_discarded: u64,
}

impl DecoderStats {
    fn merge(self, other: DecoderStats) -> DecoderStats {
        DecoderStats {
            frames: self.frames + other.frames,
            crc_errors: self.crc_errors + other.crc_errors,
            bytes_discarded: self.bytes_discarded + other.bytes_discarded,
        }
    }
}

/// Incremental decoder fed with received chunks.
pub trait FrameDecoder: Send {
    /// Consume a chunk and append any completed frames to `out`.
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<DecodeEvent>);

    /// Drop any partially accumulated frame.
    fn clear(&mut self);

    /// Counters since creation.
    fn stats(&self) -> DecoderStats;
}

/// Wire dialect selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFormat {
    /// `55 55` framed binary packets.
    Uart {
        /// CRC failure recovery.
        resync: ResyncPolicy,
    },
    /// Binary packets interleaved with NMEA sentences on one port.
    UartWithNmea {
        /// CRC failure recovery for the binary side.
        resync: ResyncPolicy,
    },
    /// Ethernet-encapsulated packets.
    Ethernet(EthernetConfig),
    /// `\r\n` terminated ASCII lines.
    AsciiLine,
}

impl WireFormat {
    /// Plain UART framing with the default resync policy.
    pub fn uart() -> Self {
        WireFormat::Uart {
            resync: ResyncPolicy::default(),
        }
    }

    /// Encode a command into wire bytes.
    pub fn encode(&self, command: &Command) -> Result<Vec<u8>, ProtocolError> {
        match (self, &command.body) {
            (
                WireFormat::Uart { .. } | WireFormat::UartWithNmea { .. },
                CommandBody::Packet {
                    packet_type,
                    payload,
                },
            ) => encode_uart(*packet_type, payload),
            (
                WireFormat::Ethernet(config),
                CommandBody::Packet {
                    packet_type,
                    payload,
                },
            ) => Ok(EthernetCodec::new(config.clone()).encode(*packet_type, payload)),
            (_, CommandBody::Text(line)) => Ok(encode_line(line)),
            (WireFormat::AsciiLine, CommandBody::Packet { packet_type, .. }) => Err(
                ProtocolError::InvalidData(format!("binary command {packet_type} on an ASCII link")),
            ),
        }
    }

    /// Create a fresh decoder for this dialect.
    pub fn decoder(&self) -> StreamDecoder {
        match self {
            WireFormat::Uart { resync } => StreamDecoder::Uart(UartDecoder::with_policy(*resync)),
            WireFormat::UartWithNmea { resync } => StreamDecoder::UartWithNmea {
                uart: UartDecoder::with_policy(*resync),
                nmea: NmeaDecoder::new(),
            },
            WireFormat::Ethernet(config) => {
                StreamDecoder::Ethernet(EthernetCodec::new(config.clone()))
            }
            WireFormat::AsciiLine => StreamDecoder::Line(LineDecoder::new()),
        }
    }

    /// Largest command payload the framing can carry.
    pub fn max_payload(&self) -> usize {
        match self {
            WireFormat::Ethernet(_) => u32::MAX as usize,
            _ => crate::constants::MAX_UART_PAYLOAD,
        }
    }
}

/// Decoder for one [`WireFormat`].
#[derive(Debug)]
pub enum StreamDecoder {
    /// Binary UART.
    Uart(UartDecoder),
    /// Binary UART and NMEA fed from the same bytes.
    UartWithNmea {
        /// Binary side.
        uart: UartDecoder,
        /// NMEA side.
        nmea: NmeaDecoder,
    },
    /// One raw Ethernet frame per chunk.
    Ethernet(EthernetCodec),
    /// ASCII lines.
    Line(LineDecoder),
}

impl StreamDecoder {
    /// The Ethernet codec, when this decoder handles Ethernet frames.
    pub fn ethernet_mut(&mut self) -> Option<&mut EthernetCodec> {
        match self {
            StreamDecoder::Ethernet(codec) => Some(codec),
            _ => None,
        }
    }
}

impl FrameDecoder for StreamDecoder {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<DecodeEvent>) {
        match self {
            StreamDecoder::Uart(uart) => uart.feed(chunk, out),
            StreamDecoder::UartWithNmea { uart, nmea } => {
                uart.feed(chunk, out);
                nmea.feed(chunk, out);
            }
            StreamDecoder::Ethernet(codec) => codec.feed(chunk, out),
            StreamDecoder::Line(line) => line.feed(chunk, out),
        }
    }

    fn clear(&mut self) {
        match self {
            StreamDecoder::Uart(uart) => uart.clear(),
            StreamDecoder::UartWithNmea { uart, nmea } => {
                uart.clear();
                nmea.clear();
            }
            StreamDecoder::Ethernet(codec) => codec.clear(),
            StreamDecoder::Line(line) => line.clear(),
        }
    }

    fn stats(&self) -> DecoderStats {
        match self {
            StreamDecoder::Uart(uart) => uart.stats(),
            StreamDecoder::UartWithNmea { uart, nmea } => uart.stats().merge(nmea.stats()),
            StreamDecoder::Ethernet(codec) => codec.stats(),
            StreamDecoder::Line(line) => line.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PING;
    use crate::packet::Packet;

    #[test]
    fn test_uart_format_round_trip() {
        let format = WireFormat::uart();
        let bytes = format.encode(&Command::packet(PING, b"hi".to_vec())).unwrap();
        let mut decoder = format.decoder();
        let mut out = Vec::new();
        decoder.feed(&bytes, &mut out);
        assert_eq!(out.len(), 1);
        match &out[0] {
            DecodeEvent::Frame(Frame::Packet(Packet { packet_type, payload, .. })) => {
                assert_eq!(*packet_type, PING);
                assert_eq!(payload, b"hi");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_mixed_stream_yields_both_kinds() {
        let format = WireFormat::UartWithNmea {
            resync: ResyncPolicy::default(),
        };
        let mut stream = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n".to_vec();
        stream.extend(format.encode(&Command::packet(PING, vec![])).unwrap());

        let mut decoder = format.decoder();
        let mut out = Vec::new();
        decoder.feed(&stream, &mut out);
        assert!(out.iter().any(|e| matches!(e, DecodeEvent::Frame(Frame::Nmea(_)))));
        assert!(out.iter().any(|e| matches!(e, DecodeEvent::Frame(Frame::Packet(_)))));
        assert_eq!(decoder.stats().frames, 2);
    }

    #[test]
    fn test_ascii_format_rejects_binary_commands() {
        let result = WireFormat::AsciiLine.encode(&Command::packet(PING, vec![]));
        assert!(result.is_err());
        let line = WireFormat::AsciiLine.encode(&Command::text("version")).unwrap();
        assert_eq!(line, b"version\r\n");
    }
}
