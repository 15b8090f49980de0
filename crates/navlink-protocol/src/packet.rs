//! Packets, commands, and response matching.

use std::fmt;

use crate::constants::*;
use crate::error::ProtocolError;

/// A two-byte packet type code (`b"pG"`, `[0x01, 0xCC]`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketType(pub [u8; 2]);

impl PacketType {
    /// Create a packet type from its two bytes.
    pub const fn new(bytes: [u8; 2]) -> Self {
        PacketType(bytes)
    }

    /// Create from a slice. Returns None if the slice is not two bytes.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        match slice {
            [a, b] => Some(PacketType([*a, *b])),
            _ => None,
        }
    }

    /// Parse a schema spelling: two ASCII characters (`"pG"`) or a hex code (`"0x01cc"`).
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            let code = u16::from_str_radix(hex, 16)
                .map_err(|_| ProtocolError::InvalidData(format!("bad packet type '{text}'")))?;
            return Ok(PacketType(code.to_be_bytes()));
        }
        match text.as_bytes() {
            [a, b] => Ok(PacketType([*a, *b])),
            _ => Err(ProtocolError::InvalidData(format!("bad packet type '{text}'"))),
        }
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }

    /// Whether the code is a printable mnemonic (`pG`, `z1`, `S1`).
    pub fn is_ascii(&self) -> bool {
        self.0[0].is_ascii_alphabetic() && self.0[1].is_ascii_alphanumeric()
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ascii() {
            write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
        } else {
            write!(f, "0x{:02x}{:02x}", self.0[0], self.0[1])
        }
    }
}

/// A decoded protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet type code.
    pub packet_type: PacketType,
    /// Payload bytes (without framing).
    pub payload: Vec<u8>,
    /// The bytes as they appeared on the wire.
    pub raw: Vec<u8>,
}

impl Packet {
    /// Create a packet without wire bytes (used by tests and encoders).
    pub fn new(packet_type: PacketType, payload: impl Into<Vec<u8>>) -> Self {
        Packet {
            packet_type,
            payload: payload.into(),
            raw: Vec::new(),
        }
    }

    /// Payload rendered as text, cut at the first NUL.
    pub fn payload_text(&self) -> String {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        String::from_utf8_lossy(&self.payload[..end]).trim().to_string()
    }

    /// Whether this is a NAK rejecting the given command type.
    pub fn is_nak_for(&self, command: PacketType) -> bool {
        self.packet_type == NAK && self.payload.get(..2) == Some(&command.0[..])
    }
}

/// A complete unit produced by one of the stream decoders.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A CRC-validated binary packet.
    Packet(Packet),
    /// A checksum-validated NMEA sentence.
    Nmea(crate::nmea::NmeaSentence),
    /// A line of ASCII text.
    Text(String),
}

impl Frame {
    /// The packet type, for binary frames.
    pub fn packet_type(&self) -> Option<PacketType> {
        match self {
            Frame::Packet(p) => Some(p.packet_type),
            _ => None,
        }
    }

    /// Text content for matching identity replies.
    pub fn text(&self) -> String {
        match self {
            Frame::Packet(p) => p.payload_text(),
            Frame::Nmea(s) => s.encode(),
            Frame::Text(t) => t.clone(),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// What a command carries on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandBody {
    /// A binary packet.
    Packet {
        /// Packet type code.
        packet_type: PacketType,
        /// Payload bytes.
        payload: Vec<u8>,
    },
    /// An ASCII command line (terminator added by the encoder).
    Text(String),
}

/// Which incoming frame answers a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMatcher {
    /// A binary packet of the given type.
    Type(PacketType),
    /// A text line (or packet text) containing the substring.
    TextContains(String),
    /// Any text line.
    AnyText,
    /// Fire-and-forget; the transaction completes once written.
    NoResponse,
}

impl ResponseMatcher {
    /// Whether a frame satisfies this matcher.
    pub fn matches(&self, frame: &Frame) -> bool {
        match (self, frame) {
            (ResponseMatcher::Type(t), Frame::Packet(p)) => p.packet_type == *t,
            (ResponseMatcher::TextContains(needle), Frame::Text(text)) => text.contains(needle),
            (ResponseMatcher::TextContains(needle), Frame::Packet(p)) => {
                p.payload_text().contains(needle)
            }
            (ResponseMatcher::AnyText, Frame::Text(_)) => true,
            _ => false,
        }
    }
}

/// A request to the device together with how its reply is recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Wire content.
    pub body: CommandBody,
    /// Reply matcher.
    pub expect: ResponseMatcher,
}

impl Command {
    /// A binary command answered by a packet of the same type.
    pub fn packet(packet_type: PacketType, payload: impl Into<Vec<u8>>) -> Self {
        Command {
            body: CommandBody::Packet {
                packet_type,
                payload: payload.into(),
            },
            expect: ResponseMatcher::Type(packet_type),
        }
    }

    /// An ASCII command answered by any text line.
    pub fn text(line: impl Into<String>) -> Self {
        Command {
            body: CommandBody::Text(line.into()),
            expect: ResponseMatcher::AnyText,
        }
    }

    /// Replace the reply matcher.
    #[must_use]
    pub fn expecting(mut self, expect: ResponseMatcher) -> Self {
        self.expect = expect;
        self
    }

    /// The command's packet type, for binary commands.
    pub fn packet_type(&self) -> Option<PacketType> {
        match &self.body {
            CommandBody::Packet { packet_type, .. } => Some(*packet_type),
            CommandBody::Text(_) => None,
        }
    }

    /// Whether a frame rejects this command with a NAK.
    pub fn is_rejected_by(&self, frame: &Frame) -> bool {
        match (self.packet_type(), frame) {
            (Some(t), Frame::Packet(p)) => p.is_nak_for(t),
            _ => false,
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match &self.body {
            CommandBody::Packet {
                packet_type,
                payload,
            } => format!("{} ({} bytes)", packet_type, payload.len()),
            CommandBody::Text(line) => format!("'{line}'"),
        }
    }
}

// ============================================================================
// Bootloader commands
// ============================================================================

/// The packet types a dialect uses for the bootloader sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderCommandSet {
    /// Enter bootloader mode.
    pub jump_bootloader: PacketType,
    /// Return to the application.
    pub jump_application: PacketType,
    /// Write one addressed block.
    pub write: PacketType,
    /// Largest payload the framing allows for a single write command.
    pub max_payload: usize,
}

impl BootloaderCommandSet {
    /// `JI` / `JA` / `WA` over the UART framing.
    pub const UART: BootloaderCommandSet = BootloaderCommandSet {
        jump_bootloader: JUMP_BOOTLOADER,
        jump_application: JUMP_APPLICATION,
        write: WRITE_APP,
        max_payload: MAX_UART_PAYLOAD,
    };

    /// The INS401 equivalents over the Ethernet framing.
    pub const ETHERNET: BootloaderCommandSet = BootloaderCommandSet {
        jump_bootloader: ETH_JUMP_BOOTLOADER,
        jump_application: ETH_JUMP_APPLICATION,
        write: ETH_WRITE_APP,
        max_payload: 1024,
    };

    /// Jump-to-bootloader command with an optional core selector payload.
    pub fn jump_bootloader(&self, payload: &[u8]) -> Command {
        Command::packet(self.jump_bootloader, payload)
    }

    /// Jump-to-application command.
    pub fn jump_application(&self, payload: &[u8]) -> Command {
        Command::packet(self.jump_application, payload)
    }

    /// Largest data chunk one write command can carry.
    pub fn max_block_data(&self) -> usize {
        self.max_payload
            .saturating_sub(WRITE_BLOCK_HEADER_SIZE)
            .min(u8::MAX as usize)
    }

    /// Addressed block write: `addr:4B-BE, datalen:1B, data`.
    pub fn write_block(&self, address: u32, data: &[u8]) -> Result<Command, ProtocolError> {
        let max_data = self.max_block_data();
        if data.len() > max_data {
            return Err(ProtocolError::PayloadTooLong {
                max: max_data,
                actual: data.len(),
            });
        }
        let mut payload = Vec::with_capacity(WRITE_BLOCK_HEADER_SIZE + data.len());
        payload.extend_from_slice(&address.to_be_bytes());
        payload.push(data.len() as u8);
        payload.extend_from_slice(data);
        Ok(Command::packet(self.write, payload))
    }
}

/// Split a `WA` payload back into `(address, data)`.
pub fn parse_write_block(payload: &[u8]) -> Result<(u32, &[u8]), ProtocolError> {
    if payload.len() < WRITE_BLOCK_HEADER_SIZE {
        return Err(ProtocolError::FrameTooShort {
            expected: WRITE_BLOCK_HEADER_SIZE,
            actual: payload.len(),
        });
    }
    let address = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let len = payload[4] as usize;
    let data = payload
        .get(WRITE_BLOCK_HEADER_SIZE..WRITE_BLOCK_HEADER_SIZE + len)
        .ok_or(ProtocolError::FrameTooShort {
            expected: WRITE_BLOCK_HEADER_SIZE + len,
            actual: payload.len(),
        })?;
    Ok((address, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_parse_and_display() {
        assert_eq!(PacketType::parse("pG").unwrap(), PING);
        assert_eq!(PacketType::parse("0x01cc").unwrap(), ETH_PING);
        assert_eq!(PING.to_string(), "pG");
        assert_eq!(ETH_PING.to_string(), "0x01cc");
        assert!(PacketType::parse("abc").is_err());
    }

    #[test]
    fn test_payload_text_stops_at_nul() {
        let packet = Packet::new(PING, b"OpenIMU300ZI SN:1\0\0\0".to_vec());
        assert_eq!(packet.payload_text(), "OpenIMU300ZI SN:1");
    }

    #[test]
    fn test_nak_matches_command_type() {
        let nak = Frame::Packet(Packet::new(NAK, b"gP".to_vec()));
        assert!(Command::packet(GET_PARAM, vec![]).is_rejected_by(&nak));
        assert!(!Command::packet(PING, vec![]).is_rejected_by(&nak));
    }

    #[test]
    fn test_write_block_layout() {
        let cmd = BootloaderCommandSet::UART
            .write_block(0x0000_01E0, &[0xAA; 20])
            .unwrap();
        match &cmd.body {
            CommandBody::Packet {
                packet_type,
                payload,
            } => {
                assert_eq!(*packet_type, WRITE_APP);
                assert_eq!(&payload[..5], &[0x00, 0x00, 0x01, 0xE0, 20]);
                let (address, data) = parse_write_block(payload).unwrap();
                assert_eq!(address, 480);
                assert_eq!(data.len(), 20);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_write_block_rejects_oversized_data() {
        let result = BootloaderCommandSet::UART.write_block(0, &[0u8; 251]);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLong { max: 250, .. })));
    }

    #[test]
    fn test_matcher_text_contains() {
        let matcher = ResponseMatcher::TextContains("INS2000".into());
        assert!(matcher.matches(&Frame::Text("#VERSION INS2000 1.2".into())));
        assert!(!matcher.matches(&Frame::Text("other".into())));
    }
}
