//! Ethernet (100BASE-T1) packet encapsulation.
//!
//! ```text
//! +-----------+-----------+---------+-------------+---------------+--------+
//! | dst_mac 6 | src_mac 6 | type 2  | len 4 (BE)  | payload[len]  | crc 2  |
//! +-----------+-----------+---------+-------------+---------------+--------+
//! ```
//!
//! The CRC-16 covers `type + len + payload`. Depending on the handshake, the
//! length field is either authoritative (`use_length_as_protocol`) or the
//! payload length is inferred from the raw frame size.

use bytes::BufMut;

use crate::constants::*;
use crate::crc::crc16_ccitt;
use crate::error::ProtocolError;
use crate::frame::{DecodeEvent, DecoderStats, FrameDecoder};
use crate::packet::{Frame, Packet, PacketType};

/// A six-byte hardware address.
pub type MacAddress = [u8; MAC_SIZE];

/// Format a MAC address as `aa:bb:cc:dd:ee:ff`.
pub fn format_mac(mac: &MacAddress) -> String {
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated) into a MAC address.
pub fn parse_mac(text: &str) -> Result<MacAddress, ProtocolError> {
    let parts: Vec<&str> = text.split([':', '-']).collect();
    if parts.len() != MAC_SIZE {
        return Err(ProtocolError::InvalidData(format!("bad MAC address '{text}'")));
    }
    let mut mac = [0u8; MAC_SIZE];
    for (slot, part) in mac.iter_mut().zip(parts) {
        *slot = u8::from_str_radix(part, 16)
            .map_err(|_| ProtocolError::InvalidData(format!("bad MAC address '{text}'")))?;
    }
    Ok(mac)
}

/// Addressing and length handling negotiated for one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetConfig {
    /// Our interface address; frames to other addresses are ignored.
    pub host_mac: MacAddress,
    /// The device address once known. Outgoing frames are broadcast until set.
    pub device_mac: Option<MacAddress>,
    /// Whether the length field is authoritative.
    pub use_length_as_protocol: bool,
}

impl EthernetConfig {
    /// Config for a host interface with no known device yet.
    pub fn new(host_mac: MacAddress) -> Self {
        EthernetConfig {
            host_mac,
            device_mac: None,
            use_length_as_protocol: true,
        }
    }
}

/// Encoder/decoder for Ethernet dialect frames.
#[derive(Debug)]
pub struct EthernetCodec {
    config: EthernetConfig,
    stats: DecoderStats,
}

impl EthernetCodec {
    /// Create a codec.
    pub fn new(config: EthernetConfig) -> Self {
        EthernetCodec {
            config,
            stats: DecoderStats::default(),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &EthernetConfig {
        &self.config
    }

    /// Lock the codec onto a device address.
    pub fn set_device_mac(&mut self, mac: MacAddress) {
        self.config.device_mac = Some(mac);
    }

    /// Switch between trusting the length field and inferring from frame size.
    pub fn set_use_length_as_protocol(&mut self, enabled: bool) {
        self.config.use_length_as_protocol = enabled;
    }

    /// Encode one frame addressed to the device (or broadcast).
    pub fn encode(&self, packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
        let dst = self.config.device_mac.unwrap_or(BROADCAST_MAC);
        let mut buf = Vec::with_capacity(ETHERNET_MIN_FRAME + payload.len());
        buf.put_slice(&dst);
        buf.put_slice(&self.config.host_mac);
        buf.put_slice(packet_type.as_bytes());
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload);
        let crc = crc16_ccitt(&buf[ETHERNET_ADDRESS_SIZE..]);
        buf.put_u16(crc);
        buf
    }

    /// Decode one raw frame.
    ///
    /// Returns `Ok(None)` for frames not meant for this link (wrong
    /// destination or a source other than the locked device).
    pub fn decode_frame(&self, frame: &[u8]) -> Result<Option<Packet>, ProtocolError> {
        if frame.len() < ETHERNET_MIN_FRAME {
            return Err(ProtocolError::FrameTooShort {
                expected: ETHERNET_MIN_FRAME,
                actual: frame.len(),
            });
        }

        let dst: MacAddress = frame[..MAC_SIZE].try_into().unwrap_or_default();
        let src: MacAddress = frame[MAC_SIZE..ETHERNET_ADDRESS_SIZE]
            .try_into()
            .unwrap_or_default();
        if dst != self.config.host_mac && dst != BROADCAST_MAC {
            return Ok(None);
        }
        if let Some(device) = self.config.device_mac {
            if src != device {
                return Ok(None);
            }
        }

        let type_start = ETHERNET_ADDRESS_SIZE;
        let len_start = type_start + 2;
        let payload_start = len_start + ETHERNET_LENGTH_SIZE;
        let packet_type = PacketType::new([frame[type_start], frame[type_start + 1]]);

        let payload_len = if self.config.use_length_as_protocol {
            let declared = u32::from_be_bytes([
                frame[len_start],
                frame[len_start + 1],
                frame[len_start + 2],
                frame[len_start + 3],
            ]);
            let needed = usize::try_from(declared)
                .ok()
                .and_then(|len| len.checked_add(payload_start + CRC_SIZE))
                .ok_or_else(|| ProtocolError::InvalidData(format!("declared length {declared} overflows")))?;
            if frame.len() < needed {
                return Err(ProtocolError::FrameTooShort {
                    expected: needed,
                    actual: frame.len(),
                });
            }
            needed - payload_start - CRC_SIZE
        } else {
            frame.len() - ETHERNET_MIN_FRAME
        };

        let crc_start = payload_start + payload_len;
        let carried = u16::from_be_bytes([frame[crc_start], frame[crc_start + 1]]);
        let computed = crc16_ccitt(&frame[type_start..crc_start]);
        if carried != computed {
            return Err(ProtocolError::CrcMismatch {
                expected: carried as u32,
                actual: computed as u32,
            });
        }

        Ok(Some(Packet {
            packet_type,
            payload: frame[payload_start..crc_start].to_vec(),
            raw: frame[..crc_start + CRC_SIZE].to_vec(),
        }))
    }

    /// Source address of a raw frame.
    pub fn source_of(frame: &[u8]) -> Option<MacAddress> {
        frame.get(MAC_SIZE..ETHERNET_ADDRESS_SIZE)?.try_into().ok()
    }
}

impl FrameDecoder for EthernetCodec {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<DecodeEvent>) {
        match self.decode_frame(chunk) {
            Ok(Some(packet)) => {
                log::trace!("ethernet frame {} ({} bytes)", packet.packet_type, packet.payload.len());
                self.stats.frames += 1;
                out.push(DecodeEvent::Frame(Frame::Packet(packet)));
            }
            Ok(None) => {
                self.stats.bytes_discarded += chunk.len() as u64;
            }
            Err(ProtocolError::CrcMismatch { expected, actual }) => {
                self.stats.crc_errors += 1;
                let packet_type = chunk
                    .get(ETHERNET_ADDRESS_SIZE..ETHERNET_ADDRESS_SIZE + 2)
                    .and_then(PacketType::from_slice);
                out.push(DecodeEvent::CrcMismatch {
                    packet_type,
                    expected,
                    actual,
                });
            }
            Err(e) => {
                log::warn!("dropping ethernet frame: {}", e);
                self.stats.bytes_discarded += chunk.len() as u64;
            }
        }
    }

    fn clear(&mut self) {}

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: MacAddress = [0x02, 0, 0, 0, 0, 0x01];
    const DEVICE: MacAddress = [0x04, 0, 0, 0, 0, 0x02];

    /// Build a frame as the device would send it to the host.
    fn device_frame(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
        let mut config = EthernetConfig::new(DEVICE);
        config.device_mac = Some(HOST);
        EthernetCodec::new(config).encode(packet_type, payload)
    }

    #[test]
    fn test_encode_layout() {
        let codec = EthernetCodec::new(EthernetConfig::new(HOST));
        let frame = codec.encode(ETH_PING, &[1, 2, 3]);
        assert_eq!(&frame[..6], &BROADCAST_MAC);
        assert_eq!(&frame[6..12], &HOST);
        assert_eq!(&frame[12..14], &[0x01, 0xCC]);
        assert_eq!(&frame[14..18], &[0, 0, 0, 3]);
        assert_eq!(frame.len(), ETHERNET_MIN_FRAME + 3);
    }

    #[test]
    fn test_decode_with_length_field_ignores_padding() {
        let codec = EthernetCodec::new(EthernetConfig::new(HOST));
        let mut frame = device_frame(ETH_PING, b"INS401");
        frame.extend_from_slice(&[0u8; 30]);
        let packet = codec.decode_frame(&frame).unwrap().unwrap();
        assert_eq!(packet.packet_type, ETH_PING);
        assert_eq!(packet.payload, b"INS401");
    }

    #[test]
    fn test_decode_inferring_length_from_frame_size() {
        let mut config = EthernetConfig::new(HOST);
        config.use_length_as_protocol = false;
        let codec = EthernetCodec::new(config);
        let frame = device_frame(ETH_GET_PARAM, &[9; 40]);
        let packet = codec.decode_frame(&frame).unwrap().unwrap();
        assert_eq!(packet.payload.len(), 40);
    }

    #[test]
    fn test_frames_for_other_hosts_are_ignored() {
        let codec = EthernetCodec::new(EthernetConfig::new([0x0A; 6]));
        let frame = device_frame(ETH_PING, b"x");
        assert_eq!(codec.decode_frame(&frame).unwrap(), None);
    }

    #[test]
    fn test_locked_device_filters_sources() {
        let mut codec = EthernetCodec::new(EthernetConfig::new(HOST));
        codec.set_device_mac([0x0B; 6]);
        let frame = device_frame(ETH_PING, b"x");
        assert_eq!(codec.decode_frame(&frame).unwrap(), None);
    }

    #[test]
    fn test_crc_mismatch_is_reported() {
        let mut codec = EthernetCodec::new(EthernetConfig::new(HOST));
        let mut frame = device_frame(ETH_PING, b"abc");
        frame[19] ^= 0x40;
        let mut out = Vec::new();
        codec.feed(&frame, &mut out);
        assert!(matches!(
            out.as_slice(),
            [DecodeEvent::CrcMismatch { packet_type: Some(t), .. }] if *t == ETH_PING
        ));
    }

    #[test]
    fn test_oversized_length_field_is_rejected() {
        let codec = EthernetCodec::new(EthernetConfig::new(HOST));
        let mut frame = device_frame(ETH_PING, b"abc");
        frame[14..18].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            codec.decode_frame(&frame),
            Err(ProtocolError::FrameTooShort { .. } | ProtocolError::InvalidData(_))
        ));
    }

    #[test]
    fn test_mac_parse_and_format() {
        let mac = parse_mac("02:00:00:00:00:01").unwrap();
        assert_eq!(mac, HOST);
        assert_eq!(format_mac(&mac), "02:00:00:00:00:01");
        assert!(parse_mac("02:00").is_err());
    }
}
