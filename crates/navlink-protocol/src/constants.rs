//! Protocol constants
//!
//! Header bytes, checksum parameters, and the packet type codes shared by the
//! device dialects. Dialect-specific command sets live in the driver; only
//! codes that several layers need to agree on are kept here.

use crate::packet::PacketType;

// ============================================================================
// Framing
// ============================================================================

/// Two-byte preamble of every UART packet.
pub const UART_HEADER: [u8; 2] = [0x55, 0x55];
/// Largest payload a UART packet can carry (single length byte).
pub const MAX_UART_PAYLOAD: usize = 255;
/// Bytes between the header and the payload (type + length).
pub const UART_TYPE_LEN_SIZE: usize = 3;
/// Trailing checksum size for UART and Ethernet packets.
pub const CRC_SIZE: usize = 2;

/// Seed for the packet CRC-16.
pub const CRC16_SEED: u16 = 0x1D0F;
/// Generator polynomial for the packet CRC-16.
pub const CRC16_POLY: u16 = 0x1021;

/// Size of a MAC address.
pub const MAC_SIZE: usize = 6;
/// Destination + source MAC.
pub const ETHERNET_ADDRESS_SIZE: usize = 2 * MAC_SIZE;
/// Size of the Ethernet dialect length field.
pub const ETHERNET_LENGTH_SIZE: usize = 4;
/// Smallest Ethernet dialect frame (addresses + type + length + CRC).
pub const ETHERNET_MIN_FRAME: usize = ETHERNET_ADDRESS_SIZE + 2 + ETHERNET_LENGTH_SIZE + CRC_SIZE;
/// Broadcast MAC address.
pub const BROADCAST_MAC: [u8; MAC_SIZE] = [0xFF; MAC_SIZE];

/// Longest NMEA sentence accepted (the standard says 82; receivers exceed it).
pub const MAX_NMEA_LENGTH: usize = 256;
/// Longest ASCII response line accepted.
pub const MAX_LINE_LENGTH: usize = 1024;

/// RTCM3 frame preamble.
pub const RTCM3_PREAMBLE: u8 = 0xD3;
/// Largest RTCM3 payload (10-bit length).
pub const MAX_RTCM3_PAYLOAD: usize = 1023;

// ============================================================================
// UART packet types (OpenIMU / OpenRTK application mode)
// ============================================================================

/// Identity request; reply payload carries the product string.
pub const PING: PacketType = PacketType::new(*b"pG");
/// Application version request.
pub const GET_VERSION: PacketType = PacketType::new(*b"gV");
/// Read a single parameter by id.
pub const GET_PARAM: PacketType = PacketType::new(*b"gP");
/// Read a window of parameters by index.
pub const GET_PARAM_BLOCK: PacketType = PacketType::new(*b"gB");
/// Write a single parameter.
pub const UPDATE_PARAM: PacketType = PacketType::new(*b"uP");
/// Write several parameters at once.
pub const UPDATE_PARAM_BLOCK: PacketType = PacketType::new(*b"uB");
/// Persist the current configuration.
pub const SAVE_CONFIG: PacketType = PacketType::new(*b"sC");
/// Restore factory defaults.
pub const RESTORE_DEFAULTS: PacketType = PacketType::new(*b"rD");
/// Negative acknowledgement. Payload starts with the rejected type.
pub const NAK: PacketType = PacketType::new([0x15, 0x15]);

// ============================================================================
// UART packet types (DMU)
// ============================================================================

/// DMU "get packet" request; payload names the wanted packet.
pub const DMU_GET_PACKET: PacketType = PacketType::new(*b"GP");
/// DMU identification packet.
pub const DMU_ID: PacketType = PacketType::new(*b"ID");
/// DMU version packet.
pub const DMU_VERSION: PacketType = PacketType::new(*b"VR");
/// DMU set fields (RAM).
pub const DMU_SET_FIELDS: PacketType = PacketType::new(*b"SF");
/// DMU get fields (RAM).
pub const DMU_GET_FIELDS: PacketType = PacketType::new(*b"GF");
/// DMU write fields (EEPROM).
pub const DMU_WRITE_FIELDS: PacketType = PacketType::new(*b"WF");

// ============================================================================
// Bootloader sub-protocol
// ============================================================================

/// Jump to bootloader.
pub const JUMP_BOOTLOADER: PacketType = PacketType::new(*b"JI");
/// Jump to application.
pub const JUMP_APPLICATION: PacketType = PacketType::new(*b"JA");
/// Write one addressed firmware block.
pub const WRITE_APP: PacketType = PacketType::new(*b"WA");
/// Address (4) + data length (1) prefix of a `WA` payload.
pub const WRITE_BLOCK_HEADER_SIZE: usize = 5;

// ============================================================================
// Ethernet packet types (INS401)
// ============================================================================

/// Ethernet identity request.
pub const ETH_PING: PacketType = PacketType::new([0x01, 0xCC]);
/// Ethernet parameter read.
pub const ETH_GET_PARAM: PacketType = PacketType::new([0x02, 0xCC]);
/// Ethernet parameter write.
pub const ETH_SET_PARAM: PacketType = PacketType::new([0x03, 0xCC]);
/// Ethernet configuration save.
pub const ETH_SAVE_CONFIG: PacketType = PacketType::new([0x04, 0xCC]);
/// Ethernet factory defaults.
pub const ETH_RESTORE_DEFAULTS: PacketType = PacketType::new([0x05, 0xCC]);
/// Ethernet jump to bootloader.
pub const ETH_JUMP_BOOTLOADER: PacketType = PacketType::new([0x01, 0xAA]);
/// Ethernet jump to application.
pub const ETH_JUMP_APPLICATION: PacketType = PacketType::new([0x02, 0xAA]);
/// Ethernet firmware block write.
pub const ETH_WRITE_APP: PacketType = PacketType::new([0x03, 0xAA]);

// ============================================================================
// Identification markers
// ============================================================================

/// Substring of an OpenIMU ping reply.
pub const OPENIMU_MARKER: &str = "OpenIMU";
/// Substring of an OpenRTK ping reply.
pub const OPENRTK_MARKER: &str = "RTK";
/// Substring of a DMU identification reply.
pub const DMU_MARKER: &str = "DMU";
/// Substring of an INS2000 `version` reply.
pub const INS2000_MARKER: &str = "INS2000";
/// Substring of an INS401 Ethernet ping reply.
pub const INS401_MARKER: &str = "INS401";
/// ASCII identity request understood by INS2000 receivers.
pub const INS2000_VERSION_COMMAND: &str = "version";
