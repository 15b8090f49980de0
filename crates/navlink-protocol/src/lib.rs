//! Navlink wire protocol
//!
//! Framing, checksums, and field encodings spoken by the supported inertial
//! and GNSS navigation devices. This crate is pure: it owns no threads or
//! I/O and can be driven from any byte source.
//!
//! # Wire dialects
//!
//! - **UART**: `55 55 <type:2> <len:1> <payload> <crc16:2>` (OpenIMU, OpenRTK, DMU)
//! - **Ethernet**: `<dst:6> <src:6> <type:2> <len:4> <payload> <crc16:2>` (INS401)
//! - **NMEA**: `$...*HH\r\n` sentences interleaved with UART packets (OpenRTK)
//! - **ASCII lines**: `\r\n` terminated text (INS2000)
//!
//! RTCM 3 correction framing is provided for the same byte-stream patterns.
//!
//! # Example
//!
//! ```rust,ignore
//! use navlink_protocol::{Command, FrameDecoder, WireFormat, PING};
//!
//! let format = WireFormat::uart();
//! let bytes = format.encode(&Command::packet(PING, vec![]))?;
//!
//! let mut decoder = format.decoder();
//! let mut events = Vec::new();
//! decoder.feed(&received, &mut events);
//! ```

mod constants;
mod crc;
mod error;
mod ethernet;
mod field;
mod frame;
mod line;
mod nmea;
mod packet;
mod rtcm;
mod uart;

pub use constants::*;
pub use crc::*;
pub use error::*;
pub use ethernet::*;
pub use field::*;
pub use frame::*;
pub use line::*;
pub use nmea::*;
pub use packet::*;
pub use rtcm::*;
pub use uart::*;
