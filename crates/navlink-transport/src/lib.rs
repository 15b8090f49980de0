//! Navlink transports
//!
//! Physical channels to a device, behind the [`Transport`] trait:
//!
//! - [`SerialTransport`]: UART through the OS serial driver
//! - [`TcpTransport`]: serial byte stream bridged over TCP
//! - [`EthernetTransport`]: raw frames through a [`FrameLink`]
//! - [`MockTransport`]: scripted in-memory device for tests
//!
//! Transports move bytes only; framing lives in `navlink-protocol`.

mod error;
mod ethernet;
mod mock;
mod ports;
mod serial;
mod tcp;
mod transport;

pub use error::*;
pub use ethernet::*;
pub use mock::*;
pub use ports::*;
pub use serial::*;
pub use tcp::*;
pub use transport::*;
