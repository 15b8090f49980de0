//! Serial port enumeration and opening.

use std::time::Duration;

use serialport::SerialPortType;

use crate::error::Result;
use crate::serial::SerialTransport;
use crate::transport::Transport;

/// Bus a serial port is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}

/// An enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS port name.
    pub name: String,
    /// Attachment.
    pub kind: PortKind,
    /// Product string for USB ports.
    pub description: Option<String>,
}

impl PortInfo {
    /// Bluetooth virtual ports never carry a device and block on open.
    pub fn is_bluetooth(&self) -> bool {
        self.kind == PortKind::Bluetooth || self.name.to_ascii_lowercase().contains("bluetooth")
    }
}

/// Lists and opens serial-like ports. Lets discovery run against mocks.
pub trait PortOpener: Send + Sync {
    /// Every port currently present.
    fn list_ports(&self) -> Result<Vec<PortInfo>>;

    /// Open `port` at `baud`.
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Transport>>;

    /// Ports worth probing: everything except Bluetooth virtual ports.
    fn candidate_ports(&self) -> Result<Vec<PortInfo>> {
        Ok(self
            .list_ports()?
            .into_iter()
            .filter(|p| !p.is_bluetooth())
            .collect())
    }
}

/// The host's real serial ports.
#[derive(Debug, Clone)]
pub struct SystemPorts {
    read_timeout: Duration,
}

impl SystemPorts {
    /// Ports opened with the given read poll interval.
    pub fn new(read_timeout: Duration) -> Self {
        SystemPorts { read_timeout }
    }
}

impl PortOpener for SystemPorts {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|p| {
                let (kind, description) = match p.port_type {
                    SerialPortType::UsbPort(usb) => (PortKind::Usb, usb.product),
                    SerialPortType::PciPort => (PortKind::Pci, None),
                    SerialPortType::BluetoothPort => (PortKind::Bluetooth, None),
                    SerialPortType::Unknown => (PortKind::Unknown, None),
                };
                PortInfo {
                    name: p.port_name,
                    kind,
                    description,
                }
            })
            .collect())
    }

    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SerialTransport::open(port, baud, self.read_timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPorts;

    #[test]
    fn test_bluetooth_ports_are_not_candidates() {
        let ports = MockPorts::new();
        ports.add("/dev/ttyUSB0");
        ports.add("/dev/cu.Bluetooth-Incoming-Port");
        ports.add_with_kind("/dev/rfcomm0", PortKind::Bluetooth);

        let candidates = ports.candidate_ports().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "/dev/ttyUSB0");
    }
}
