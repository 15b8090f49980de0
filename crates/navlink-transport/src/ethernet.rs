//! Raw Ethernet transport.
//!
//! The frame I/O itself sits behind [`FrameLink`] so the transport works with
//! any packet socket implementation. [`ChannelFrameLink`] connects two ends
//! in-process for tests and simulators.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use navlink_protocol::{format_mac, MacAddress};

use crate::error::{Result, TransportError};
use crate::transport::{Transport, TransportInfo, TransportKind};

/// Sends and receives whole Ethernet frames on one interface.
pub trait FrameLink: Send {
    /// Transmit one frame.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for the next frame.
    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Hardware address of the local interface.
    fn mac_address(&self) -> MacAddress;

    /// Interface name.
    fn name(&self) -> String;
}

/// Transport over a [`FrameLink`]. Each read yields one frame.
pub struct EthernetTransport<L: FrameLink> {
    link: L,
    read_timeout: Duration,
}

impl<L: FrameLink> EthernetTransport<L> {
    /// Wrap a link.
    pub fn new(link: L, read_timeout: Duration) -> Self {
        EthernetTransport { link, read_timeout }
    }

    /// Local interface address, used as the host MAC in the framing.
    pub fn host_mac(&self) -> MacAddress {
        self.link.mac_address()
    }
}

impl<L: FrameLink> Transport for EthernetTransport<L> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.link.recv_frame(self.read_timeout)? {
            Some(frame) if frame.len() > buffer.len() => Err(TransportError::FrameTooLarge {
                size: frame.len(),
                capacity: buffer.len(),
            }),
            Some(frame) => {
                buffer[..frame.len()].copy_from_slice(&frame);
                Ok(frame.len())
            }
            None => Ok(0),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.link.send_frame(data)?;
        Ok(data.len())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.read_timeout = timeout;
        Ok(())
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            kind: TransportKind::Ethernet,
            name: format!("{} ({})", self.link.name(), format_mac(&self.link.mac_address())),
            baud: None,
        }
    }
}

/// One end of an in-process frame pipe.
pub struct ChannelFrameLink {
    name: String,
    mac: MacAddress,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl ChannelFrameLink {
    /// Create two connected ends. Frames sent on one arrive at the other.
    pub fn pair(a: (&str, MacAddress), b: (&str, MacAddress)) -> (Self, Self) {
        let (a_tx, b_rx) = crossbeam_channel::unbounded();
        let (b_tx, a_rx) = crossbeam_channel::unbounded();
        (
            ChannelFrameLink {
                name: a.0.to_string(),
                mac: a.1,
                tx: a_tx,
                rx: a_rx,
            },
            ChannelFrameLink {
                name: b.0.to_string(),
                mac: b.1,
                tx: b_tx,
                rx: b_rx,
            },
        )
    }
}

impl FrameLink for ChannelFrameLink {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.tx.send(frame.to_vec()).map_err(|_| TransportError::Closed)
    }

    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn mac_address(&self) -> MacAddress {
        self.mac
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: MacAddress = [0x02, 0, 0, 0, 0, 1];
    const DEVICE: MacAddress = [0x04, 0, 0, 0, 0, 2];

    #[test]
    fn test_one_frame_per_read() {
        let (host, mut device) = ChannelFrameLink::pair(("eth0", HOST), ("dev", DEVICE));
        let mut transport = EthernetTransport::new(host, Duration::from_millis(50));
        device.send_frame(&[1, 2, 3]).unwrap();
        device.send_frame(&[4, 5]).unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(transport.read(&mut buf).unwrap(), 3);
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert_eq!(transport.host_mac(), HOST);
    }

    #[test]
    fn test_oversized_frame_and_hangup() {
        let (host, mut device) = ChannelFrameLink::pair(("eth0", HOST), ("dev", DEVICE));
        let mut transport = EthernetTransport::new(host, Duration::from_millis(50));
        device.send_frame(&[0u8; 32]).unwrap();
        let mut small = [0u8; 8];
        assert!(matches!(
            transport.read(&mut small),
            Err(TransportError::FrameTooLarge { size: 32, capacity: 8 })
        ));
        drop(device);
        assert!(matches!(transport.read(&mut small), Err(TransportError::Closed)));
    }
}
