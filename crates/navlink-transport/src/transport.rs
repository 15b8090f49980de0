//! The channel abstraction every device link is driven through.

use std::fmt;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Kind of physical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// UART over a serial port.
    Serial,
    /// TCP socket carrying a serial byte stream.
    Tcp,
    /// Raw Ethernet frames.
    Ethernet,
    /// In-memory test double.
    Mock,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Serial => "serial",
            TransportKind::Tcp => "tcp",
            TransportKind::Ethernet => "ethernet",
            TransportKind::Mock => "mock",
        })
    }
}

/// Description of an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportInfo {
    /// Channel kind.
    pub kind: TransportKind,
    /// Port path, socket address, or interface name.
    pub name: String,
    /// Baud rate for serial channels.
    pub baud: Option<u32>,
}

impl fmt::Display for TransportInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.baud {
            Some(baud) => write!(f, "{} {}@{}", self.kind, self.name, baud),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Byte channel to one device.
///
/// `read` blocks for at most a short poll interval and returns `Ok(0)` when
/// nothing arrived, so reader threads stay responsive to stop requests.
/// Frame-oriented channels (Ethernet) return exactly one frame per read.
pub trait Transport: Send {
    /// Read into `buffer`, returning the number of bytes read (0 on poll timeout).
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush pending writes.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drop anything buffered in either direction.
    fn reset_buffer(&mut self) -> Result<()> {
        Ok(())
    }

    /// Change the line rate without closing the channel.
    fn set_baud_rate(&mut self, _baud: u32) -> Result<()> {
        Err(TransportError::Unsupported("changing baud rate"))
    }

    /// Change how long `read` may block.
    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    /// What this channel is connected to.
    fn info(&self) -> TransportInfo;

    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            match self.write(&data[written..])? {
                0 => return Err(TransportError::Closed),
                n => written += n,
            }
        }
        self.flush()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).read(buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn reset_buffer(&mut self) -> Result<()> {
        (**self).reset_buffer()
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        (**self).set_baud_rate(baud)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn info(&self) -> TransportInfo {
        (**self).info()
    }
}
