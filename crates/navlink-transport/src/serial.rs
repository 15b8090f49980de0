//! Serial port transport.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{Result, TransportError};
use crate::transport::{Transport, TransportInfo, TransportKind};

/// Default time a read may block before reporting no data.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// UART link through the OS serial driver (8N1, no flow control).
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    baud: u32,
}

impl SerialTransport {
    /// Open a serial port.
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    /// * `baud_rate` - Line rate (e.g., 115200)
    /// * `read_timeout` - How long a read may block
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| TransportError::open(path, e))?;

        log::debug!("opened serial port {} at {} baud", path, baud_rate);
        Ok(SerialTransport {
            port,
            name: path.to_string(),
            baud: baud_rate,
        })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.port.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }

    fn reset_buffer(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        self.port.set_baud_rate(baud)?;
        log::debug!("{} switched to {} baud", self.name, baud);
        self.baud = baud;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            kind: TransportKind::Serial,
            name: self.name.clone(),
            baud: Some(self.baud),
        }
    }
}
