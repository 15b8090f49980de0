//! TCP transport for serial-over-network bridges.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::transport::{Transport, TransportInfo, TransportKind};

/// A TCP socket carrying the device byte stream.
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Connect to `address` (`host:port`), giving up after `connect_timeout`.
    pub fn connect(address: &str, connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let peer = address
            .to_socket_addrs()
            .map_err(|e| TransportError::open(address, e))?
            .next()
            .ok_or_else(|| {
                TransportError::open(
                    address,
                    std::io::Error::new(ErrorKind::NotFound, "address did not resolve"),
                )
            })?;
        let stream = TcpStream::connect_timeout(&peer, connect_timeout)
            .map_err(|e| TransportError::open(address, e))?;
        Self::from_stream(stream, read_timeout)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream, read_timeout: Duration) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(read_timeout))?;
        let peer = stream.peer_addr()?;
        log::debug!("connected to {}", peer);
        Ok(TcpTransport { stream, peer })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.stream.read(buffer) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.stream.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            kind: TransportKind::Tcp,
            name: self.peer.to_string(),
            baud: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let echo = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).unwrap();
            socket.write_all(&buf[..n]).unwrap();
        });

        let mut transport =
            TcpTransport::connect(&address, Duration::from_secs(1), Duration::from_millis(500)).unwrap();
        transport.write_all(b"pG").unwrap();
        let mut buf = [0u8; 16];
        let mut received = Vec::new();
        while received.len() < 2 {
            let n = transport.read(&mut buf).unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"pG");
        assert_eq!(transport.info().kind, TransportKind::Tcp);
        echo.join().unwrap();
    }

    #[test]
    fn test_peer_close_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let closer = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            drop(socket);
        });
        let mut transport =
            TcpTransport::connect(&address, Duration::from_secs(1), Duration::from_millis(500)).unwrap();
        closer.join().unwrap();
        let mut buf = [0u8; 8];
        let result = loop {
            match transport.read(&mut buf) {
                Ok(0) => continue,
                other => break other,
            }
        };
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
