//! Mock transport for testing.
//!
//! A [`MockTransport`] is a cloneable handle: tests keep one clone to inject
//! bytes and inspect writes while the code under test owns another.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, TransportError};
use crate::ports::{PortInfo, PortKind, PortOpener};
use crate::transport::{Transport, TransportInfo, TransportKind};

/// Scripted device: sees each written buffer and the current baud rate, and
/// may return bytes to be read back.
pub type Responder = Box<dyn FnMut(&[u8], u32) -> Option<Vec<u8>> + Send>;

/// Mock transport for unit and scenario tests.
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<MockInner>,
    readable: Condvar,
}

struct MockInner {
    name: String,
    baud: u32,
    read_timeout: Duration,
    /// Chunks returned by successive reads.
    read_queue: VecDeque<Vec<u8>>,
    /// Every write call, in order.
    writes: Vec<Vec<u8>>,
    responder: Option<Responder>,
    read_failure: Option<String>,
    write_failure: Option<String>,
    resets: usize,
}

impl MockTransport {
    /// Create a mock named `name` at 115200 baud.
    pub fn new(name: &str) -> Self {
        MockTransport {
            shared: Arc::new(Shared {
                inner: Mutex::new(MockInner {
                    name: name.to_string(),
                    baud: 115_200,
                    read_timeout: Duration::from_millis(5),
                    read_queue: VecDeque::new(),
                    writes: Vec::new(),
                    responder: None,
                    read_failure: None,
                    write_failure: None,
                    resets: 0,
                }),
                readable: Condvar::new(),
            }),
        }
    }

    /// Queue one chunk to be returned by a read.
    pub fn inject_read(&self, data: &[u8]) {
        self.shared.inner.lock().read_queue.push_back(data.to_vec());
        self.shared.readable.notify_all();
    }

    /// Install a scripted responder.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8], u32) -> Option<Vec<u8>> + Send + 'static,
    {
        self.shared.inner.lock().responder = Some(Box::new(responder));
    }

    /// Every write call so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.inner.lock().writes.clone()
    }

    /// All written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.shared.inner.lock().writes.concat()
    }

    /// Forget recorded writes.
    pub fn clear_writes(&self) {
        self.shared.inner.lock().writes.clear();
    }

    /// Make every subsequent read fail.
    pub fn fail_reads(&self, message: &str) {
        self.shared.inner.lock().read_failure = Some(message.to_string());
        self.shared.readable.notify_all();
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, message: &str) {
        self.shared.inner.lock().write_failure = Some(message.to_string());
    }

    /// Current baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.shared.inner.lock().baud
    }

    /// Number of `reset_buffer` calls.
    pub fn resets(&self) -> usize {
        self.shared.inner.lock().resets
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.shared.inner.lock();
        if inner.read_queue.is_empty() && inner.read_failure.is_none() {
            let timeout = inner.read_timeout;
            self.shared.readable.wait_for(&mut inner, timeout);
        }
        if let Some(message) = &inner.read_failure {
            return Err(TransportError::Injected(message.clone()));
        }
        let Some(mut chunk) = inner.read_queue.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buffer.len());
        buffer[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            inner.read_queue.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.shared.inner.lock();
        if let Some(message) = &inner.write_failure {
            return Err(TransportError::Injected(message.clone()));
        }
        inner.writes.push(data.to_vec());
        let baud = inner.baud;
        let reply = inner.responder.as_mut().and_then(|respond| respond(data, baud));
        if let Some(reply) = reply {
            inner.read_queue.push_back(reply);
            self.shared.readable.notify_all();
        }
        Ok(data.len())
    }

    fn reset_buffer(&mut self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.read_queue.clear();
        inner.resets += 1;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        self.shared.inner.lock().baud = baud;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.shared.inner.lock().read_timeout = timeout;
        Ok(())
    }

    fn info(&self) -> TransportInfo {
        let inner = self.shared.inner.lock();
        TransportInfo {
            kind: TransportKind::Mock,
            name: inner.name.clone(),
            baud: Some(inner.baud),
        }
    }
}

/// A fixed set of mock ports, opened by name.
#[derive(Clone, Default)]
pub struct MockPorts {
    ports: Arc<Mutex<HashMap<String, (PortKind, MockTransport)>>>,
}

impl MockPorts {
    /// Create an empty port set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a USB port and return its handle.
    pub fn add(&self, name: &str) -> MockTransport {
        self.add_with_kind(name, PortKind::Usb)
    }

    /// Add a port of the given kind and return its handle.
    pub fn add_with_kind(&self, name: &str, kind: PortKind) -> MockTransport {
        let transport = MockTransport::new(name);
        self.ports
            .lock()
            .insert(name.to_string(), (kind, transport.clone()));
        transport
    }
}

impl PortOpener for MockPorts {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let mut ports: Vec<PortInfo> = self
            .ports
            .lock()
            .iter()
            .map(|(name, (kind, _))| PortInfo {
                name: name.clone(),
                kind: *kind,
                description: None,
            })
            .collect();
        ports.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ports)
    }

    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Transport>> {
        let mut transport = self
            .ports
            .lock()
            .get(port)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| {
                TransportError::open(
                    port,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such mock port"),
                )
            })?;
        transport.set_baud_rate(baud)?;
        transport.reset_buffer()?;
        Ok(Box::new(transport))
    }
}
