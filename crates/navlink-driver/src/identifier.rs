//! Device discovery.
//!
//! Serial discovery tries the last known good connection first, then probes
//! every candidate port at every configured baud rate. Ports are dealt
//! round-robin to at most `max_threads` probing threads; each thread owns its
//! ports outright, so no port is ever opened twice at once. The first thread
//! to recognise a device claims it with a compare-and-swap and the others
//! stop at their next check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use navlink_metrics::metric_defs;
use navlink_protocol::{
    DecodeEvent, EthernetCodec, Frame, FrameDecoder, MacAddress, WireFormat,
};
use navlink_transport::{PortInfo, PortOpener, Transport};
use parking_lot::Mutex;

use crate::context::AppContext;
use crate::device_info::DeviceInfo;
use crate::dialect::{probe_plan, DeviceDialect, DeviceProtocol, ProbeStep};
use crate::error::{DriverError, Result};
use crate::persist::LastConnection;

const PROBE_BUFFER_SIZE: usize = 1024;

/// A classified device with its open link.
pub struct DiscoveredDevice {
    /// Port name or transport description.
    pub port: String,
    /// Line rate, `None` for links without one.
    pub baud: Option<u32>,
    pub device_info: DeviceInfo,
    /// Framing for the session (may differ from the framing used to probe).
    pub format: WireFormat,
    pub transport: Box<dyn Transport>,
}

impl DiscoveredDevice {
    pub fn dialect(&self) -> DeviceDialect {
        self.device_info.device_type
    }
}

impl std::fmt::Debug for DiscoveredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredDevice")
            .field("port", &self.port)
            .field("baud", &self.baud)
            .field("device_info", &self.device_info)
            .field("format", &self.format)
            .finish()
    }
}

/// Send each probe step once and wait up to `timeout` for a recognised reply.
///
/// Returns the identity and, for Ethernet replies, the device's MAC address.
fn probe(
    transport: &mut dyn Transport,
    plan: &[ProbeStep],
    timeout: Duration,
    stop: &AtomicBool,
) -> Result<Option<(DeviceInfo, Option<MacAddress>)>> {
    let mut buffer = [0u8; PROBE_BUFFER_SIZE];
    let mut events = Vec::new();
    for step in plan {
        if stop.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let wire = step.format.encode(&step.command)?;
        transport.reset_buffer()?;
        transport.write_all(&wire)?;
        let mut decoder = step.format.decoder();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline && !stop.load(Ordering::SeqCst) {
            let n = transport.read(&mut buffer)?;
            if n == 0 {
                continue;
            }
            events.clear();
            decoder.feed(&buffer[..n], &mut events);
            for event in &events {
                let DecodeEvent::Frame(frame) = event else {
                    continue;
                };
                if let Some(info) = step.classify(frame) {
                    let mac = match frame {
                        Frame::Packet(p) if matches!(step.format, WireFormat::Ethernet(_)) => {
                            EthernetCodec::source_of(&p.raw)
                        }
                        _ => None,
                    };
                    return Ok(Some((info, mac)));
                }
                tracing::trace!("ignoring {:?} while probing", frame.packet_type());
            }
        }
    }
    Ok(None)
}

/// Finds and classifies an attached device.
pub struct DeviceIdentifier<'a> {
    ctx: &'a AppContext,
    ports: Arc<dyn PortOpener>,
    dialects: Vec<DeviceDialect>,
    only_ports: Option<Vec<String>>,
}

impl<'a> DeviceIdentifier<'a> {
    pub fn new(ctx: &'a AppContext, ports: Arc<dyn PortOpener>) -> Self {
        DeviceIdentifier {
            ctx,
            ports,
            dialects: DeviceDialect::SERIAL.to_vec(),
            only_ports: None,
        }
    }

    /// Restrict probing to these families, in this order.
    #[must_use]
    pub fn with_dialects(mut self, dialects: &[DeviceDialect]) -> Self {
        self.dialects = dialects.to_vec();
        self
    }

    /// Restrict probing to these port names.
    #[must_use]
    pub fn with_ports(mut self, ports: &[String]) -> Self {
        self.only_ports = Some(ports.to_vec());
        self
    }

    /// Find a device, trying the last known good connection first.
    pub fn detect(&self) -> Result<DiscoveredDevice> {
        if let Some(device) = self.try_last_connection()? {
            return Ok(device);
        }
        let device = self.scan()?;
        let record = LastConnection {
            port: device.port.clone(),
            baud: device.baud.unwrap_or_default(),
            device_type: device.dialect().name().to_string(),
        };
        if let Err(e) = self.ctx.last_connection.save(&record) {
            tracing::warn!("could not remember connection: {}", e);
        }
        Ok(device)
    }

    fn allowed(&self, port: &str) -> bool {
        self.only_ports
            .as_ref()
            .map_or(true, |only| only.iter().any(|p| p == port))
    }

    fn try_last_connection(&self) -> Result<Option<DiscoveredDevice>> {
        let Some(record) = self.ctx.last_connection.load() else {
            return Ok(None);
        };
        let Ok(dialect) = record.device_type.parse::<DeviceDialect>() else {
            tracing::debug!("ignoring last connection with type '{}'", record.device_type);
            return Ok(None);
        };
        if !self.dialects.contains(&dialect) || !self.allowed(&record.port) {
            return Ok(None);
        }
        tracing::info!(
            "trying last connection {}@{} ({})",
            record.port,
            record.baud,
            dialect
        );
        let stop = AtomicBool::new(false);
        let plan = probe_plan(&[dialect]);
        match self.probe_port(&record.port, record.baud, &plan, &stop) {
            Ok(Some(device)) => Ok(Some(device)),
            Ok(None) => {
                tracing::info!("no answer on last connection, scanning");
                Ok(None)
            }
            Err(e) => {
                tracing::info!("last connection unavailable ({}), scanning", e);
                Ok(None)
            }
        }
    }

    fn probe_port(
        &self,
        port: &str,
        baud: u32,
        plan: &[ProbeStep],
        stop: &AtomicBool,
    ) -> Result<Option<DiscoveredDevice>> {
        metrics::counter!(metric_defs::PROBE_ATTEMPTS.name, "port" => port.to_string()).increment(1);
        let mut transport = self.ports.open(port, baud)?;
        transport.set_read_timeout(self.ctx.config.discovery.read_poll())?;
        let timeout = self.ctx.config.discovery.probe_timeout();
        let Some((info, _)) = probe(&mut *transport, plan, timeout, stop)? else {
            return Ok(None);
        };
        tracing::info!("found {} on {}@{}", info, port, baud);
        Ok(Some(DiscoveredDevice {
            port: port.to_string(),
            baud: Some(baud),
            format: info.device_type.wire_format(None),
            device_info: info,
            transport,
        }))
    }

    fn scan(&self) -> Result<DiscoveredDevice> {
        let ports: Vec<PortInfo> = self
            .ports
            .candidate_ports()?
            .into_iter()
            .filter(|p| self.allowed(&p.name))
            .collect();
        if ports.is_empty() {
            tracing::warn!("no serial ports to probe");
            return Err(DriverError::DeviceNotFound);
        }
        let discovery = &self.ctx.config.discovery;
        let lanes = discovery.max_threads.clamp(1, ports.len());
        let mut assignments: Vec<Vec<String>> = vec![Vec::new(); lanes];
        for (i, port) in ports.into_iter().enumerate() {
            assignments[i % lanes].push(port.name);
        }
        tracing::info!(
            "probing {:?} at {:?} baud with {} threads",
            assignments,
            discovery.baud_rates,
            lanes
        );

        let plan = probe_plan(&self.dialects);
        let found = AtomicBool::new(false);
        let winner: Mutex<Option<DiscoveredDevice>> = Mutex::new(None);
        let cancel = self.ctx.cancel_flag();

        thread::scope(|scope| {
            for (n, lane) in assignments.into_iter().enumerate() {
                let (plan, found, winner, cancel) = (&plan, &found, &winner, &cancel);
                let spawned = thread::Builder::new()
                    .name(format!("navlink-probe-{n}"))
                    .spawn_scoped(scope, move || {
                        self.probe_lane(&lane, plan, found, winner, cancel);
                    });
                if let Err(e) = spawned {
                    tracing::error!("could not start probing thread: {}", e);
                }
            }
        });

        match winner.into_inner() {
            Some(device) => Ok(device),
            None if self.ctx.is_cancelled() => Err(DriverError::Cancelled),
            None => Err(DriverError::DeviceNotFound),
        }
    }

    fn probe_lane(
        &self,
        lane: &[String],
        plan: &[ProbeStep],
        found: &AtomicBool,
        winner: &Mutex<Option<DiscoveredDevice>>,
        cancel: &AtomicBool,
    ) {
        for port in lane {
            for &baud in &self.ctx.config.discovery.baud_rates {
                if found.load(Ordering::SeqCst) || cancel.load(Ordering::SeqCst) {
                    return;
                }
                match self.probe_port(port, baud, plan, found) {
                    Ok(Some(device)) => {
                        if found
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                        {
                            *winner.lock() = Some(device);
                        } else {
                            tracing::debug!("{} answered after another port was claimed", port);
                        }
                        return;
                    }
                    Ok(None) => tracing::debug!("no answer on {}@{}", port, baud),
                    Err(e) => {
                        tracing::debug!("cannot probe {}: {}", port, e);
                        break;
                    }
                }
            }
        }
    }
}

/// Identify the device on an already open link (TCP bridge or Ethernet).
///
/// For Ethernet the reply's source address is locked into the returned
/// framing so the session only talks to that device.
pub fn detect_on(
    mut transport: Box<dyn Transport>,
    dialects: &[DeviceDialect],
    timeout: Duration,
    host_mac: Option<MacAddress>,
) -> Result<DiscoveredDevice> {
    let stop = AtomicBool::new(false);
    let info = transport.info();
    for &dialect in dialects {
        let step = ProbeStep {
            format: dialect.probe_format(host_mac),
            command: dialect.ping_command(),
            dialects: vec![dialect],
        };
        let Some((device_info, mac)) = probe(&mut *transport, &[step], timeout, &stop)? else {
            tracing::debug!("{} did not answer as {}", info, dialect);
            continue;
        };
        let mut format = dialect.wire_format(host_mac);
        if let (WireFormat::Ethernet(config), Some(mac)) = (&mut format, mac) {
            config.device_mac = Some(mac);
        }
        tracing::info!("found {} on {}", device_info, info);
        return Ok(DiscoveredDevice {
            port: info.name.clone(),
            baud: info.baud,
            device_info,
            format,
            transport,
        });
    }
    Err(DriverError::DeviceNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use navlink_protocol::{encode_uart, PING};
    use navlink_transport::{MockPorts, MockTransport, PortKind};

    fn ctx(dir: &tempfile::TempDir) -> AppContext {
        let mut config = DriverConfig::default();
        config.last_connection_path = dir.path().join("connection.json");
        config.discovery.probe_timeout_ms = 60;
        AppContext::new(config)
    }

    fn openimu_at(mock: &MockTransport, rate: u32) {
        mock.set_responder(move |data, baud| {
            (baud == rate && data.windows(2).any(|w| w == b"pG"))
                .then(|| encode_uart(PING, b"OpenIMU300ZI 5020-3021-01 SN:12345").unwrap())
        });
    }

    #[test]
    fn test_finds_device_at_its_baud_rate() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        let ports = MockPorts::new();
        ports.add("/dev/ttyUSB0");
        let device_port = ports.add("/dev/ttyUSB1");
        openimu_at(&device_port, 57_600);

        let device = DeviceIdentifier::new(&ctx, Arc::new(ports)).detect().unwrap();
        assert_eq!(device.port, "/dev/ttyUSB1");
        assert_eq!(device.baud, Some(57_600));
        assert_eq!(device.dialect(), DeviceDialect::OpenImu);
        assert_eq!(device.device_info.serial_number.as_deref(), Some("12345"));

        let saved = ctx.last_connection.load().unwrap();
        assert_eq!(saved.port, "/dev/ttyUSB1");
        assert_eq!(saved.baud, 57_600);
        assert_eq!(saved.device_type, "openimu");
    }

    #[test]
    fn test_bluetooth_ports_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        let ports = MockPorts::new();
        let bt = ports.add_with_kind("/dev/rfcomm0", PortKind::Bluetooth);
        openimu_at(&bt, 115_200);

        let result = DeviceIdentifier::new(&ctx, Arc::new(ports)).detect();
        assert!(matches!(result, Err(DriverError::DeviceNotFound)));
        assert!(bt.writes().is_empty());
    }

    #[test]
    fn test_last_connection_is_tried_first() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        ctx.last_connection
            .save(&LastConnection {
                port: "/dev/ttyUSB3".into(),
                baud: 230_400,
                device_type: "openimu".into(),
            })
            .unwrap();
        let ports = MockPorts::new();
        let other = ports.add("/dev/ttyUSB0");
        let device_port = ports.add("/dev/ttyUSB3");
        openimu_at(&device_port, 230_400);

        let device = DeviceIdentifier::new(&ctx, Arc::new(ports)).detect().unwrap();
        assert_eq!(device.baud, Some(230_400));
        assert!(other.writes().is_empty());
        assert_eq!(device_port.writes().len(), 1);
    }

    #[test]
    fn test_cancelled_scan() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        let ports = MockPorts::new();
        ports.add("/dev/ttyUSB0");
        ctx.cancel();
        let result = DeviceIdentifier::new(&ctx, Arc::new(ports)).detect();
        assert!(matches!(result, Err(DriverError::Cancelled)));
    }

    #[test]
    fn test_ins2000_text_identity() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        let ports = MockPorts::new();
        let port = ports.add("COM4");
        port.set_responder(|data, _| {
            (data == b"version\r\n").then(|| b"#VERSION INS2000 SN:BFN1 v2.1.0\r\n".to_vec())
        });
        let device = DeviceIdentifier::new(&ctx, Arc::new(ports)).detect().unwrap();
        assert_eq!(device.dialect(), DeviceDialect::Ins2000);
        assert_eq!(device.format, WireFormat::AsciiLine);
    }
}
