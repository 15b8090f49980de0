//! Firmware upgrade through a session and worker phasing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use navlink_driver::upgrade::ProgressReporter;
use navlink_driver::{
    AppContext, DeviceDialect, DeviceInfo, DeviceSession, DiscoveredDevice, DriverConfig,
    SessionState, UpgradeCenter, UpgradeError, UpgradeEvent, UpgradeWorker, WorkerGroup,
};
use navlink_protocol::{
    encode_uart, parse_write_block, PacketType, WireFormat, JUMP_APPLICATION, JUMP_BOOTLOADER,
    PING, WRITE_APP,
};
use navlink_transport::MockTransport;
use parking_lot::Mutex;

fn split(data: &[u8]) -> Option<(PacketType, Vec<u8>)> {
    let len = usize::from(*data.get(4)?);
    Some((PacketType::new([data[2], data[3]]), data.get(5..5 + len)?.to_vec()))
}

/// OpenIMU bootloader stand-in recording every block written.
fn bootloader(blocks: Arc<Mutex<Vec<(u32, usize)>>>, ack_writes: bool) -> MockTransport {
    let mock = MockTransport::new("/dev/ttyUSB0");
    mock.set_responder(move |data, _| {
        let (packet_type, payload) = split(data)?;
        if packet_type == JUMP_BOOTLOADER {
            return encode_uart(JUMP_BOOTLOADER, &[]).ok();
        }
        if packet_type == WRITE_APP {
            let (address, block) = parse_write_block(&payload).ok()?;
            blocks.lock().push((address, block.len()));
            return ack_writes.then(|| encode_uart(WRITE_APP, &payload[..5]).unwrap());
        }
        if packet_type == JUMP_APPLICATION {
            return None;
        }
        if packet_type == PING {
            return encode_uart(PING, b"OpenIMU300ZI 5020-3021-01 SN:12345").ok();
        }
        None
    });
    mock
}

fn session(mock: &MockTransport) -> DeviceSession {
    let mut config = DriverConfig::default();
    config.transaction.timeout_ms = 200;
    config.transaction.tick_ms = 20;
    config.upgrade.block_timeout_ms = 200;
    config.upgrade.first_block_delay_ms = 0;
    config.upgrade.bootloader_settle_ms = 0;
    config.upgrade.application_settle_ms = 0;
    config.upgrade.retries = 1;
    let ctx = AppContext::new(config);
    let device = DiscoveredDevice {
        port: "/dev/ttyUSB0".into(),
        baud: Some(115_200),
        device_info: DeviceInfo::parse(DeviceDialect::OpenImu, "OpenIMU300ZI SN:12345"),
        format: WireFormat::uart(),
        transport: Box::new(mock.clone()),
    };
    DeviceSession::open(&ctx, device).unwrap()
}

#[test]
fn test_500_byte_image_is_written_in_three_blocks() {
    let blocks = Arc::new(Mutex::new(Vec::new()));
    let mock = bootloader(Arc::clone(&blocks), true);
    let session = session(&mock);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let image: Vec<u8> = (0..500u32).map(|i| i as u8).collect();
    session
        .upgrade(&image, move |e| sink.lock().push(e.clone()))
        .unwrap();

    assert_eq!(*blocks.lock(), vec![(0, 240), (240, 240), (480, 20)]);
    let events = events.lock();
    let last_progress = events
        .iter()
        .rev()
        .find(|e| matches!(e, UpgradeEvent::Progress { .. }));
    assert_eq!(
        last_progress,
        Some(&UpgradeEvent::Progress {
            current: 500,
            total: 500
        })
    );
    assert_eq!(events.last(), Some(&UpgradeEvent::Finished));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_missing_acks_leave_the_session_in_error() {
    let blocks = Arc::new(Mutex::new(Vec::new()));
    let mock = bootloader(Arc::clone(&blocks), false);
    let session = session(&mock);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let result = session.upgrade(&[0xAA; 300], move |e| sink.lock().push(e.clone()));
    assert!(result.is_err());
    // First attempt plus one resend of block 0.
    assert_eq!(*blocks.lock(), vec![(0, 240), (0, 240)]);
    assert_eq!(session.state(), SessionState::Error);
    assert!(!events.lock().contains(&UpgradeEvent::Finished));
    assert!(session.get_param("baud_rate").is_err());

    session.acknowledge_error().unwrap();
    assert_eq!(session.state(), SessionState::Idle);
}

/// Records when it ran.
struct Timed {
    name: &'static str,
    group: WorkerGroup,
    busy: Duration,
    log: Arc<Mutex<Vec<(&'static str, Instant, Instant)>>>,
    stop: Arc<AtomicBool>,
}

impl Timed {
    fn new(
        name: &'static str,
        group: WorkerGroup,
        log: &Arc<Mutex<Vec<(&'static str, Instant, Instant)>>>,
    ) -> Box<dyn UpgradeWorker> {
        Box::new(Timed {
            name,
            group,
            busy: Duration::from_millis(60),
            log: Arc::clone(log),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl UpgradeWorker for Timed {
    fn name(&self) -> &str {
        self.name
    }

    fn group(&self) -> &WorkerGroup {
        &self.group
    }

    fn content_size(&self) -> usize {
        10
    }

    fn work(&mut self, progress: &ProgressReporter<'_>) -> Result<(), UpgradeError> {
        let start = Instant::now();
        thread::sleep(self.busy);
        if self.stop.load(Ordering::SeqCst) {
            return Err(UpgradeError::Stopped);
        }
        progress.report(10, 10);
        self.log.lock().push((self.name, start, Instant::now()));
        Ok(())
    }

    fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

#[test]
fn test_before_parallel_after_phasing() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut center = UpgradeCenter::new();
    center.register(Timed::new("D", WorkerGroup::AfterAll, &log));
    center.register(Timed::new("B", WorkerGroup::None, &log));
    center.register(Timed::new("A", WorkerGroup::BeforeAll, &log));
    center.register(Timed::new("C", WorkerGroup::None, &log));
    center.run().unwrap();

    let log = log.lock();
    let span = |name: &str| {
        let (_, start, end) = log.iter().find(|(n, _, _)| *n == name).unwrap();
        (*start, *end)
    };
    let (a, b, c, d) = (span("A"), span("B"), span("C"), span("D"));
    assert!(a.1 <= b.0 && a.1 <= c.0);
    assert!(b.1 <= d.0 && c.1 <= d.0);
    // B and C ran side by side.
    assert!(b.0 < c.1 && c.0 < b.1);
}
