//! Discovery scenarios against scripted serial ports.

use std::sync::Arc;
use std::time::{Duration, Instant};

use navlink_driver::{
    detect_on, AppContext, DeviceDialect, DeviceIdentifier, DeviceSession, DriverConfig,
    DriverError,
};
use navlink_protocol::{encode_uart, WireFormat, PING};
use navlink_transport::{MockPorts, MockTransport};

fn context(dir: &tempfile::TempDir) -> AppContext {
    let mut config = DriverConfig::default();
    config.last_connection_path = dir.path().join("connection.json");
    config.discovery.probe_timeout_ms = 50;
    config.transaction.timeout_ms = 200;
    AppContext::new(config)
}

/// Answers `pG` at `rate` only.
fn openimu(port: &MockTransport, rate: u32) {
    port.set_responder(move |data, baud| {
        let is_ping = data.len() > 4 && data[2..4] == PING.0;
        (baud == rate && is_ping)
            .then(|| encode_uart(PING, b"OpenIMU300ZI ... SN:12345").unwrap())
    });
}

#[test]
fn test_openimu_found_at_115200() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    let ports = MockPorts::new();
    let port = ports.add("/dev/ttyUSB0");
    openimu(&port, 115_200);

    let started = Instant::now();
    let device = DeviceIdentifier::new(&ctx, Arc::new(ports)).detect().unwrap();
    assert_eq!(device.dialect(), DeviceDialect::OpenImu);
    assert_eq!(device.device_info.serial_number.as_deref(), Some("12345"));
    assert_eq!(device.baud, Some(115_200));
    assert_eq!(device.format, WireFormat::uart());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_one_answering_port_among_many() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    let ports = MockPorts::new();
    for i in 0..6 {
        ports.add(&format!("/dev/ttyUSB{i}"));
    }
    let answering = ports.add("/dev/ttyACM0");
    openimu(&answering, 230_400);

    let device = DeviceIdentifier::new(&ctx, Arc::new(ports)).detect().unwrap();
    assert_eq!(device.port, "/dev/ttyACM0");
    assert_eq!(device.baud, Some(230_400));
    assert_eq!(ctx.last_connection.load().unwrap().port, "/dev/ttyACM0");
}

#[test]
fn test_nothing_answers() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(&dir);
    ctx.config.discovery.baud_rates = vec![115_200];
    let ports = MockPorts::new();
    let port = ports.add("/dev/ttyUSB0");

    let result = DeviceIdentifier::new(&ctx, Arc::new(ports)).detect();
    assert!(matches!(result, Err(DriverError::DeviceNotFound)));
    // One request per distinct identity command.
    assert_eq!(port.writes().len(), 3);
    assert!(ctx.last_connection.load().is_none());
}

#[test]
fn test_detected_device_opens_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    let ports = MockPorts::new();
    let port = ports.add("/dev/ttyUSB0");
    openimu(&port, 115_200);

    let device = DeviceIdentifier::new(&ctx, Arc::new(ports)).detect().unwrap();
    let session = DeviceSession::open(&ctx, device).unwrap();
    assert_eq!(session.dialect(), DeviceDialect::OpenImu);
    assert_eq!(session.schema().device_type(), "openimu");
    session.close();
}

#[test]
fn test_detect_on_open_link() {
    let link = MockTransport::new("192.168.1.20:2000");
    link.set_responder(|data, _| {
        (data.len() > 4 && data[2..4] == PING.0)
            .then(|| encode_uart(PING, b"RTK330L 5020-3820-01 SN:2178200133").unwrap())
    });
    let device = detect_on(
        Box::new(link),
        &[DeviceDialect::OpenRtk],
        Duration::from_millis(100),
        None,
    )
    .unwrap();
    assert_eq!(device.dialect(), DeviceDialect::OpenRtk);
    assert_eq!(device.port, "192.168.1.20:2000");
    assert!(matches!(device.format, WireFormat::UartWithNmea { .. }));
}
