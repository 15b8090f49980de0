//! A connected device.
//!
//! [`DeviceSession`] owns the [`MessageCenter`] for one discovered device and
//! a dispatcher thread that turns unclaimed frames into telemetry records.
//!
//! ```text
//! Idle -> Streaming -> Idle
//! Idle -> Logging   -> Idle
//! Idle -> Upgrading -> Idle | Error
//! any  -> Disconnected          (transport failure)
//! ```
//!
//! Parameter operations are plain request/response transactions. They are
//! refused while upgrading and after the link is lost, and an upgrade waits
//! for any operation already on the wire. The session never retries on its
//! own.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use navlink_metrics::MetricLabels;
use navlink_protocol::{Command, Frame, FieldValue};
use navlink_schema::{DeviceSchema, ParamValue, ParameterDef};
use parking_lot::{Mutex, RwLock};

use crate::config::UpgradeConfig;
use crate::context::AppContext;
use crate::device_info::{AppInfo, DeviceInfo};
use crate::dialect::{DeviceDialect, DeviceProtocol};
use crate::error::{DriverError, Result};
use crate::identifier::DiscoveredDevice;
use crate::message_center::{MessageCenter, MessageCenterEvent, MessageCenterOptions};
use crate::params::{GetParamsSequence, ParamReading};
use crate::telemetry::{TelemetryRecord, TelemetrySink};
use crate::upgrade::{UpgradeCenter, UpgradeEvent, UpgradeLink};

const DISPATCH_POLL: Duration = Duration::from_millis(100);

/// What the session is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Streaming,
    Logging,
    Upgrading,
    /// The last upgrade failed; the device may still be in its bootloader.
    Error,
    Disconnected,
}

impl SessionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Streaming => "streaming",
            SessionState::Logging => "logging",
            SessionState::Upgrading => "upgrading",
            SessionState::Error => "error",
            SessionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared with the dispatcher thread.
struct Dispatch {
    state: Mutex<SessionState>,
    subscribers: Mutex<Vec<Sender<TelemetryRecord>>>,
    sink: Mutex<Option<Box<dyn TelemetrySink>>>,
    closing: AtomicBool,
}

impl Dispatch {
    fn handle(&self, schema: &DeviceSchema, event: MessageCenterEvent) {
        match event {
            MessageCenterEvent::Continuous(frame) => {
                let state = *self.state.lock();
                if !matches!(state, SessionState::Streaming | SessionState::Logging) {
                    tracing::trace!("dropping {:?} while {}", frame.packet_type(), state);
                    return;
                }
                let record = match TelemetryRecord::decode(schema, &frame) {
                    Ok(Some(record)) => record,
                    Ok(None) => return,
                    Err(e) => {
                        tracing::debug!("undecodable telemetry {:?}: {}", frame.packet_type(), e);
                        return;
                    }
                };
                if state == SessionState::Streaming {
                    self.subscribers
                        .lock()
                        .retain(|tx| tx.send(record.clone()).is_ok());
                } else if let Some(sink) = self.sink.lock().as_mut() {
                    if let Err(e) = sink.write(&record) {
                        tracing::warn!("telemetry sink failed: {}", e);
                    }
                }
            }
            MessageCenterEvent::CrcMismatch { packet_type } => {
                tracing::debug!("dropped corrupt frame {:?}", packet_type);
            }
            MessageCenterEvent::Exception(message) => {
                tracing::error!("device link failed: {}", message);
                *self.state.lock() = SessionState::Disconnected;
                self.subscribers.lock().clear();
            }
        }
    }
}

fn dispatch_loop(dispatch: Arc<Dispatch>, schema: Arc<DeviceSchema>, events: Receiver<MessageCenterEvent>) {
    while !dispatch.closing.load(Ordering::SeqCst) {
        match events.recv_timeout(DISPATCH_POLL) {
            Ok(event) => dispatch.handle(&schema, event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// An open connection to one identified device.
pub struct DeviceSession {
    dialect: DeviceDialect,
    device_info: DeviceInfo,
    app_info: Option<AppInfo>,
    schema: Arc<DeviceSchema>,
    center: Arc<MessageCenter>,
    dispatch: Arc<Dispatch>,
    dispatcher: Option<JoinHandle<()>>,
    /// Held shared by parameter operations, exclusively while entering an upgrade.
    operations: RwLock<()>,
    timeout: Duration,
    upgrade_config: UpgradeConfig,
    cancel: Arc<AtomicBool>,
}

impl DeviceSession {
    /// Start talking to a discovered device.
    ///
    /// A failed application version request is logged, not fatal.
    pub fn open(ctx: &AppContext, device: DiscoveredDevice) -> Result<Self> {
        let dialect = device.dialect();
        let schema = Arc::new(dialect.load_schema(ctx.config.schema_dir.as_deref())?);
        tracing::info!(
            "opening {} on {} with schema '{}'",
            device.device_info,
            device.port,
            schema.name()
        );
        let options = MessageCenterOptions::new(ctx.config.transaction.tick())
            .with_clock(ctx.clock())
            .with_labels(MetricLabels::new(&device.port, dialect.name()));
        let center = Arc::new(MessageCenter::start(device.transport, device.format, options)?);
        let timeout = ctx.config.transaction.timeout();

        let app_info = dialect.app_info_from_identity(&device.device_info).or_else(|| {
            let command = dialect.version_command()?;
            let reply = center.send(command, timeout);
            match reply.map_err(DriverError::from).and_then(|f| dialect.parse_app_info(&f)) {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!("could not read application version: {}", e);
                    None
                }
            }
        });
        if let Some(info) = &app_info {
            tracing::info!("application {}", info);
        }

        let dispatch = Arc::new(Dispatch {
            state: Mutex::new(SessionState::Idle),
            subscribers: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            closing: AtomicBool::new(false),
        });
        let dispatcher = {
            let dispatch = Arc::clone(&dispatch);
            let schema = Arc::clone(&schema);
            let events = center.events();
            thread::Builder::new()
                .name("navlink-session".into())
                .spawn(move || dispatch_loop(dispatch, schema, events))
                .map_err(DriverError::Spawn)?
        };

        Ok(DeviceSession {
            dialect,
            device_info: device.device_info,
            app_info,
            schema,
            center,
            dispatch,
            dispatcher: Some(dispatcher),
            operations: RwLock::new(()),
            timeout,
            upgrade_config: ctx.config.upgrade.clone(),
            cancel: ctx.cancel_flag(),
        })
    }

    pub fn dialect(&self) -> DeviceDialect {
        self.dialect
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn app_info(&self) -> Option<&AppInfo> {
        self.app_info.as_ref()
    }

    pub fn schema(&self) -> &Arc<DeviceSchema> {
        &self.schema
    }

    pub fn state(&self) -> SessionState {
        *self.dispatch.state.lock()
    }

    pub fn message_center(&self) -> &MessageCenter {
        &self.center
    }

    fn ensure_usable(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            state @ (SessionState::Upgrading | SessionState::Disconnected) => {
                Err(DriverError::InvalidState { operation, state })
            }
            _ => Ok(()),
        }
    }

    /// Move `from` -> `to`, or fail with the current state.
    fn transition(&self, operation: &'static str, from: &[SessionState], to: SessionState) -> Result<()> {
        let mut state = self.dispatch.state.lock();
        if !from.contains(&state) {
            return Err(DriverError::InvalidState {
                operation,
                state: *state,
            });
        }
        tracing::debug!("session {} -> {}", *state, to);
        *state = to;
        Ok(())
    }

    fn transact(&self, command: Command) -> Result<Frame> {
        let description = command.describe();
        self.center.send(command, self.timeout).map_err(|e| {
            tracing::debug!("{} failed: {}", description, e);
            DriverError::from(e)
        })
    }

    /// Read one parameter by display name or argument.
    pub fn get_param(&self, name: &str) -> Result<ParamReading> {
        let def = self.schema.parameter_by_name(name)?;
        self.read_param(def)
    }

    pub fn get_param_by_id(&self, id: u32) -> Result<ParamReading> {
        let def = self.schema.parameter(id)?;
        self.read_param(def)
    }

    fn read_param(&self, def: &ParameterDef) -> Result<ParamReading> {
        let _guard = self.operations.read();
        self.ensure_usable("get_param")?;
        let command = self.dialect.get_param_command(&self.schema, def)?;
        let reply = self.transact(command)?;
        self.dialect.parse_param_reply(&self.schema, def, &reply)
    }

    /// Read every readable parameter.
    pub fn get_params(&self) -> Result<Vec<ParamReading>> {
        let _guard = self.operations.read();
        self.ensure_usable("get_params")?;
        self.read_all_params()
    }

    fn read_all_params(&self) -> Result<Vec<ParamReading>> {
        let mut sequence = GetParamsSequence::new(self.dialect, Arc::clone(&self.schema))?;
        while let Some(command) = sequence.next_command() {
            let reply = self.transact(command?)?;
            sequence.accept(&reply)?;
            let (step, total) = sequence.progress();
            tracing::trace!("parameter page {}/{}", step, total);
        }
        Ok(sequence.into_readings())
    }

    pub fn set_param(&self, name: &str, value: ParamValue) -> Result<()> {
        self.set_params(&[(name.to_string(), value)])
    }

    /// Validate and write several parameters.
    ///
    /// Values are grouped by category and each group is written in as few
    /// requests as the dialect allows. Nothing is sent unless every value
    /// validates. A failed group stops the remaining ones.
    pub fn set_params(&self, values: &[(String, ParamValue)]) -> Result<()> {
        let _guard = self.operations.read();
        self.ensure_usable("set_params")?;
        let mut validated: Vec<(&ParameterDef, FieldValue)> = Vec::with_capacity(values.len());
        for (name, value) in values {
            let def = self.schema.parameter_by_name(name)?;
            validated.push((def, def.validate(value)?));
        }
        let ids: Vec<u32> = validated.iter().map(|(def, _)| def.id).collect();
        let groups = self.schema.parameters().group_by_category(&ids)?;

        for (category, members) in groups {
            for chunk in members.chunks(self.dialect.max_params_per_set()) {
                let batch: Vec<(&ParameterDef, FieldValue)> = chunk
                    .iter()
                    .filter_map(|id| validated.iter().find(|(def, _)| def.id == *id))
                    .map(|(def, value)| (*def, value.clone()))
                    .collect();
                tracing::debug!("writing {} {} parameter(s)", batch.len(), category);
                let command = self.dialect.set_params_command(&self.schema, &batch)?;
                let reply = self.transact(command)?;
                self.dialect.check_write_reply(&self.schema, chunk, &reply)?;
            }
        }
        Ok(())
    }

    /// Persist the working configuration.
    pub fn save_config(&self) -> Result<()> {
        let _guard = self.operations.read();
        self.ensure_usable("save_config")?;
        let snapshot = if self.dialect.save_needs_snapshot() {
            self.read_all_params()?
        } else {
            Vec::new()
        };
        let command = self.dialect.save_config_command(&self.schema, &snapshot)?;
        let reply = self.transact(command)?;
        let ids: Vec<u32> = snapshot.iter().map(|r| r.id).collect();
        self.dialect.check_write_reply(&self.schema, &ids, &reply)?;
        tracing::info!("configuration saved");
        Ok(())
    }

    pub fn restore_defaults(&self) -> Result<()> {
        let _guard = self.operations.read();
        self.ensure_usable("restore_defaults")?;
        let command = self.dialect.restore_defaults_command()?;
        let reply = self.transact(command)?;
        self.dialect.check_write_reply(&self.schema, &[], &reply)?;
        tracing::info!("factory defaults restored");
        Ok(())
    }

    /// Subscribe to decoded telemetry. Several subscribers may stream at once.
    pub fn start_stream(&self) -> Result<Receiver<TelemetryRecord>> {
        self.transition(
            "start streaming",
            &[SessionState::Idle, SessionState::Streaming],
            SessionState::Streaming,
        )?;
        let (tx, rx) = unbounded();
        self.dispatch.subscribers.lock().push(tx);
        Ok(rx)
    }

    /// Drop every subscriber. A no-op unless streaming.
    pub fn stop_stream(&self) -> Result<()> {
        if self.state() == SessionState::Streaming {
            self.dispatch.subscribers.lock().clear();
            self.transition("stop streaming", &[SessionState::Streaming], SessionState::Idle)?;
        }
        Ok(())
    }

    /// Send decoded telemetry to `sink` until [`stop_logging`](Self::stop_logging).
    pub fn start_logging(&self, sink: Box<dyn TelemetrySink>) -> Result<()> {
        let mut slot = self.dispatch.sink.lock();
        self.transition("start logging", &[SessionState::Idle], SessionState::Logging)?;
        *slot = Some(sink);
        Ok(())
    }

    /// Stop logging and hand the sink back after flushing it.
    pub fn stop_logging(&self) -> Result<Option<Box<dyn TelemetrySink>>> {
        if self.state() != SessionState::Logging {
            return Ok(None);
        }
        self.transition("stop logging", &[SessionState::Logging], SessionState::Idle)?;
        let mut sink = self.dispatch.sink.lock().take();
        if let Some(sink) = sink.as_mut() {
            sink.flush()?;
        }
        Ok(sink)
    }

    /// Write a firmware image, reporting to `observer`.
    ///
    /// On failure the session moves to [`SessionState::Error`] and the device
    /// may be left in its bootloader; a new upgrade can be attempted after
    /// [`acknowledge_error`](Self::acknowledge_error).
    pub fn upgrade(
        &self,
        image: &[u8],
        observer: impl Fn(&UpgradeEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        {
            let _exclusive = self.operations.write();
            self.transition("upgrade", &[SessionState::Idle], SessionState::Upgrading)?;
        }
        let link: Arc<dyn UpgradeLink> = Arc::clone(&self.center) as Arc<dyn UpgradeLink>;
        let workers = match self
            .dialect
            .get_upgrade_workers(link, image, &self.upgrade_config)
        {
            Ok(workers) => workers,
            Err(e) => {
                *self.dispatch.state.lock() = SessionState::Idle;
                return Err(e.into());
            }
        };

        let mut center = UpgradeCenter::new().with_cancel(Arc::clone(&self.cancel));
        for worker in workers {
            center.register(worker);
        }
        center.on_event(observer);
        tracing::info!(
            "upgrading {} with {} bytes in {} steps",
            self.device_info,
            center.total_size(),
            center.worker_count()
        );
        let result = center.run();
        let mut state = self.dispatch.state.lock();
        if *state == SessionState::Upgrading {
            *state = if result.is_ok() {
                SessionState::Idle
            } else {
                SessionState::Error
            };
        }
        drop(state);
        match result {
            Ok(()) => {
                tracing::info!("upgrade finished");
                Ok(())
            }
            Err(e) => {
                tracing::error!("upgrade failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Leave the error state after a failed upgrade.
    pub fn acknowledge_error(&self) -> Result<()> {
        self.transition("acknowledge error", &[SessionState::Error], SessionState::Idle)
    }

    fn shutdown(&mut self) {
        self.dispatch.closing.store(true, Ordering::SeqCst);
        self.center.stop();
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                tracing::error!("session dispatcher panicked");
            }
        }
        if let Some(mut sink) = self.dispatch.sink.lock().take() {
            if let Err(e) = sink.flush() {
                tracing::warn!("telemetry sink flush failed: {}", e);
            }
        }
    }

    /// Stop the message center and release the link.
    pub fn close(mut self) {
        self.shutdown();
        tracing::info!("closed session with {}", self.device_info);
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::telemetry::JsonLinesSink;
    use navlink_protocol::{
        encode_uart, FieldCodec, FieldType, PacketType, WireFormat, GET_PARAM, GET_VERSION,
        SAVE_CONFIG, UPDATE_PARAM, UPDATE_PARAM_BLOCK,
    };
    use navlink_protocol::JUMP_BOOTLOADER;
    use navlink_transport::MockTransport;

    /// Written UART frame split into type and payload.
    fn split(data: &[u8]) -> Option<(PacketType, Vec<u8>)> {
        let len = usize::from(*data.get(4)?);
        let packet_type = PacketType::new([data[2], data[3]]);
        Some((packet_type, data.get(5..5 + len)?.to_vec()))
    }

    fn status(packet_type: PacketType, code: i32) -> Vec<u8> {
        encode_uart(packet_type, &code.to_le_bytes()).unwrap()
    }

    /// OpenIMU stand-in answering version, parameter and save requests.
    fn openimu(log: Arc<Mutex<Vec<(PacketType, Vec<u8>)>>>) -> MockTransport {
        let mock = MockTransport::new("/dev/ttyUSB0");
        mock.set_responder(move |data, _| {
            let (packet_type, payload) = split(data)?;
            log.lock().push((packet_type, payload.clone()));
            if packet_type == GET_VERSION {
                return encode_uart(GET_VERSION, b"OpenIMU300ZI IMU 19.0.0").ok();
            }
            if packet_type == GET_PARAM {
                let mut reply = payload[..4].to_vec();
                reply.extend_from_slice(&115_200i64.to_le_bytes());
                return encode_uart(GET_PARAM, &reply).ok();
            }
            if packet_type == UPDATE_PARAM || packet_type == UPDATE_PARAM_BLOCK {
                return Some(status(packet_type, 0));
            }
            if packet_type == SAVE_CONFIG {
                return encode_uart(SAVE_CONFIG, &[]).ok();
            }
            None
        });
        mock
    }

    fn open(mock: &MockTransport) -> DeviceSession {
        let mut config = DriverConfig::default();
        config.transaction.timeout_ms = 300;
        config.transaction.tick_ms = 20;
        let ctx = AppContext::new(config);
        let device = DiscoveredDevice {
            port: "/dev/ttyUSB0".into(),
            baud: Some(115_200),
            device_info: DeviceInfo::parse(DeviceDialect::OpenImu, "OpenIMU300ZI 5020-3021-01 SN:1"),
            format: WireFormat::uart(),
            transport: Box::new(mock.clone()),
        };
        DeviceSession::open(&ctx, device).unwrap()
    }

    #[test]
    fn test_open_reads_application_version() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = open(&openimu(Arc::clone(&log)));
        let app = session.app_info().unwrap();
        assert_eq!(app.app_name, "IMU");
        assert_eq!(app.version.as_deref(), Some("19.0.0"));
        assert_eq!(session.state(), SessionState::Idle);
        session.close();
    }

    #[test]
    fn test_get_param_by_argument() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = open(&openimu(Arc::clone(&log)));
        let reading = session.get_param("baud_rate").unwrap();
        assert_eq!(reading.id, 2);
        assert_eq!(reading.value, ParamValue::Integer(115_200));
        assert!(matches!(
            session.get_param("no_such_param"),
            Err(DriverError::Schema(_))
        ));
    }

    #[test]
    fn test_set_params_groups_by_category() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = open(&openimu(Arc::clone(&log)));
        log.lock().clear();
        session
            .set_params(&[
                ("baud_rate".into(), ParamValue::Integer(230_400)),
                ("accel_lpf".into(), ParamValue::Integer(25)),
                ("packet_rate".into(), ParamValue::Integer(50)),
            ])
            .unwrap();

        let writes = log.lock().clone();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].0, UPDATE_PARAM_BLOCK);
        let codec = FieldCodec::new(navlink_protocol::Endian::Little);
        let count = codec.decode(FieldType::U32, &writes[0].1[..4]).unwrap();
        assert_eq!(count, FieldValue::UInt(2));
        assert_eq!(writes[1].0, UPDATE_PARAM);
        assert_eq!(&writes[1].1[..4], &5u32.to_le_bytes());
    }

    #[test]
    fn test_invalid_value_sends_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = open(&openimu(Arc::clone(&log)));
        log.lock().clear();
        let result = session.set_params(&[
            ("packet_rate".into(), ParamValue::Integer(50)),
            ("baud_rate".into(), ParamValue::Integer(12_345)),
        ]);
        assert!(matches!(result, Err(DriverError::Schema(_))));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_device_error_code_is_surfaced() {
        let mock = MockTransport::new("/dev/ttyUSB0");
        mock.set_responder(|data, _| {
            let (packet_type, _) = split(data)?;
            (packet_type == UPDATE_PARAM).then(|| status(UPDATE_PARAM, 3))
        });
        let session = open(&mock);
        let result = session.set_param("packet_rate", ParamValue::Integer(10));
        assert!(matches!(result, Err(DriverError::DeviceError { code: 3, .. })));
    }

    #[test]
    fn test_save_config() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = open(&openimu(Arc::clone(&log)));
        session.save_config().unwrap();
        assert!(log.lock().iter().any(|(t, _)| *t == SAVE_CONFIG));
    }

    #[test]
    fn test_stream_delivers_decoded_records() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mock = openimu(log);
        let session = open(&mock);
        let rx = session.start_stream().unwrap();
        assert_eq!(session.state(), SessionState::Streaming);

        let mut payload = 1234u32.to_le_bytes().to_vec();
        for i in 0..9 {
            payload.extend_from_slice(&(i as f32).to_le_bytes());
        }
        mock.inject_read(&encode_uart(PacketType::new(*b"z1"), &payload).unwrap());
        let record = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(record.packet, "z1");
        assert_eq!(record.field("time"), Some(&ParamValue::Integer(1234)));

        assert!(matches!(
            session.start_logging(Box::new(JsonLinesSink::new(Vec::new(), "buffer"))),
            Err(DriverError::InvalidState {
                state: SessionState::Streaming,
                ..
            })
        ));
        session.stop_stream().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_read_failure_disconnects() {
        let mock = MockTransport::new("/dev/ttyUSB0");
        let session = open(&mock);
        mock.fail_reads("unplugged");
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while session.state() != SessionState::Disconnected && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.get_param("baud_rate"),
            Err(DriverError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_upgrade_rejected_unless_idle() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = open(&openimu(log));
        let _rx = session.start_stream().unwrap();
        let result = session.upgrade(&[0u8; 16], |_| {});
        assert!(matches!(result, Err(DriverError::InvalidState { .. })));
        assert_eq!(session.state(), SessionState::Streaming);
    }
    #[test]
    fn test_upgrade_waits_for_parameter_writes() {
        let log = Arc::new(Mutex::new(Vec::<PacketType>::new()));
        let held = Arc::new(Mutex::new(None::<PacketType>));
        let mock = MockTransport::new("/dev/ttyUSB0");
        {
            let log = Arc::clone(&log);
            let held = Arc::clone(&held);
            mock.set_responder(move |data, _| {
                let (packet_type, _) = split(data)?;
                log.lock().push(packet_type);
                if packet_type == GET_VERSION {
                    return encode_uart(GET_VERSION, b"OpenIMU300ZI IMU 19.0.0").ok();
                }
                if packet_type != UPDATE_PARAM && packet_type != UPDATE_PARAM_BLOCK {
                    return None;
                }
                let mut held = held.lock();
                if held.is_none() {
                    // Leave the first write unanswered until the test releases it.
                    *held = Some(packet_type);
                    return None;
                }
                Some(status(packet_type, 0))
            });
        }
        let session = open(&mock);
        log.lock().clear();

        thread::scope(|scope| {
            let writer = scope.spawn(|| {
                session.set_params(&[
                    ("baud_rate".into(), ParamValue::Integer(230_400)),
                    ("packet_rate".into(), ParamValue::Integer(50)),
                ])
            });
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while log.lock().is_empty() && std::time::Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            let upgrader = scope.spawn(|| session.upgrade(&[0u8; 16], |_| {}));
            thread::sleep(Duration::from_millis(50));
            assert_eq!(session.state(), SessionState::Idle);
            assert!(!log.lock().contains(&JUMP_BOOTLOADER));

            let first = (*held.lock()).unwrap();
            mock.inject_read(&status(first, 0));
            assert!(writer.join().unwrap().is_ok());
            assert!(upgrader.join().unwrap().is_err());
        });

        let wire = log.lock().clone();
        let jump = wire.iter().position(|t| *t == JUMP_BOOTLOADER).unwrap();
        let writes = wire
            .iter()
            .filter(|t| **t == UPDATE_PARAM || **t == UPDATE_PARAM_BLOCK)
            .count();
        assert_eq!(writes, 2);
        assert_eq!(jump, 2);
        assert_eq!(session.state(), SessionState::Error);
        // Parameters stay reachable after a failed upgrade.
        session.set_param("packet_rate", ParamValue::Integer(10)).unwrap();
    }
}
