//! Request/response correlation over one transport.
//!
//! A [`MessageCenter`] owns a transport and three threads:
//!
//! - **receiver**: blocking reads from the transport, pushes raw chunks onto
//!   the byte queue
//! - **parser**: drains the queue through the dialect's decoder and routes
//!   every frame either to the in-flight transaction or to the continuous
//!   event channel
//! - **timeout checker**: resolves the in-flight transaction with
//!   [`TransactionError::Timeout`] once its deadline passes
//!
//! At most one command is unacknowledged at any time. Commands are written
//! in the order they were submitted; the next one is written as soon as the
//! previous resolves. Many dialects carry no request id, so replies are
//! matched by type and order alone.
//!
//! Lock order is `state` before `transport`; the receiver only ever holds
//! `transport`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use navlink_metrics::{metric_defs, MetricLabels};
use navlink_protocol::{
    Command, DecodeEvent, DecoderStats, Frame, FrameDecoder, MacAddress, PacketType,
    ResponseMatcher, StreamDecoder, WireFormat,
};
use navlink_transport::{Transport, TransportInfo};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::clock::{Clock, SystemClock};
use crate::error::{DriverError, Result, TransactionError};

const READ_BUFFER_SIZE: usize = 4096;

/// Continuous events buffered before new ones are dropped.
const EVENT_CAPACITY: usize = 4096;

/// Outcome delivered to the caller of [`MessageCenter::send`].
pub type Reply = std::result::Result<Frame, TransactionError>;

/// Traffic not claimed by a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageCenterEvent {
    /// A frame that did not answer the in-flight command (streamed telemetry).
    Continuous(Frame),
    /// A frame was dropped on checksum mismatch.
    CrcMismatch { packet_type: Option<PacketType> },
    /// The transport failed; the message center has stopped reading.
    Exception(String),
}

/// Startup options.
#[derive(Clone)]
pub struct MessageCenterOptions {
    /// Timeout checker period.
    pub tick: Duration,
    pub clock: Arc<dyn Clock>,
    pub labels: MetricLabels,
}

impl Default for MessageCenterOptions {
    fn default() -> Self {
        MessageCenterOptions {
            tick: Duration::from_millis(100),
            clock: Arc::new(SystemClock),
            labels: MetricLabels::new("", ""),
        }
    }
}

impl MessageCenterOptions {
    pub fn new(tick: Duration) -> Self {
        MessageCenterOptions {
            tick,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: MetricLabels) -> Self {
        self.labels = labels;
        self
    }
}

/// Handle to a submitted command.
#[must_use = "a pending response does nothing unless waited on"]
#[derive(Debug)]
pub struct PendingResponse {
    rx: Receiver<Reply>,
}

impl PendingResponse {
    fn resolved(reply: Reply) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(reply);
        PendingResponse { rx }
    }

    /// Block until the transaction resolves.
    pub fn wait(self) -> Reply {
        self.rx.recv().unwrap_or(Err(TransactionError::Disconnected))
    }

    /// The outcome, if the transaction has already resolved.
    pub fn try_result(&self) -> Option<Reply> {
        self.rx.try_recv().ok()
    }
}

struct Transaction {
    command: Command,
    wire: Vec<u8>,
    timeout: Duration,
    started_at: Option<Instant>,
    reply: Sender<Reply>,
}

#[derive(Default)]
struct State {
    current: Option<Transaction>,
    pending: VecDeque<Transaction>,
    stopped: bool,
    failure: Option<String>,
}

enum Verdict {
    Reply,
    Rejected(String),
    Unrelated,
}

struct Shared {
    transport: Mutex<Box<dyn Transport>>,
    format: Mutex<WireFormat>,
    decoder: Mutex<StreamDecoder>,
    state: Mutex<State>,
    queue: Mutex<VecDeque<Vec<u8>>>,
    queue_ready: Condvar,
    running: AtomicBool,
    paused: AtomicBool,
    has_exception: AtomicBool,
    events: Sender<MessageCenterEvent>,
    dropped_events: AtomicU64,
    clock: Arc<dyn Clock>,
    tick: Duration,
    labels: MetricLabels,
}

impl Shared {
    fn transaction_labels(&self, command: &Command) -> Vec<(&'static str, String)> {
        let packet_type = command
            .packet_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "text".to_string());
        self.labels.with(&[("packet_type", packet_type)])
    }

    /// Write queued commands until one is in flight. Caller holds `state`.
    fn start_next(&self, state: &mut State) {
        while state.current.is_none() {
            let Some(mut txn) = state.pending.pop_front() else {
                return;
            };
            let written = self.transport.lock().write_all(&txn.wire);
            match written {
                Ok(()) => {
                    tracing::trace!(bytes = %hex::encode(&txn.wire), "tx {}", txn.command.describe());
                    metrics::counter!(metric_defs::TRANSPORT_BYTES_WRITTEN.name, &self.labels.to_labels())
                        .increment(txn.wire.len() as u64);
                    if txn.command.expect == ResponseMatcher::NoResponse {
                        let _ = txn.reply.send(Ok(Frame::Text(String::new())));
                        continue;
                    }
                    txn.started_at = Some(self.clock.now());
                    state.current = Some(txn);
                }
                Err(e) => {
                    tracing::warn!("write of {} failed: {}", txn.command.describe(), e);
                    let _ = txn.reply.send(Err(TransactionError::Transport(e.to_string())));
                }
            }
        }
    }

    /// Resolve the in-flight transaction and start the next one.
    fn finish_current(&self, state: &mut State, reply: Reply) {
        if let Some(txn) = state.current.take() {
            let labels = self.transaction_labels(&txn.command);
            match &reply {
                Ok(_) => {
                    metrics::counter!(metric_defs::TRANSACTIONS_COMPLETED.name, &labels).increment(1);
                    if let Some(started) = txn.started_at {
                        let elapsed = self.clock.now().saturating_duration_since(started);
                        metrics::histogram!(metric_defs::TRANSACTION_LATENCY.name, &self.labels.to_labels())
                            .record(elapsed.as_secs_f64() * 1000.0);
                    }
                }
                Err(TransactionError::Timeout(_)) => {
                    metrics::counter!(metric_defs::TRANSACTIONS_TIMEOUTS.name, &labels).increment(1);
                }
                Err(_) => {}
            }
            let _ = txn.reply.send(reply);
        }
        if !state.stopped && state.failure.is_none() {
            self.start_next(state);
        }
    }

    fn fail_all(&self, state: &mut State, error: TransactionError) {
        let current = state.current.take();
        for txn in current.into_iter().chain(state.pending.drain(..)) {
            let _ = txn.reply.send(Err(error.clone()));
        }
    }

    fn emit(&self, event: MessageCenterEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 1000 == 0 {
                    tracing::warn!("event consumer is not keeping up, {} events dropped", dropped);
                }
            }
        }
    }

    fn dispatch(&self, event: DecodeEvent) {
        match event {
            DecodeEvent::Frame(frame) => {
                metrics::counter!(metric_defs::FRAMES_DECODED.name, &self.labels.to_labels()).increment(1);
                let unclaimed = {
                    let mut state = self.state.lock();
                    let verdict = match &state.current {
                        Some(txn) if txn.command.is_rejected_by(&frame) => {
                            Verdict::Rejected(txn.command.describe())
                        }
                        Some(txn) if txn.command.expect.matches(&frame) => Verdict::Reply,
                        _ => Verdict::Unrelated,
                    };
                    match verdict {
                        Verdict::Reply => {
                            self.finish_current(&mut state, Ok(frame));
                            None
                        }
                        Verdict::Rejected(what) => {
                            tracing::debug!("{} rejected by device", what);
                            self.finish_current(&mut state, Err(TransactionError::Nak(what)));
                            None
                        }
                        Verdict::Unrelated => Some(frame),
                    }
                };
                if let Some(frame) = unclaimed {
                    self.emit(MessageCenterEvent::Continuous(frame));
                }
            }
            DecodeEvent::CrcMismatch {
                packet_type,
                expected,
                actual,
            } => {
                metrics::counter!(metric_defs::FRAMES_CRC_ERRORS.name, &self.labels.to_labels()).increment(1);
                tracing::debug!(
                    "dropped frame {:?}: crc {:06x} != {:06x}",
                    packet_type.map(|t| t.to_string()),
                    expected,
                    actual
                );
                self.emit(MessageCenterEvent::CrcMismatch { packet_type });
            }
        }
    }

    fn raise_exception(&self, message: String) {
        tracing::error!("transport read failed: {}", message);
        self.has_exception.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        {
            let mut state = self.state.lock();
            state.failure = Some(message.clone());
            self.fail_all(&mut state, TransactionError::Disconnected);
        }
        self.queue_ready.notify_all();
        self.emit(MessageCenterEvent::Exception(message));
    }
}

fn receive_loop(shared: Arc<Shared>) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    while shared.running.load(Ordering::Acquire) {
        let mut transport = shared.transport.lock();
        let result = transport.read(&mut buffer);
        // Writers are waiting on this lock between every poll.
        MutexGuard::unlock_fair(transport);
        match result {
            Ok(0) => {}
            Ok(n) => {
                metrics::counter!(metric_defs::TRANSPORT_BYTES_READ.name, &shared.labels.to_labels())
                    .increment(n as u64);
                shared.queue.lock().push_back(buffer[..n].to_vec());
                shared.queue_ready.notify_one();
            }
            Err(e) => {
                if shared.running.load(Ordering::Acquire) {
                    shared.raise_exception(e.to_string());
                }
                break;
            }
        }
    }
}

fn parse_loop(shared: Arc<Shared>) {
    let mut events = Vec::new();
    while shared.running.load(Ordering::Acquire) {
        let chunks: Vec<Vec<u8>> = {
            let mut queue = shared.queue.lock();
            if queue.is_empty() || shared.paused.load(Ordering::Acquire) {
                shared.queue_ready.wait_for(&mut queue, shared.tick);
            }
            if shared.paused.load(Ordering::Acquire) {
                continue;
            }
            queue.drain(..).collect()
        };
        if chunks.is_empty() {
            continue;
        }
        {
            let mut decoder = shared.decoder.lock();
            for chunk in &chunks {
                tracing::trace!(bytes = %hex::encode(chunk), "rx");
                decoder.feed(chunk, &mut events);
            }
        }
        for event in events.drain(..) {
            shared.dispatch(event);
        }
    }
}

fn timeout_loop(shared: Arc<Shared>, shutdown: Receiver<()>) {
    loop {
        match shutdown.recv_timeout(shared.tick) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        let now = shared.clock.now();
        let mut state = shared.state.lock();
        let expired = state.current.as_ref().and_then(|txn| {
            let started = txn.started_at?;
            (now.saturating_duration_since(started) > txn.timeout)
                .then(|| (txn.timeout, txn.command.describe()))
        });
        if let Some((timeout, what)) = expired {
            tracing::debug!("{} timed out after {:?}", what, timeout);
            shared.finish_current(&mut state, Err(TransactionError::Timeout(timeout)));
        }
    }
}

/// Single-flight command channel over one transport.
pub struct MessageCenter {
    shared: Arc<Shared>,
    events: Receiver<MessageCenterEvent>,
    shutdown: Mutex<Option<Sender<()>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    info: TransportInfo,
}

impl MessageCenter {
    /// Take ownership of `transport` and start the three worker threads.
    pub fn start(
        transport: Box<dyn Transport>,
        format: WireFormat,
        options: MessageCenterOptions,
    ) -> Result<Self> {
        let info = transport.info();
        let (event_tx, event_rx) = bounded(EVENT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let shared = Arc::new(Shared {
            transport: Mutex::new(transport),
            decoder: Mutex::new(format.decoder()),
            format: Mutex::new(format),
            state: Mutex::new(State::default()),
            queue: Mutex::new(VecDeque::new()),
            queue_ready: Condvar::new(),
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            has_exception: AtomicBool::new(false),
            events: event_tx,
            dropped_events: AtomicU64::new(0),
            clock: options.clock,
            tick: options.tick,
            labels: options.labels,
        });

        let center = MessageCenter {
            shared: Arc::clone(&shared),
            events: event_rx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            threads: Mutex::new(Vec::new()),
            info,
        };
        let s = Arc::clone(&shared);
        center.spawn("rx", move || receive_loop(s))?;
        let s = Arc::clone(&shared);
        center.spawn("parse", move || parse_loop(s))?;
        center.spawn("timeout", move || timeout_loop(shared, shutdown_rx))?;
        tracing::debug!("message center started on {}", center.info);
        Ok(center)
    }

    fn spawn(&self, role: &str, f: impl FnOnce() + Send + 'static) -> Result<()> {
        let handle = thread::Builder::new()
            .name(format!("navlink-{role}"))
            .spawn(f)
            .map_err(DriverError::Spawn)?;
        self.threads.lock().push(handle);
        Ok(())
    }

    /// Queue a command and return a handle to its outcome.
    ///
    /// The command is written immediately when nothing is in flight.
    pub fn send_async(&self, command: Command, timeout: Duration) -> PendingResponse {
        let encoded = self.shared.format.lock().encode(&command);
        let wire = match encoded {
            Ok(wire) => wire,
            Err(e) => return PendingResponse::resolved(Err(e.into())),
        };
        let (tx, rx) = bounded(1);
        let mut state = self.shared.state.lock();
        if state.stopped {
            return PendingResponse::resolved(Err(TransactionError::Disconnected));
        }
        if state.failure.is_some() {
            return PendingResponse::resolved(Err(TransactionError::Disconnected));
        }
        state.pending.push_back(Transaction {
            command,
            wire,
            timeout,
            started_at: None,
            reply: tx,
        });
        if state.current.is_none() {
            self.shared.start_next(&mut state);
        }
        PendingResponse { rx }
    }

    /// Send a command and block until its reply, a NAK, or the deadline.
    pub fn send(&self, command: Command, timeout: Duration) -> Reply {
        self.send_async(command, timeout).wait()
    }

    /// Write a command that expects no reply, in order with other commands.
    pub fn post(&self, command: Command) -> std::result::Result<(), TransactionError> {
        self.send_async(command.expecting(ResponseMatcher::NoResponse), Duration::ZERO)
            .wait()
            .map(|_| ())
    }

    /// Stop decoding incoming bytes. The link stays open.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        tracing::debug!("message center paused");
    }

    /// Resume decoding, discarding anything received while paused.
    pub fn resume(&self) {
        self.shared.decoder.lock().clear();
        self.shared.queue.lock().clear();
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.queue_ready.notify_all();
        tracing::debug!("message center resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Run `f` with exclusive access to the transport.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut dyn Transport) -> R) -> R {
        let mut transport = self.shared.transport.lock();
        f(&mut **transport)
    }

    /// Switch the line rate, dropping bytes received at the old rate.
    pub fn set_baud_rate(&self, baud: u32) -> Result<()> {
        self.pause();
        let result = self.with_transport(|t| {
            t.set_baud_rate(baud)?;
            t.reset_buffer()
        });
        self.resume();
        result?;
        tracing::info!("{} switched to {} baud", self.info.name, baud);
        Ok(())
    }

    /// Address Ethernet commands to `mac` and ignore other sources.
    pub fn lock_device_mac(&self, mac: MacAddress) {
        if let WireFormat::Ethernet(config) = &mut *self.shared.format.lock() {
            config.device_mac = Some(mac);
        }
        if let Some(codec) = self.shared.decoder.lock().ethernet_mut() {
            codec.set_device_mac(mac);
        }
    }

    /// Receiver for unclaimed frames and link failures.
    pub fn events(&self) -> Receiver<MessageCenterEvent> {
        self.events.clone()
    }

    /// The transport as it was when the message center started.
    pub fn transport_info(&self) -> &TransportInfo {
        &self.info
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.shared.decoder.lock().stats()
    }

    /// Commands queued behind the in-flight one.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether a transport read failed.
    pub fn has_exception(&self) -> bool {
        self.shared.has_exception.load(Ordering::SeqCst)
    }

    /// Stop all threads and fail every queued transaction with
    /// [`TransactionError::Disconnected`]. Terminal.
    pub fn stop(&self) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        {
            let mut state = self.shared.state.lock();
            if !state.stopped {
                state.stopped = true;
                self.shared.fail_all(&mut state, TransactionError::Disconnected);
            }
        }
        self.shutdown.lock().take();
        self.shared.queue_ready.notify_all();
        let handles: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("message center thread panicked");
            }
        }
        if was_running {
            tracing::debug!("message center on {} stopped", self.info.name);
        }
    }
}

impl Drop for MessageCenter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use navlink_protocol::{encode_uart, GET_PARAM, GET_VERSION, NAK, PING};
    use navlink_transport::MockTransport;

    fn frame(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
        encode_uart(packet_type, payload).unwrap()
    }

    fn start(mock: &MockTransport, options: MessageCenterOptions) -> MessageCenter {
        MessageCenter::start(Box::new(mock.clone()), WireFormat::uart(), options).unwrap()
    }

    fn fast() -> MessageCenterOptions {
        MessageCenterOptions::new(Duration::from_millis(5))
    }

    fn wait_for_writes(mock: &MockTransport, count: usize) {
        for _ in 0..200 {
            if mock.writes().len() >= count {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("expected {count} writes, saw {}", mock.writes().len());
    }

    #[test]
    fn test_send_resolves_with_reply() {
        let mock = MockTransport::new("mock0");
        mock.set_responder(|data, _| {
            (data == frame(PING, &[]).as_slice()).then(|| frame(PING, b"OpenIMU300ZI SN:1"))
        });
        let center = start(&mock, fast());

        let reply = center.send(Command::packet(PING, vec![]), Duration::from_secs(1)).unwrap();
        match reply {
            Frame::Packet(p) => assert_eq!(p.payload_text(), "OpenIMU300ZI SN:1"),
            other => panic!("unexpected {other:?}"),
        }
        center.stop();
    }

    #[test]
    fn test_commands_written_one_at_a_time_in_order() {
        let mock = MockTransport::new("mock0");
        let center = start(&mock, fast());
        let timeout = Duration::from_secs(5);

        let first = center.send_async(Command::packet(PING, vec![]), timeout);
        let second = center.send_async(Command::packet(GET_VERSION, vec![]), timeout);
        let third = center.send_async(Command::packet(GET_PARAM, vec![7, 0, 0, 0]), timeout);

        wait_for_writes(&mock, 1);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(mock.writes().len(), 1);
        assert_eq!(center.pending_count(), 2);

        mock.inject_read(&frame(PING, b"pong"));
        wait_for_writes(&mock, 2);
        mock.inject_read(&frame(GET_VERSION, b"1.0"));
        wait_for_writes(&mock, 3);
        mock.inject_read(&frame(GET_PARAM, &[7, 0, 0, 0]));

        assert_eq!(
            mock.writes(),
            vec![
                frame(PING, &[]),
                frame(GET_VERSION, &[]),
                frame(GET_PARAM, &[7, 0, 0, 0]),
            ]
        );
        assert_eq!(first.wait().unwrap().packet_type(), Some(PING));
        assert_eq!(second.wait().unwrap().packet_type(), Some(GET_VERSION));
        assert_eq!(third.wait().unwrap().packet_type(), Some(GET_PARAM));
    }

    #[test]
    fn test_timeout_uses_clock_and_advances_queue() {
        let mock = MockTransport::new("mock0");
        let clock = Arc::new(ManualClock::new());
        let center = start(&mock, fast().with_clock(clock.clone()));

        let first = center.send_async(Command::packet(PING, vec![]), Duration::from_millis(500));
        let second = center.send_async(Command::packet(GET_VERSION, vec![]), Duration::from_millis(500));
        thread::sleep(Duration::from_millis(30));
        assert!(first.try_result().is_none());

        clock.advance(Duration::from_millis(501));
        assert_eq!(
            first.wait(),
            Err(TransactionError::Timeout(Duration::from_millis(500)))
        );
        wait_for_writes(&mock, 2);
        thread::sleep(Duration::from_millis(30));
        assert!(second.try_result().is_none());

        clock.advance(Duration::from_millis(501));
        assert!(matches!(second.wait(), Err(TransactionError::Timeout(_))));
    }

    #[test]
    fn test_unclaimed_frames_are_continuous() {
        let mock = MockTransport::new("mock0");
        let center = start(&mock, fast());
        let events = center.events();

        let pending = center.send_async(Command::packet(PING, vec![]), Duration::from_secs(2));
        wait_for_writes(&mock, 1);
        mock.inject_read(&frame(PacketType::new(*b"z1"), &[0u8; 8]));
        mock.inject_read(&frame(PING, b"OpenIMU"));

        match events.recv_timeout(Duration::from_secs(1)).unwrap() {
            MessageCenterEvent::Continuous(Frame::Packet(p)) => {
                assert_eq!(p.packet_type, PacketType::new(*b"z1"))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(pending.wait().unwrap().packet_type(), Some(PING));
    }

    #[test]
    fn test_nak_rejects_command() {
        let mock = MockTransport::new("mock0");
        mock.set_responder(|_, _| Some(frame(NAK, b"gP")));
        let center = start(&mock, fast());

        let reply = center.send(Command::packet(GET_PARAM, vec![1, 0, 0, 0]), Duration::from_secs(1));
        assert!(matches!(reply, Err(TransactionError::Nak(_))));
    }

    #[test]
    fn test_read_failure_disconnects_pending() {
        let mock = MockTransport::new("mock0");
        let center = start(&mock, fast());
        let events = center.events();
        let in_flight = center.send_async(Command::packet(PING, vec![]), Duration::from_secs(5));
        let queued = center.send_async(Command::packet(GET_PARAM, vec![1, 0, 0, 0]), Duration::from_secs(5));
        wait_for_writes(&mock, 1);

        mock.fail_reads("device unplugged");
        assert_eq!(in_flight.wait(), Err(TransactionError::Disconnected));
        assert_eq!(queued.wait(), Err(TransactionError::Disconnected));
        assert_eq!(
            events.recv_timeout(Duration::from_secs(1)).unwrap(),
            MessageCenterEvent::Exception("device unplugged".into())
        );
        assert!(center.has_exception());
        assert!(matches!(
            center.send(Command::packet(PING, vec![]), Duration::from_secs(1)),
            Err(TransactionError::Disconnected)
        ));
    }

    #[test]
    fn test_write_failure_fails_only_that_command() {
        let mock = MockTransport::new("mock0");
        mock.fail_writes("port busy");
        let center = start(&mock, fast());
        let reply = center.send(Command::packet(PING, vec![]), Duration::from_secs(1));
        assert_eq!(reply, Err(TransactionError::Transport("port busy".into())));
        assert!(center.is_running());
    }

    #[test]
    fn test_stop_fails_pending_and_later_sends() {
        let mock = MockTransport::new("mock0");
        let center = start(&mock, fast());
        let first = center.send_async(Command::packet(PING, vec![]), Duration::from_secs(5));
        let second = center.send_async(Command::packet(GET_VERSION, vec![]), Duration::from_secs(5));

        center.stop();
        assert_eq!(first.wait(), Err(TransactionError::Disconnected));
        assert_eq!(second.wait(), Err(TransactionError::Disconnected));
        assert_eq!(
            center.send(Command::packet(PING, vec![]), Duration::from_secs(1)),
            Err(TransactionError::Disconnected)
        );
        assert!(!center.is_running());
    }

    #[test]
    fn test_post_does_not_wait_for_reply() {
        let mock = MockTransport::new("mock0");
        let center = start(&mock, fast());
        center.post(Command::packet(PacketType::new(*b"JA"), vec![])).unwrap();
        assert_eq!(mock.writes().len(), 1);

        let reply = center.send_async(Command::packet(PING, vec![]), Duration::from_secs(1));
        wait_for_writes(&mock, 2);
        mock.inject_read(&frame(PING, b""));
        assert!(reply.wait().is_ok());
    }

    #[test]
    fn test_resume_discards_bytes_received_while_paused() {
        let mock = MockTransport::new("mock0");
        let center = start(&mock, fast());
        let events = center.events();

        center.pause();
        mock.inject_read(&frame(PacketType::new(*b"z1"), &[1, 2, 3]));
        thread::sleep(Duration::from_millis(40));
        assert!(events.try_recv().is_err());

        center.resume();
        thread::sleep(Duration::from_millis(20));
        assert!(events.try_recv().is_err());

        mock.inject_read(&frame(PacketType::new(*b"z1"), &[4, 5, 6]));
        match events.recv_timeout(Duration::from_secs(1)).unwrap() {
            MessageCenterEvent::Continuous(Frame::Packet(p)) => assert_eq!(p.payload, vec![4, 5, 6]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_set_baud_rate_reaches_transport() {
        let mock = MockTransport::new("mock0");
        let center = start(&mock, fast());
        center.set_baud_rate(57_600).unwrap();
        assert_eq!(mock.baud_rate(), 57_600);
        assert!(!center.is_paused());
    }
}
