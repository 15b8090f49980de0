//! Bootloader workers: jump in, write blocks, jump back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use navlink_metrics::metric_defs;
use navlink_protocol::{BootloaderCommandSet, Command};

use super::{ProgressReporter, UpgradeWorker, WorkerGroup};
use crate::config::UpgradeConfig;
use crate::dialect::{DeviceDialect, DeviceProtocol};
use crate::error::{TransactionError, UpgradeError};
use crate::message_center::{MessageCenter, Reply};

/// Longest uninterrupted sleep while waiting for the device to settle.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// What an upgrade needs from the device link.
pub trait UpgradeLink: Send + Sync {
    /// Send a command and wait for its reply.
    fn transact(&self, command: Command, timeout: Duration) -> Reply;

    /// Send a command that gets no reply.
    fn post(&self, command: Command) -> Result<(), TransactionError>;

    fn set_baud_rate(&self, baud: u32) -> crate::error::Result<()>;

    /// Current line rate, `None` for links without one.
    fn baud_rate(&self) -> Option<u32>;
}

impl UpgradeLink for MessageCenter {
    fn transact(&self, command: Command, timeout: Duration) -> Reply {
        self.send(command, timeout)
    }

    fn post(&self, command: Command) -> Result<(), TransactionError> {
        MessageCenter::post(self, command)
    }

    fn set_baud_rate(&self, baud: u32) -> crate::error::Result<()> {
        MessageCenter::set_baud_rate(self, baud)
    }

    fn baud_rate(&self) -> Option<u32> {
        self.with_transport(|t| t.info().baud)
    }
}

/// Fails with `Stopped` once the worker is stopped or the run is cancelled.
fn check_stop(stop: &AtomicBool, progress: &ProgressReporter<'_>) -> Result<(), UpgradeError> {
    if stop.load(Ordering::SeqCst) || progress.cancelled() {
        Err(UpgradeError::Stopped)
    } else {
        Ok(())
    }
}

/// Sleep for `duration`, returning early with `Stopped`.
fn settle(
    stop: &AtomicBool,
    progress: &ProgressReporter<'_>,
    duration: Duration,
) -> Result<(), UpgradeError> {
    let deadline = Instant::now() + duration;
    loop {
        check_stop(stop, progress)?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

fn link_error(worker: &str, source: TransactionError) -> UpgradeError {
    UpgradeError::Transaction {
        worker: worker.to_string(),
        source,
    }
}

/// Puts the device into bootloader mode.
pub struct JumpBootloaderWorker {
    name: String,
    group: WorkerGroup,
    link: Arc<dyn UpgradeLink>,
    commands: BootloaderCommandSet,
    selector: Vec<u8>,
    reply_timeout: Duration,
    settle: Duration,
    bootloader_baud: Option<u32>,
    stop: Arc<AtomicBool>,
}

impl JumpBootloaderWorker {
    pub fn new(
        name: impl Into<String>,
        link: Arc<dyn UpgradeLink>,
        commands: BootloaderCommandSet,
        config: &UpgradeConfig,
    ) -> Self {
        JumpBootloaderWorker {
            name: name.into(),
            group: WorkerGroup::None,
            link,
            commands,
            selector: Vec::new(),
            reply_timeout: config.block_timeout(),
            settle: config.bootloader_settle(),
            bootloader_baud: config.bootloader_baud,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Core selector sent with the jump (empty for single-core devices).
    #[must_use]
    pub fn with_selector(mut self, selector: &[u8]) -> Self {
        self.selector = selector.to_vec();
        self
    }

    #[must_use]
    pub fn in_group(mut self, group: WorkerGroup) -> Self {
        self.group = group;
        self
    }
}

impl UpgradeWorker for JumpBootloaderWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> &WorkerGroup {
        &self.group
    }

    fn content_size(&self) -> usize {
        0
    }

    fn work(&mut self, progress: &ProgressReporter<'_>) -> Result<(), UpgradeError> {
        check_stop(&self.stop, progress)?;
        let command = self.commands.jump_bootloader(&self.selector);
        self.link
            .transact(command, self.reply_timeout)
            .map_err(|e| link_error(&self.name, e))?;
        tracing::info!("{}: device entering bootloader", self.name);
        settle(&self.stop, progress, self.settle)?;
        if let Some(baud) = self.bootloader_baud {
            self.link
                .set_baud_rate(baud)
                .map_err(|e| UpgradeError::worker(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

/// Writes an image as addressed blocks.
pub struct FirmwareWriteWorker {
    name: String,
    group: WorkerGroup,
    link: Arc<dyn UpgradeLink>,
    commands: BootloaderCommandSet,
    data: Vec<u8>,
    block_size: usize,
    retries: u32,
    block_timeout: Duration,
    first_block_delay: Duration,
    stop: Arc<AtomicBool>,
}

impl FirmwareWriteWorker {
    pub fn new(
        name: impl Into<String>,
        link: Arc<dyn UpgradeLink>,
        commands: BootloaderCommandSet,
        data: Vec<u8>,
        config: &UpgradeConfig,
    ) -> Self {
        FirmwareWriteWorker {
            name: name.into(),
            group: WorkerGroup::None,
            link,
            commands,
            data,
            block_size: config.block_size,
            retries: config.retries,
            block_timeout: config.block_timeout(),
            first_block_delay: config.first_block_delay(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn in_group(mut self, group: WorkerGroup) -> Self {
        self.group = group;
        self
    }

    /// Data bytes per write command.
    pub fn block_len(&self) -> usize {
        self.block_size.min(self.commands.max_block_data()).max(1)
    }

    fn write_block(
        &self,
        address: usize,
        chunk: &[u8],
        progress: &ProgressReporter<'_>,
    ) -> Result<(), UpgradeError> {
        let address = u32::try_from(address)
            .map_err(|_| UpgradeError::Image(format!("image exceeds 4 GiB at {address}")))?;
        let command = self
            .commands
            .write_block(address, chunk)
            .map_err(|e| UpgradeError::worker(&self.name, e.to_string()))?;
        // The bootloader erases flash before acknowledging the first block.
        let timeout = if address == 0 {
            self.block_timeout + self.first_block_delay
        } else {
            self.block_timeout
        };

        let mut attempt = 0;
        loop {
            match self.link.transact(command.clone(), timeout) {
                Ok(_) => return Ok(()),
                Err(TransactionError::Timeout(_)) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{}: no ack for block at {:#x}, resending ({}/{})",
                        self.name,
                        address,
                        attempt,
                        self.retries
                    );
                    check_stop(&self.stop, progress)?;
                }
                Err(e) => return Err(link_error(&self.name, e)),
            }
        }
    }
}

impl UpgradeWorker for FirmwareWriteWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> &WorkerGroup {
        &self.group
    }

    fn content_size(&self) -> usize {
        self.data.len()
    }

    fn work(&mut self, progress: &ProgressReporter<'_>) -> Result<(), UpgradeError> {
        let total = self.data.len();
        let block_len = self.block_len();
        let labels = vec![("worker", self.name.clone())];
        tracing::info!(
            "{}: writing {} bytes in {} blocks",
            self.name,
            total,
            total.div_ceil(block_len)
        );

        let mut written = 0;
        for chunk in self.data.chunks(block_len) {
            check_stop(&self.stop, progress)?;
            self.write_block(written, chunk, progress)?;
            written += chunk.len();
            metrics::counter!(metric_defs::UPGRADE_BYTES_WRITTEN.name, &labels)
                .increment(chunk.len() as u64);
            progress.report(written, total);
        }
        Ok(())
    }

    fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

/// Returns the device to its application and, optionally, confirms it
/// answers identity requests again.
pub struct JumpApplicationWorker {
    name: String,
    group: WorkerGroup,
    link: Arc<dyn UpgradeLink>,
    commands: BootloaderCommandSet,
    settle: Duration,
    ping_timeout: Duration,
    ping_attempts: u32,
    confirm: Option<DeviceDialect>,
    application_baud: Option<u32>,
    stop: Arc<AtomicBool>,
}

impl JumpApplicationWorker {
    pub fn new(
        name: impl Into<String>,
        link: Arc<dyn UpgradeLink>,
        commands: BootloaderCommandSet,
        config: &UpgradeConfig,
    ) -> Self {
        // Captured now: the bootloader may run at another rate by the time we jump back.
        let application_baud = config.bootloader_baud.and_then(|_| link.baud_rate());
        JumpApplicationWorker {
            name: name.into(),
            group: WorkerGroup::None,
            link,
            commands,
            settle: config.application_settle(),
            ping_timeout: config.block_timeout(),
            ping_attempts: config.ping_attempts.max(1),
            confirm: None,
            application_baud,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn in_group(mut self, group: WorkerGroup) -> Self {
        self.group = group;
        self
    }

    /// Re-run the identity request of `dialect` after the jump.
    #[must_use]
    pub fn confirming(mut self, dialect: DeviceDialect) -> Self {
        self.confirm = Some(dialect);
        self
    }

    fn confirm_application(
        &self,
        dialect: DeviceDialect,
        progress: &ProgressReporter<'_>,
    ) -> Result<(), UpgradeError> {
        let mut last = String::from("no reply");
        for attempt in 1..=self.ping_attempts {
            check_stop(&self.stop, progress)?;
            match self.link.transact(dialect.ping_command(), self.ping_timeout) {
                Ok(frame) => match dialect.ping(&frame) {
                    Some(info) => {
                        tracing::info!("{}: application running: {}", self.name, info);
                        return Ok(());
                    }
                    None => last = format!("unrecognised identity '{}'", frame.text()),
                },
                Err(e) => last = e.to_string(),
            }
            tracing::debug!("{}: ping {}/{} failed: {}", self.name, attempt, self.ping_attempts, last);
        }
        Err(UpgradeError::worker(
            &self.name,
            format!("device did not come back: {last}"),
        ))
    }
}

impl UpgradeWorker for JumpApplicationWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> &WorkerGroup {
        &self.group
    }

    fn content_size(&self) -> usize {
        0
    }

    fn work(&mut self, progress: &ProgressReporter<'_>) -> Result<(), UpgradeError> {
        check_stop(&self.stop, progress)?;
        self.link
            .post(self.commands.jump_application(&[]))
            .map_err(|e| link_error(&self.name, e))?;
        tracing::info!("{}: device restarting into application", self.name);
        settle(&self.stop, progress, self.settle)?;
        if let Some(baud) = self.application_baud {
            self.link
                .set_baud_rate(baud)
                .map_err(|e| UpgradeError::worker(&self.name, e.to_string()))?;
        }
        match self.confirm {
            Some(dialect) => self.confirm_application(dialect, progress),
            None => Ok(()),
        }
    }

    fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}
