//! Firmware upgrade orchestration.
//!
//! An upgrade is a list of [`UpgradeWorker`]s registered with an
//! [`UpgradeCenter`]. Workers are partitioned by [`WorkerGroup`]:
//!
//! 1. `BeforeAll` workers run one after another on the calling thread
//! 2. every `Named` group runs on its own thread in registration order, and
//!    every ungrouped worker gets a thread of its own
//! 3. `AfterAll` workers run one after another once all lanes finished
//!
//! The first failing worker stops every other worker; its error is the one
//! returned.

pub mod firmware;
pub mod workers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::error::UpgradeError;

pub use firmware::{FirmwareImage, SectionKind};
pub use workers::{
    FirmwareWriteWorker, JumpApplicationWorker, JumpBootloaderWorker, UpgradeLink,
};

/// Execution group of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum WorkerGroup {
    /// Runs alone, in parallel with everything else in the middle phase.
    #[default]
    None,
    /// Runs before any other worker starts.
    BeforeAll,
    /// Runs after every other worker has finished.
    AfterAll,
    /// Runs sequentially with the other members of the group.
    Named(String),
}

impl WorkerGroup {
    pub fn named(name: impl Into<String>) -> Self {
        WorkerGroup::Named(name.into())
    }
}

/// Notifications emitted while an upgrade runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeEvent {
    /// Aggregate progress over every worker.
    Progress { current: usize, total: usize },
    WorkerProgress {
        worker: String,
        current: usize,
        total: usize,
    },
    WorkerFinished { worker: String },
    /// The first failure; the upgrade is being stopped.
    Error { worker: String, message: String },
    /// Every worker completed.
    Finished,
}

type Listener = Box<dyn Fn(&UpgradeEvent) + Send + Sync>;

/// One step of an upgrade.
pub trait UpgradeWorker: Send {
    fn name(&self) -> &str;

    fn group(&self) -> &WorkerGroup;

    /// Bytes this worker transfers; zero for control steps.
    fn content_size(&self) -> usize;

    /// Run to completion, reporting progress as it goes.
    fn work(&mut self, progress: &ProgressReporter<'_>) -> Result<(), UpgradeError>;

    /// Cooperative abort flag, checked between steps.
    fn stop_flag(&self) -> Arc<AtomicBool>;

    fn stop(&self) {
        self.stop_flag().store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stop_flag().load(Ordering::SeqCst)
    }
}

/// State shared by every lane of one run.
struct RunState {
    listeners: Vec<Listener>,
    stops: Vec<Arc<AtomicBool>>,
    cancel: Option<Arc<AtomicBool>>,
    progress: Mutex<Vec<usize>>,
    total: usize,
    first_error: Mutex<Option<UpgradeError>>,
}

impl RunState {
    fn emit(&self, event: UpgradeEvent) {
        for listener in self.listeners.iter() {
            listener(&event);
        }
    }

    fn stop_all(&self) {
        for flag in &self.stops {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::SeqCst))
    }

    fn failed(&self) -> bool {
        self.first_error.lock().is_some()
    }

    fn fail(&self, worker: &str, error: UpgradeError) {
        {
            let mut first = self.first_error.lock();
            if first.is_some() {
                tracing::debug!("{} also failed: {}", worker, error);
                return;
            }
            *first = Some(error.clone());
        }
        tracing::error!("upgrade worker {} failed: {}", worker, error);
        self.stop_all();
        self.emit(UpgradeEvent::Error {
            worker: worker.to_string(),
            message: error.to_string(),
        });
    }
}

/// Progress sink handed to [`UpgradeWorker::work`].
pub struct ProgressReporter<'a> {
    index: usize,
    worker: &'a str,
    run: &'a RunState,
}

impl ProgressReporter<'_> {
    /// True once the run's cancel flag is set. Stops every worker.
    pub fn cancelled(&self) -> bool {
        if self.run.cancelled() {
            self.run.stop_all();
            return true;
        }
        false
    }

    /// Record that `current` of this worker's `total` bytes are done.
    pub fn report(&self, current: usize, total: usize) {
        self.cancelled();
        let aggregate = {
            let mut progress = self.run.progress.lock();
            if let Some(slot) = progress.get_mut(self.index) {
                *slot = current;
            }
            progress.iter().sum()
        };
        self.run.emit(UpgradeEvent::WorkerProgress {
            worker: self.worker.to_string(),
            current,
            total,
        });
        self.run.emit(UpgradeEvent::Progress {
            current: aggregate,
            total: self.run.total,
        });
    }
}

/// Registered workers with their run index.
type Lane = Vec<(usize, Box<dyn UpgradeWorker>)>;

/// Runs a set of workers with before/parallel/after phasing.
#[derive(Default)]
pub struct UpgradeCenter {
    workers: Vec<Box<dyn UpgradeWorker>>,
    listeners: Vec<Listener>,
    cancel: Option<Arc<AtomicBool>>,
}

impl UpgradeCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort between steps once `flag` is set.
    #[must_use]
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn register(&mut self, worker: Box<dyn UpgradeWorker>) {
        tracing::debug!(
            "registered upgrade worker {} ({:?}, {} bytes)",
            worker.name(),
            worker.group(),
            worker.content_size()
        );
        self.workers.push(worker);
    }

    pub fn on_event(&mut self, listener: impl Fn(&UpgradeEvent) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Total bytes across every registered worker.
    pub fn total_size(&self) -> usize {
        self.workers.iter().map(|w| w.content_size()).sum()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Run every registered worker. Consumes the registrations.
    pub fn run(&mut self) -> Result<(), UpgradeError> {
        let workers = std::mem::take(&mut self.workers);
        let run = RunState {
            listeners: std::mem::take(&mut self.listeners),
            stops: workers.iter().map(|w| w.stop_flag()).collect(),
            cancel: self.cancel.clone(),
            progress: Mutex::new(vec![0; workers.len()]),
            total: workers.iter().map(|w| w.content_size()).sum(),
            first_error: Mutex::new(None),
        };
        let (before, lanes, after) = partition(workers);
        tracing::info!(
            "upgrade: {} before-all, {} parallel lanes, {} after-all, {} bytes",
            before.len(),
            lanes.len(),
            after.len(),
            run.total
        );

        run_lane(&run, before);
        if !run.failed() {
            thread::scope(|scope| {
                let mut handles = Vec::with_capacity(lanes.len());
                for (n, lane) in lanes.into_iter().enumerate() {
                    let run = &run;
                    let spawned = thread::Builder::new()
                        .name(format!("navlink-upgrade-{n}"))
                        .spawn_scoped(scope, move || run_lane(run, lane));
                    match spawned {
                        Ok(handle) => handles.push(handle),
                        Err(e) => run.fail(
                            "upgrade",
                            UpgradeError::worker("upgrade", format!("cannot spawn lane: {e}")),
                        ),
                    }
                }
                for handle in handles {
                    if handle.join().is_err() {
                        run.fail("upgrade", UpgradeError::Stopped);
                    }
                }
            });
        }
        if !run.failed() {
            run_lane(&run, after);
        }

        let outcome = match run.first_error.lock().take() {
            Some(error) => Err(error),
            None => {
                tracing::info!("upgrade finished");
                run.emit(UpgradeEvent::Finished);
                Ok(())
            }
        };
        self.listeners = run.listeners;
        outcome
    }
}

/// Split into before-all, middle lanes (one per named group or ungrouped
/// worker, first-seen order), and after-all.
fn partition(workers: Vec<Box<dyn UpgradeWorker>>) -> (Lane, Vec<Lane>, Lane) {
    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut lanes: Vec<(Option<String>, Lane)> = Vec::new();
    for (index, worker) in workers.into_iter().enumerate() {
        match worker.group().clone() {
            WorkerGroup::BeforeAll => before.push((index, worker)),
            WorkerGroup::AfterAll => after.push((index, worker)),
            WorkerGroup::None => lanes.push((None, vec![(index, worker)])),
            WorkerGroup::Named(name) => {
                match lanes.iter_mut().find(|(key, _)| key.as_deref() == Some(&name)) {
                    Some((_, lane)) => lane.push((index, worker)),
                    None => lanes.push((Some(name), vec![(index, worker)])),
                }
            }
        }
    }
    (before, lanes.into_iter().map(|(_, lane)| lane).collect(), after)
}

fn run_lane(run: &RunState, lane: Lane) {
    for (index, mut worker) in lane {
        if run.failed() {
            return;
        }
        if run.cancelled() || worker.is_stopped() {
            run.fail(worker.name(), UpgradeError::Stopped);
            return;
        }
        let name = worker.name().to_string();
        tracing::info!("upgrade worker {} started", name);
        let reporter = ProgressReporter {
            index,
            worker: &name,
            run,
        };
        match worker.work(&reporter) {
            Ok(()) => {
                tracing::info!("upgrade worker {} finished", name);
                run.emit(UpgradeEvent::WorkerFinished { worker: name });
            }
            Err(e) => {
                run.fail(&name, e);
                return;
            }
        }
    }
}
