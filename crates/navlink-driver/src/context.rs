//! Explicit application context.
//!
//! Built once at startup and handed by reference to discovery, sessions and
//! upgrades. There are no process-wide singletons.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::DriverConfig;
use crate::persist::LastConnectionStore;

/// Configuration, persisted state and the shared cancellation flag.
#[derive(Clone)]
pub struct AppContext {
    pub config: DriverConfig,
    pub last_connection: LastConnectionStore,
    cancel: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(config: DriverConfig) -> Self {
        let last_connection = LastConnectionStore::new(config.last_connection_path.clone());
        AppContext {
            config,
            last_connection,
            cancel: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for transaction deadlines.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Handle for signal handlers and worker threads.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Ask long-running operations to stop at their next check.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn reset_cancel(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("last_connection", &self.last_connection)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
