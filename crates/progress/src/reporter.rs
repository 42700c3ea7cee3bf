//! Background progress reporting.
//!
//! A [`ProgressReporter`] owns a dedicated thread that calls an `update`
//! probe at a fixed interval until the probe returns `false` or the owner
//! calls [`ProgressReporter::finish`]. Whatever ends the loop, the probe is
//! called one last time so a final state is always reported.

use crate::monitor::Monitor;
use crate::probe::MonitorProbe;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use taskmon_core::panic_message;
use tracing::{debug, warn};

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Reporter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Time between two probe calls
    pub interval: Duration,

    /// Name of the reporter thread
    pub thread_name: String,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            thread_name: "progress-reporter".to_string(),
        }
    }
}

impl ReporterConfig {
    /// Set the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the reporter thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Errors from starting or stopping a reporter.
#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    /// The OS refused to create the reporter thread
    #[error("failed to spawn reporter thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The probe panicked and took the reporter thread down
    #[error("progress probe panicked: {0}")]
    ProbePanicked(String),
}

struct Shared {
    stop: Mutex<bool>,
    wake: Condvar,
    interval_nanos: AtomicU64,
}

impl Shared {
    fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos.load(Ordering::SeqCst))
    }

    fn set_interval(&self, interval: Duration) {
        let nanos = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
        self.interval_nanos.store(nanos, Ordering::SeqCst);
    }

    fn stop_flag(&self) -> MutexGuard<'_, bool> {
        self.stop.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, mut update: impl FnMut() -> bool) {
        let mut keep_going = update();
        while keep_going {
            let interval = self.interval();
            let stop = self.stop_flag();
            let (stop, _) = self
                .wake
                .wait_timeout_while(stop, interval, |stop| !*stop)
                .unwrap_or_else(PoisonError::into_inner);
            if *stop {
                break;
            }
            drop(stop);
            keep_going = update();
        }
        update();
    }
}

/// Handle to a running reporter thread.
///
/// The thread is not stopped on drop: a reporter that is never finished
/// keeps polling until its probe returns `false`.
#[must_use = "a reporter keeps polling until `finish` is called"]
pub struct ProgressReporter {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Start polling `update` on a new thread.
    pub fn start<F>(update: F, config: ReporterConfig) -> Result<Self, ReporterError>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let shared = Arc::new(Shared {
            stop: Mutex::new(false),
            wake: Condvar::new(),
            interval_nanos: AtomicU64::new(0),
        });
        shared.set_interval(config.interval);

        let handle = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn({
                let shared = Arc::clone(&shared);
                move || shared.run(update)
            })?;
        debug!(thread = %config.thread_name, interval = ?config.interval, "reporter started");

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Start a reporter that logs the progress of `monitor`.
    pub fn for_monitor(
        monitor: Arc<dyn Monitor>,
        config: ReporterConfig,
    ) -> Result<Self, ReporterError> {
        let mut probe = MonitorProbe::new(monitor);
        Self::start(move || probe.poll(), config)
    }

    /// Current polling interval.
    pub fn interval(&self) -> Duration {
        self.shared.interval()
    }

    /// Change the polling interval, starting with the next sleep.
    pub fn set_interval(&self, interval: Duration) {
        self.shared.set_interval(interval);
    }

    /// Whether the reporter thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the loop and wait for the reporter thread to exit.
    ///
    /// Interrupts a sleep in progress. When this returns, the final probe
    /// call has completed and no further calls will happen. Calling it again
    /// is a no-op.
    pub fn finish(&mut self) -> Result<(), ReporterError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        *self.shared.stop_flag() = true;
        self.shared.wake.notify_all();

        match handle.join() {
            Ok(()) => {
                debug!("reporter finished");
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%message, "progress probe panicked");
                Err(ReporterError::ProbePanicked(message))
            }
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("interval", &self.interval())
            .field("running", &self.is_running())
            .finish()
    }
}
