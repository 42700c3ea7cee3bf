//! Monitor that tracks cancellation but no progress.

use crate::monitor::Monitor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use taskmon_core::Canceled;

/// Monitor for callers that do not observe progress.
///
/// Progress calls only check cancellation, aggregation queries return 0 and
/// sub-tasks are independent null monitors rather than tree nodes.
#[derive(Debug, Default)]
pub struct NullMonitor {
    canceled: AtomicBool,
    done: AtomicBool,
}

impl NullMonitor {
    /// Create a monitor that is neither canceled nor done.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Monitor for NullMonitor {
    fn set_total_work(&self, _total: u64) -> Result<(), Canceled> {
        self.check_cancel()
    }

    fn step_by(&self, _n: u64) -> Result<(), Canceled> {
        self.check_cancel()
    }

    fn uncertain_step_by(&self, _n: u64) -> Result<(), Canceled> {
        self.check_cancel()
    }

    fn sub_task(&self, _weight: u64) -> Arc<dyn Monitor> {
        Arc::new(NullMonitor {
            canceled: AtomicBool::new(self.is_canceled()),
            done: AtomicBool::new(self.is_done()),
        })
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn check_cancel(&self) -> Result<(), Canceled> {
        if self.is_canceled() {
            Err(Canceled)
        } else {
            Ok(())
        }
    }

    fn done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn work_done(&self) -> f64 {
        0.0
    }

    fn remaining_work(&self) -> f64 {
        0.0
    }

    fn total_work(&self) -> u64 {
        0
    }

    fn relative_work_done(&self) -> f64 {
        0.0
    }

    fn task_name(&self) -> String {
        String::new()
    }

    fn set_task_name(&self, _name: &str) {}
}
