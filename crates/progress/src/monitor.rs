//! The monitor capability shared by tree nodes and the null monitor.

use std::sync::Arc;
use taskmon_core::Canceled;

/// Progress and cancellation handle passed to a running task.
///
/// Every progress-recording call doubles as a cancellation check, so a task
/// that steps regularly and propagates the error with `?` unwinds promptly
/// once a cancellation is requested.
pub trait Monitor: Send + Sync {
    /// Declare the expected number of work units.
    ///
    /// Fails fast if cancellation was already requested. The total never
    /// shrinks; a value below the current total is ignored.
    fn set_total_work(&self, total: u64) -> Result<(), Canceled>;

    /// Record `n` units of progress toward a known total.
    fn step_by(&self, n: u64) -> Result<(), Canceled>;

    /// Record one unit of progress toward a known total.
    fn step(&self) -> Result<(), Canceled> {
        self.step_by(1)
    }

    /// Record `n` units of progress and grow the total by the same amount.
    ///
    /// For work whose size is discovered as it is consumed. Relative
    /// progress stays at 1.0; only [`Monitor::done`] signals finality.
    fn uncertain_step_by(&self, n: u64) -> Result<(), Canceled>;

    /// Uncertain step of one unit.
    fn uncertain_step(&self) -> Result<(), Canceled> {
        self.uncertain_step_by(1)
    }

    /// Create a sub-task worth `weight` of this monitor's work units.
    fn sub_task(&self, weight: u64) -> Arc<dyn Monitor>;

    /// Request cancellation of this monitor and, through
    /// [`Monitor::check_cancel`], of its descendants.
    fn cancel(&self);

    /// This monitor's own cancellation flag.
    fn is_canceled(&self) -> bool;

    /// Fail if this monitor or any ancestor has been canceled.
    fn check_cancel(&self) -> Result<(), Canceled>;

    /// Mark the work as finished, raising the own work counter to the total.
    fn done(&self);

    /// Whether [`Monitor::done`] has been called.
    fn is_done(&self) -> bool;

    /// Work done in this monitor's units, including weighted sub-task progress.
    fn work_done(&self) -> f64;

    /// Declared total minus work done. Negative when a task over-steps.
    fn remaining_work(&self) -> f64 {
        self.total_work() as f64 - self.work_done()
    }

    /// Declared total work.
    fn total_work(&self) -> u64;

    /// Fraction of the total done, 0 when the total is unknown.
    fn relative_work_done(&self) -> f64;

    /// Advisory label of the current task.
    fn task_name(&self) -> String;

    /// Replace the task label.
    fn set_task_name(&self, name: &str);
}

impl<M: Monitor + ?Sized> Monitor for Arc<M> {
    fn set_total_work(&self, total: u64) -> Result<(), Canceled> {
        (**self).set_total_work(total)
    }

    fn step_by(&self, n: u64) -> Result<(), Canceled> {
        (**self).step_by(n)
    }

    fn uncertain_step_by(&self, n: u64) -> Result<(), Canceled> {
        (**self).uncertain_step_by(n)
    }

    fn sub_task(&self, weight: u64) -> Arc<dyn Monitor> {
        (**self).sub_task(weight)
    }

    fn cancel(&self) {
        (**self).cancel()
    }

    fn is_canceled(&self) -> bool {
        (**self).is_canceled()
    }

    fn check_cancel(&self) -> Result<(), Canceled> {
        (**self).check_cancel()
    }

    fn done(&self) {
        (**self).done()
    }

    fn is_done(&self) -> bool {
        (**self).is_done()
    }

    fn work_done(&self) -> f64 {
        (**self).work_done()
    }

    fn remaining_work(&self) -> f64 {
        (**self).remaining_work()
    }

    fn total_work(&self) -> u64 {
        (**self).total_work()
    }

    fn relative_work_done(&self) -> f64 {
        (**self).relative_work_done()
    }

    fn task_name(&self) -> String {
        (**self).task_name()
    }

    fn set_task_name(&self, name: &str) {
        (**self).set_task_name(name)
    }
}
