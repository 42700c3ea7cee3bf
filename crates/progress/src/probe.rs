//! Reporter probe bound to a monitor.

use crate::monitor::Monitor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One progress report emitted by a [`MonitorProbe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressLine {
    /// Task label
    pub task_name: String,

    /// Relative work done as a percentage
    pub percentage: f64,

    /// Aggregated work done
    pub work_done: f64,

    /// Declared total work
    pub total_work: u64,

    /// Own cancellation flag of the monitor
    pub canceled: bool,

    /// Whether the monitor was finished
    pub done: bool,
}

impl ProgressLine {
    /// Read the current progress of `monitor`.
    pub fn read(monitor: &dyn Monitor) -> Self {
        Self {
            task_name: monitor.task_name(),
            percentage: monitor.relative_work_done() * 100.0,
            work_done: monitor.work_done(),
            total_work: monitor.total_work(),
            canceled: monitor.is_canceled(),
            done: monitor.is_done(),
        }
    }
}

impl std::fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = if self.task_name.is_empty() {
            "task"
        } else {
            self.task_name.as_str()
        };
        write!(
            f,
            "{}: {:.1}% ({:.1}/{})",
            name, self.percentage, self.work_done, self.total_work
        )?;
        if self.canceled {
            write!(f, " [canceled]")?;
        }
        if self.done {
            write!(f, " [done]")?;
        }
        Ok(())
    }
}

type Sink = Box<dyn FnMut(&ProgressLine) + Send>;

/// Probe that reports a monitor's progress and keeps polling while it runs.
pub struct MonitorProbe {
    monitor: Arc<dyn Monitor>,
    sink: Sink,
}

impl MonitorProbe {
    /// Probe that logs each report at `info` level.
    pub fn new(monitor: Arc<dyn Monitor>) -> Self {
        Self::with_sink(monitor, |line: &ProgressLine| {
            info!(
                target: "taskmon::progress",
                task = %line.task_name,
                percent = line.percentage,
                "{}",
                line
            );
        })
    }

    /// Probe that hands each report to `sink`.
    pub fn with_sink(
        monitor: Arc<dyn Monitor>,
        sink: impl FnMut(&ProgressLine) + Send + 'static,
    ) -> Self {
        Self {
            monitor,
            sink: Box::new(sink),
        }
    }

    /// Emit the current progress; `true` while the monitor is neither
    /// canceled nor done.
    pub fn poll(&mut self) -> bool {
        let line = ProgressLine::read(self.monitor.as_ref());
        let keep_going = !line.canceled && !line.done;
        (self.sink)(&line);
        keep_going
    }

    /// Turn the probe into an update function for a reporter.
    pub fn into_update(mut self) -> impl FnMut() -> bool + Send + 'static {
        move || self.poll()
    }
}

impl std::fmt::Debug for MonitorProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorProbe")
            .field("task_name", &self.monitor.task_name())
            .finish_non_exhaustive()
    }
}
