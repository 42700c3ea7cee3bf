//! Progress Monitoring
//!
//! Hierarchical, weighted progress monitors with cooperative cancellation,
//! and a background reporter that polls them.

#![warn(missing_docs)]

pub mod monitor;
pub mod node;
pub mod null;
pub mod probe;
pub mod reporter;
pub mod snapshot;

pub use monitor::Monitor;
pub use node::MonitorNode;
pub use null::NullMonitor;
pub use probe::{MonitorProbe, ProgressLine};
pub use reporter::{ProgressReporter, ReporterConfig, ReporterError, DEFAULT_INTERVAL};
pub use snapshot::ProgressSnapshot;
