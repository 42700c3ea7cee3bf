//! Task Execution
//!
//! Runs cancellable, monitored units of work and delivers their results as
//! outcomes.

#![warn(missing_docs)]

pub mod executor;

pub use executor::{ExecutorConfig, SpawnedTask, TaskExecutor};
