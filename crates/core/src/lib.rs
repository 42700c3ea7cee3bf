//! TaskMon core data models.
//!
//! This crate defines the identifiers, error types and outcome container
//! shared by the progress monitors and the task executor.

#![warn(missing_docs)]

// Core identities
mod id;

// Errors and outcomes
mod error;
mod outcome;

// Re-exports
pub use id::*;

pub use error::{panic_message, Canceled, TaskError, TaskResult};
pub use outcome::{Outcome, Problem, Severity};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
