//! Task outcomes: a value or the diagnostics explaining its absence.

use crate::error::TaskError;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The task could not produce its value
    Error,
    /// Non-fatal issue worth surfacing
    Warning,
    /// Informational note
    Info,
}

/// A diagnostic attached to an outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    /// How serious the problem is
    pub severity: Severity,

    /// Human-readable description
    pub message: String,

    /// Error that caused the problem, if any
    #[serde(
        serialize_with = "serialize_cause",
        skip_serializing_if = "Option::is_none"
    )]
    pub cause: Option<Arc<TaskError>>,
}

impl Problem {
    /// Create a problem without a cause.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            cause: None,
        }
    }

    /// Create an error-level problem.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a warning-level problem.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Create an info-level problem.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    /// Create an error-level problem carrying `error` as its cause.
    pub fn from_error(error: impl Into<TaskError>) -> Self {
        let error = error.into();
        Self {
            severity: Severity::Error,
            message: format!("{:#}", DisplayChain(&error)),
            cause: Some(Arc::new(error)),
        }
    }

    /// Whether the cause of this problem is a cancellation.
    pub fn is_canceled(&self) -> bool {
        self.cause.as_deref().is_some_and(TaskError::is_canceled)
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

// Renders anyhow context chains ("outer: inner") instead of only the outermost message.
struct DisplayChain<'a>(&'a TaskError);

impl std::fmt::Display for DisplayChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            TaskError::Failed(inner) => write!(f, "{:#}", inner),
            other => write!(f, "{}", other),
        }
    }
}

fn serialize_cause<S: Serializer>(
    cause: &Option<Arc<TaskError>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match cause {
        Some(error) => serializer.serialize_str(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Value-or-diagnostics result of a task.
///
/// A successful outcome holds a value and any number of non-fatal problems.
/// A failed outcome holds no value and at least one problem.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    value: Option<T>,
    problems: Vec<Problem>,
}

impl<T> Outcome<T> {
    /// Successful outcome with no diagnostics.
    pub fn success(value: T) -> Self {
        Self {
            value: Some(value),
            problems: Vec::new(),
        }
    }

    /// Failed outcome caused by `error`.
    pub fn failure(error: impl Into<TaskError>) -> Self {
        Self::from_problem(Problem::from_error(error))
    }

    /// Failed outcome described by a single problem.
    pub fn from_problem(problem: Problem) -> Self {
        Self {
            value: None,
            problems: vec![problem],
        }
    }

    /// Attach another diagnostic.
    pub fn with_problem(mut self, problem: Problem) -> Self {
        self.problems.push(problem);
        self
    }

    /// Borrow the value, if present.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Take the value, if present.
    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// All diagnostics in the order they were attached.
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Whether a value is present.
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    /// Whether the value is absent.
    pub fn is_failure(&self) -> bool {
        self.value.is_none()
    }

    /// Whether the value is absent because the task was canceled.
    pub fn is_canceled(&self) -> bool {
        self.is_failure() && self.problems.iter().any(Problem::is_canceled)
    }

    /// The first error recorded as a cause.
    pub fn cause(&self) -> Option<&TaskError> {
        self.problems.iter().find_map(|p| p.cause.as_deref())
    }

    /// Transform the value, keeping diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: self.value.map(f),
            problems: self.problems,
        }
    }

    /// Split into the value or the diagnostics explaining its absence.
    pub fn into_result(self) -> Result<T, Vec<Problem>> {
        self.value.ok_or(self.problems)
    }
}

impl<T> From<Result<T, TaskError>> for Outcome<T> {
    fn from(result: Result<T, TaskError>) -> Self {
        match result {
            Ok(value) => Outcome::success(value),
            Err(error) => Outcome::failure(error),
        }
    }
}
