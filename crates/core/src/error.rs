//! Error types shared by monitors and the task executor.

/// Signal returned when a cancellation check observes a canceled monitor.
///
/// This is control flow, not a failure of the task: it is returned by
/// `check_cancel` and every progress-recording call, and task bodies are
/// expected to propagate it with `?`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, thiserror::Error)]
#[error("operation was canceled")]
pub struct Canceled;

/// Errors a task body can end with.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task observed a cancellation request and unwound.
    #[error(transparent)]
    Canceled(#[from] Canceled),

    /// Domain failure raised by the task body
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// The task body panicked
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Build a domain failure from a message.
    pub fn failed(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Failed(anyhow::Error::msg(message))
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Canceled(_))
    }

    /// Whether this error came from a panic in the task body.
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Result type for task bodies.
pub type TaskResult<T> = std::result::Result<T, TaskError>;
