use std::{any::Any, error::Error, sync::Arc};

use thiserror::Error;

/// Error value carried by the `error` notification.
///
/// Errors are reference counted so a single failure can be multicast to every
/// subscriber of a `Subject` without cloning the underlying error.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Errors raised by `rxhub` itself while running producers and operators.
#[derive(Debug, Error)]
pub enum ObservableError {
    /// A producer, an operator closure or a scheduled callback panicked. The
    /// panic was caught and turned into an `error` notification.
    #[error("{operator} panicked: {message}")]
    Panicked {
        operator: &'static str,
        message: String,
    },

    /// Free-form error, handy for `throw_error` and tests.
    #[error("{0}")]
    Message(String),
}

impl ObservableError {
    /// Builds a `Panicked` error from a payload returned by
    /// `std::panic::catch_unwind`.
    pub fn from_panic(operator: &'static str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        ObservableError::Panicked { operator, message }
    }

    /// Wraps `self` into the shared form expected by `Observer::error`.
    pub fn shared(self) -> SharedError {
        Arc::new(self)
    }
}

/// Errors returned when constructing a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `TokioScheduler::current` was called outside of a Tokio runtime.
    #[error("no Tokio runtime is running on this thread")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
