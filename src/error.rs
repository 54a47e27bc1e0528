//! Error types for pipeline execution.
//!
//! Three layers live here:
//!
//! - [`ServiceError`]: what an external collaborator reports.
//! - [`StepFailure`]: the classified, recoverable failure a step hands back to
//!   the supervisor. [`ServiceError::classify`] is the only way to get from the
//!   first to the second.
//! - [`Error`]: crate-level errors (configuration, write-once violations).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::state::Field;

/// The main error type for crate operations that are not step outcomes.
#[derive(Error, Debug)]
pub enum Error {
    /// A write-once state field was written a second time.
    #[error("Field '{0}' has already been set")]
    FieldAlreadySet(Field),

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Taxonomy of recoverable step failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, rate limit, 5xx or anything unexpected. Retryable.
    #[error("transient service error")]
    TransientService,
    /// Bad input, 4xx or auth failure. Fixable only by the caller.
    #[error("client input error")]
    ClientInput,
    /// The per-request budget ceiling was exceeded.
    #[error("budget exceeded")]
    BudgetExceeded,
    /// A step the answer cannot do without failed.
    #[error("critical step failure")]
    CriticalStepFailure,
}

/// A classified failure returned by a step instead of an updated state.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StepFailure {
    /// Which bucket of the taxonomy this failure belongs to.
    pub kind: FailureKind,
    /// Human-readable detail. Kept for logs and traces, never shown to users.
    pub message: String,
    /// Whether the supervisor may retry the step.
    pub retryable: bool,
}

impl StepFailure {
    /// Create a failure of the given kind; only transient failures are retryable.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind == FailureKind::TransientService,
        }
    }

    /// A retryable transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientService, message)
    }

    /// A non-retryable client input failure.
    pub fn client_input(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ClientInput, message)
    }

    /// A budget ceiling failure.
    pub fn budget_exceeded(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BudgetExceeded, message)
    }

    /// A failure that halts the pipeline.
    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(FailureKind::CriticalStepFailure, message)
    }
}

impl From<Error> for StepFailure {
    fn from(err: Error) -> Self {
        StepFailure::critical(err.to_string())
    }
}

/// Errors reported by external service clients.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The call did not complete within its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider throttled the caller.
    #[error("rate limited by provider")]
    RateLimited,

    /// The provider answered with a non-success HTTP status.
    #[error("provider returned status {code}: {message}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response detail.
        message: String,
    },

    /// Missing or rejected credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request itself was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The provider could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Anything the client could not put in another bucket.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ServiceError {
    /// Returns true for conditions that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Timeout(_)
            | ServiceError::RateLimited
            | ServiceError::Unavailable(_)
            | ServiceError::Unexpected(_) => true,
            ServiceError::Status { code, .. } => *code >= 500 || *code == 408 || *code == 429,
            ServiceError::Unauthorized(_) | ServiceError::InvalidInput(_) => false,
        }
    }

    /// Map this error onto the step failure taxonomy.
    pub fn classify(&self) -> StepFailure {
        if self.is_transient() {
            StepFailure::transient(self.to_string())
        } else {
            StepFailure::client_input(self.to_string())
        }
    }
}

impl From<ServiceError> for StepFailure {
    fn from(err: ServiceError) -> Self {
        err.classify()
    }
}
