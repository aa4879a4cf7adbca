use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical result for core and the crates layered on it.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by an [`ExecError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// A structural invariant of a phase plan or job node would be violated.
    /// Fatal to the compile step; never retried.
    #[error("plan construction error: {0}")]
    Construction(String),

    /// Statically detectable misuse, reported before any job is submitted.
    #[error("plan validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Stable numeric codes carried by [`ExecError`].
pub mod codes {
    /// A value in a bag could not be reduced (wrong type for the function).
    pub const BAD_VALUE_IN_BAG: u32 = 2103;
    /// Unexpected failure inside an aggregate function.
    pub const AGGREGATE_BUG: u32 = 2106;
    /// A row could not be assigned a reducer partition.
    pub const ROUTING_FAILED: u32 = 2107;
    /// A reduce task saw its key run out of order.
    pub const UNSORTED_INPUT: u32 = 2108;
    /// A task referenced an aggregate the registry does not know.
    pub const UNKNOWN_FUNCTION: u32 = 2109;
}

/// Who is to blame for an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSource {
    User,
    Input,
    Bug,
    Remote,
}

/// Execution-time failure while evaluating an aggregate or routing a row.
///
/// Aborts the owning task; the scheduling layer retries the task wholesale.
#[derive(Debug)]
pub struct ExecError {
    code: u32,
    source_kind: ErrorSource,
    message: String,
    cause: Option<BoxError>,
}

impl ExecError {
    pub fn new(code: u32, source_kind: ErrorSource, message: impl Into<String>) -> Self {
        Self {
            code,
            source_kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Wrap an arbitrary failure raised while `context` was running.
    ///
    /// A cause that already is an `ExecError` is returned unchanged; any other
    /// cause is wrapped with the generic bug code.
    pub fn classify(context: &str, cause: BoxError) -> Self {
        match cause.downcast::<ExecError>() {
            Ok(already) => *already,
            Err(other) => ExecError::new(
                codes::AGGREGATE_BUG,
                ErrorSource::Bug,
                format!("Error while computing {context}"),
            )
            .with_cause(other),
        }
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn source_kind(&self) -> ErrorSource {
        self.source_kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR {}: {}", self.code, self.message)
    }
}

impl StdError for ExecError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn StdError + 'static))
    }
}

/// Field access past the end of a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field {index} out of range for tuple of arity {arity}")]
pub struct TupleError {
    pub index: usize,
    pub arity: usize,
}
