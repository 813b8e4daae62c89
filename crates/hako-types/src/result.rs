//! ExecResult — the structured outcome of every evaluation.
//!
//! Evaluation failures never cross the sandbox boundary as panics or error
//! returns; they travel as `ExecResult::Failure` data.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Value;

/// Why an evaluation failed.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ExecError {
    /// The fragment could not be translated. Carries the joined diagnostics.
    #[error("compile error: {0}")]
    Compile(String),
    /// The fragment raised during execution.
    #[error("runtime fault: {0}")]
    Runtime(String),
    /// The execution was aborted via its cancellation signal.
    #[error("cancelled")]
    Cancelled,
}

/// The outcome of evaluating one fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecResult {
    /// The fragment evaluated successfully, possibly yielding a value.
    Success {
        /// The fragment's trailing expression value, if it had one.
        value: Option<Value>,
    },
    /// The fragment failed to compile or run.
    Failure {
        /// What went wrong.
        error: ExecError,
    },
}

impl ExecResult {
    /// A successful result carrying a value.
    pub fn success(value: impl Into<Value>) -> Self {
        ExecResult::Success {
            value: Some(value.into()),
        }
    }

    /// A successful result with no return value (e.g. a bare assignment).
    pub fn unit() -> Self {
        ExecResult::Success { value: None }
    }

    /// A failed result.
    pub fn failure(error: ExecError) -> Self {
        ExecResult::Failure { error }
    }

    /// True if the evaluation succeeded.
    pub fn ok(&self) -> bool {
        matches!(self, ExecResult::Success { .. })
    }

    /// The returned value, if the evaluation succeeded with one.
    pub fn value(&self) -> Option<&Value> {
        match self {
            ExecResult::Success { value } => value.as_ref(),
            ExecResult::Failure { .. } => None,
        }
    }

    /// The error, if the evaluation failed.
    pub fn error(&self) -> Option<&ExecError> {
        match self {
            ExecResult::Success { .. } => None,
            ExecResult::Failure { error } => Some(error),
        }
    }
}
