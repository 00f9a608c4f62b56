//! Error types
//!
//! Two layers: `ErrorInfo` is the in-language error payload (what `throw`
//! raises and rejected promises carry); `ProgramError` is the host-side error
//! for loading/validating/linking a program, which never reaches the driver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::program::rules::ValidationError;

/* ===================== Error codes ===================== */

pub const TYPE_ERROR: &str = "TypeError";
pub const REFERENCE_ERROR: &str = "ReferenceError";
pub const RANGE_ERROR: &str = "RangeError";
pub const WRONG_ARG_COUNT: &str = "WrongArgCount";
pub const WRONG_ARG_TYPE: &str = "WrongArgType";
pub const AGGREGATE_ERROR: &str = "AggregateError";
pub const INTERNAL_ERROR: &str = "InternalError";

/* ===================== In-language errors ===================== */

/// Error value payload carried by `Val::Error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/* ===================== Host-side errors ===================== */

/// Errors raised while loading, validating, or linking a program
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("invalid program JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate function name: {0}")]
    DuplicateFunction(String),

    #[error("duplicate closure id {id} in function {function}")]
    DuplicateClosure { function: String, id: u32 },

    #[error("validation failed for function {function}: {}", format_errors(.errors))]
    Validation {
        function: String,
        errors: Vec<ValidationError>,
    },

    #[error("unknown function: {0}")]
    UnknownFunction(String),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
