//! Error Taxonomy
//!
//! Error types for the rule engine, one enum per failing component, the way
//! `storage/error.rs` and `protocol/error.rs` are split in the teacher
//! engine. See `spec.md` §7 for the taxonomy this mirrors.

use thiserror::Error;

/// Parser errors: the driver keeps only the last error, tagged with
/// line/column (spec.md §4.3, §7 `ParseError`).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("parsing-rule: {message} (line {line}, column {column})")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        ParseError {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Validation errors: unresolved names/ids, arity mismatches, wrong value
/// types (spec.md §7 `ValidationError`).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("parsing-rule: {0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        ValidationError(message.into())
    }
}

/// Marker construction errors (spec.md §7 `MarkerCoordinateError` /
/// `MarkerDimensionError` / `InternalError`). Per §4.7 and §7, a single
/// marker's construction failure is logged and the marker dropped — it is
/// the caller's job to catch this and continue, not to abort the rule.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarkerError {
    #[error("invalid-coordinates: path length {got} does not match source cube dimensionality {expected}")]
    CoordinatesLengthMismatch { expected: usize, got: usize },

    #[error("dimension-not-found: {0}")]
    DimensionNotFound(String),

    #[error("internal: unexpected node kind in marker construction: {0}")]
    Internal(String),
}

/// Top-level rule engine error, composing the above plus operations that can
/// fail for reasons outside parsing/validation/markers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleEngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Marker(#[from] MarkerError),

    #[error("dimension '{0}' not found in cube")]
    DimensionNotFound(String),

    #[error("element '{0}' not found in dimension '{1}'")]
    ElementNotFound(String, String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RuleEngineError>;
