//! Core domain errors.

use thiserror::Error;

/// Core domain errors for TaskWeave.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A status name did not match any known variant.
    #[error("Unknown {kind} status: {value}")]
    UnknownStatus { kind: &'static str, value: String },
}
