//! Error types for the network model.
//!
//! Per-element data problems never surface here: the model accepts whatever it
//! is given and the optimization layer logs what looks suspicious. [`GridError`]
//! covers contract violations, such as a terminal on a voltage level that does
//! not exist or a batched update naming an unknown element.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    /// Broken cross-references between tables
    #[error("Validation error: {0}")]
    Validation(String),

    /// A batched update referenced an identifier the network does not hold
    #[error("Unknown {kind} '{id}'")]
    UnknownElement { kind: &'static str, id: String },
}

pub type GridResult<T> = Result<T, GridError>;

impl GridError {
    pub fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        GridError::UnknownElement {
            kind,
            id: id.into(),
        }
    }
}
