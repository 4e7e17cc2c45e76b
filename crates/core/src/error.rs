//! Shared error model.

use thiserror::Error;

/// Core-level error.
///
/// Only deterministic input failures live here. Work-body failures are never
/// errors of this kind; the job engine turns them into record data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
