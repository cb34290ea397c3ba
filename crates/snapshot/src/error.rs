//! Snapshot Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A snapshot error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for snapshot operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not read snapshot: {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    #[display("could not write snapshot: {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    #[display("snapshot is not valid JSON: {}", _0.display())]
    InvalidJson(#[error(not(source))] PathBuf),
    #[display("snapshot top level is not a JSON object: {}", _0.display())]
    NotAnObject(#[error(not(source))] PathBuf),
    #[display("could not serialize snapshot")]
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write(_))
    }
}
