//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not read cache file: {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    #[display("could not write cache file: {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    /// The file does not start with the cache magic bytes.
    #[display("not a cache file")]
    BadMagic,
    /// Written by a version of hoard with a different record layout.
    #[display("cache schema version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
    #[display("could not encode cache")]
    Encode,
    #[display("could not decode cache")]
    Decode,
    /// Serialization/deserialization error.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write(_))
    }

    /// Whether the cache exists but can't be used, and should be rebuilt.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::BadMagic | Self::VersionMismatch { .. } | Self::Decode | Self::InvalidData(_))
    }
}
