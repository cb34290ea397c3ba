//! Fetch Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use hoard_record::DownloadStatus;
use std::path::PathBuf;

/// A fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// URL does not start with the configured protocol, or does not parse.
    #[display("invalid URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// No usable file name could be derived from the URL.
    #[display("no file name in URL: {_0}")]
    NoFileName(#[error(not(source))] String),
    /// No destination directory was given.
    #[display("no destination directory")]
    NoDestination,
    /// The destination is not an existing directory.
    #[display("destination directory does not exist: {}", _0.display())]
    MissingDestination(#[error(not(source))] PathBuf),
    /// Could not reach the remote host at all.
    #[display("connection failed: {_0}")]
    Connection(#[error(not(source))] String),
    /// The request was sent but failed before a usable response arrived.
    #[display("request failed: {_0}")]
    Request(#[error(not(source))] String),
    /// The server answered with something other than `200 OK`.
    #[display("unexpected HTTP status {_0}")]
    HttpStatus(#[error(not(source))] u16),
    /// The response body could not be written to the destination.
    #[display("transfer to {} failed", _0.display())]
    Transfer(#[error(not(source))] PathBuf),
    /// The secondary downloader exited unsuccessfully.
    #[display("downloader exited with {_0}")]
    CommandFailed(#[error(not(source))] String),
    /// The downloaded file is too small to be the real asset (most likely an
    /// error page served with a success status).
    #[display("downloaded file is {actual} bytes, below the {minimum} byte minimum")]
    Undersized { actual: u64, minimum: u64 },
    /// The secondary downloader has been disabled in configuration.
    #[display("secondary downloader is disabled")]
    Disabled,
    /// The HTTP client could not be constructed.
    #[display("could not build HTTP client")]
    Client,
    /// No transport is registered under the requested name.
    #[display("unknown transport '{_0}'")]
    UnknownTransport(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Request(_) | Self::HttpStatus(_) | Self::Transfer(_) | Self::Undersized { .. }
        )
    }

    /// The status a failed attempt leaves the record in. Only a failure to
    /// connect at all leaves it `PENDING`; everything else is an `ERROR`.
    pub fn attempt_status(&self) -> DownloadStatus {
        match self {
            Self::Connection(_) => DownloadStatus::Pending,
            _ => DownloadStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Connection("refused".into()), DownloadStatus::Pending)]
    #[case(ErrorKind::Request("reset".into()), DownloadStatus::Error)]
    #[case(ErrorKind::HttpStatus(503), DownloadStatus::Error)]
    #[case(ErrorKind::Undersized { actual: 10, minimum: 1024 }, DownloadStatus::Error)]
    #[case(ErrorKind::Disabled, DownloadStatus::Error)]
    fn test_attempt_status(#[case] kind: ErrorKind, #[case] expected: DownloadStatus) {
        assert_eq!(kind.attempt_status(), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::HttpStatus(404).to_string(), "unexpected HTTP status 404");
        assert_eq!(
            ErrorKind::Undersized { actual: 10, minimum: 1024 }.to_string(),
            "downloaded file is 10 bytes, below the 1024 byte minimum"
        );
        assert!(!ErrorKind::Disabled.is_retryable());
    }
}
