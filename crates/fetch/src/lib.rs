//! Per-asset fetch state machine.
//!
//! A [`FetchWorker`] takes one URL and a destination directory, derives the
//! asset's file name and identity, and drives a bounded retry loop over a
//! [`FetchTransport`]. Two transports are built in and selected by name
//! through [`Transport::from_name`]:
//! - `stream`: an HTTP GET streamed straight to disk;
//! - `secondary`: an external single-shot downloader such as `curl`.

pub mod error;
mod name;
mod transport;
mod worker;

pub use crate::name::file_name_from_url;
#[cfg(any(test, feature = "mock"))]
pub use crate::transport::{MockResponse, MockTransport};
pub use crate::transport::{
    FetchTransport, SecondarySettings, SecondaryTransport, StreamingTransport, Transport, TransportSettings,
};
pub use crate::worker::{DEFAULT_PROTOCOL, FetchOutcome, FetchWorker, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
