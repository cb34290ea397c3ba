//! Fetch transports.
//!
//! A transport performs exactly one download attempt of a URL into a
//! destination file. Retrying, status bookkeeping and cancellation are the
//! [`FetchWorker`](crate::FetchWorker)'s job; transports only report whether a
//! single attempt produced a usable file.

#[cfg(any(test, feature = "mock"))]
mod mock;
mod secondary;
mod stream;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockResponse, MockTransport};
pub use self::secondary::{SecondarySettings, SecondaryTransport};
pub use self::stream::StreamingTransport;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// One download attempt.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Downloads `url` to `destination`, returning the number of bytes
    /// written.
    ///
    /// On failure the transport must not leave a partial file behind. The
    /// error's [`attempt_status`](ErrorKind::attempt_status) decides which
    /// status the attempt leaves the record in.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// Everything needed to construct any registered transport.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub user_agent: String,
    /// Connect and whole-request timeout for the streaming transport.
    pub timeout: Duration,
    pub secondary: SecondarySettings,
}
impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("hoard/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(60),
            secondary: SecondarySettings::default(),
        }
    }
}

/// The closed set of built-in transports.
#[derive(Debug, Clone)]
pub enum Transport {
    Streaming(StreamingTransport),
    Secondary(SecondaryTransport),
}

type Factory = fn(&TransportSettings) -> Result<Transport>;

/// Transports selectable by name, in order of preference.
const REGISTRY: [(&str, Factory); 2] = [("stream", streaming), ("secondary", secondary)];

fn streaming(settings: &TransportSettings) -> Result<Transport> {
    Ok(Transport::Streaming(StreamingTransport::new(settings)?))
}

fn secondary(settings: &TransportSettings) -> Result<Transport> {
    Ok(Transport::Secondary(SecondaryTransport::new(&settings.secondary)))
}

impl Transport {
    /// Constructs the transport registered under `name` (case-insensitive).
    ///
    /// ```
    /// use hoard_fetch::{Transport, TransportSettings};
    /// let transport = Transport::from_name("secondary", &TransportSettings::default()).unwrap();
    /// assert!(matches!(transport, Transport::Secondary(_)));
    /// assert!(Transport::from_name("carrier-pigeon", &TransportSettings::default()).is_err());
    /// ```
    pub fn from_name(name: &str, settings: &TransportSettings) -> Result<Self> {
        let key = name.trim().to_lowercase();
        match REGISTRY.iter().find(|(registered, _)| *registered == key) {
            Some((_, factory)) => factory(settings),
            None => exn::bail!(ErrorKind::UnknownTransport(name.to_string())),
        }
    }

    /// Names accepted by [`from_name`](Self::from_name).
    pub fn names() -> impl Iterator<Item = &'static str> {
        REGISTRY.iter().map(|(name, _)| *name)
    }
}

#[async_trait]
impl FetchTransport for Transport {
    fn name(&self) -> &'static str {
        match self {
            Self::Streaming(transport) => transport.name(),
            Self::Secondary(transport) => transport.name(),
        }
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        match self {
            Self::Streaming(transport) => transport.fetch(url, destination).await,
            Self::Secondary(transport) => transport.fetch(url, destination).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names() {
        assert_eq!(Transport::names().collect::<Vec<_>>(), vec!["stream", "secondary"]);
    }

    #[test]
    fn test_from_name() {
        let settings = TransportSettings::default();
        let transport = Transport::from_name(" STREAM ", &settings).unwrap();
        assert_eq!(transport.name(), "stream");
        let err = Transport::from_name("ftp", &settings).unwrap_err();
        assert_eq!(&*err, &ErrorKind::UnknownTransport("ftp".to_string()));
    }
}
