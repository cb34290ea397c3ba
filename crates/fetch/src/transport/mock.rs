//! Scripted transport for testing.

use super::FetchTransport;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// What a [`MockTransport`] does on one attempt.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Writes the bytes to the destination and succeeds.
    Body(Vec<u8>),
    /// Fails the attempt without touching the destination.
    Fail(ErrorKind),
}

/// Transport that replays scripted responses and counts attempts.
///
/// Scripted responses are used in order; once they run out, every further
/// attempt gets the fallback response.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockResponse>>,
    fallback: MockResponse,
    latency: Duration,
    calls: AtomicU32,
}
impl MockTransport {
    pub fn new(fallback: MockResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    /// Always fails with `kind`.
    pub fn failing(kind: ErrorKind) -> Self {
        Self::new(MockResponse::Fail(kind))
    }

    /// Always succeeds with `body`.
    pub fn serving(body: impl Into<Vec<u8>>) -> Self {
        Self::new(MockResponse::Body(body.into()))
    }

    /// Queues a response to be used before the fallback.
    pub fn then(self, response: MockResponse) -> Self {
        // Panicking on a poisoned lock is fine in a test double.
        self.script.lock().unwrap().push_back(response);
        self
    }

    /// Waits `latency` at the start of every attempt.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of attempts made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchTransport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch(&self, _url: &str, destination: &Path) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.script.lock().unwrap().pop_front().unwrap_or_else(|| self.fallback.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match response {
            MockResponse::Body(body) => {
                tokio::fs::write(destination, &body)
                    .await
                    .map_err(|err| ErrorKind::Request(err.to_string()))?;
                Ok(body.len() as u64)
            },
            MockResponse::Fail(kind) => exn::bail!(kind),
        }
    }
}
