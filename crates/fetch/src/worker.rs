use crate::error::ErrorKind;
use crate::name::file_name_from_url;
use crate::transport::{FetchTransport, Transport};
use hoard_record::{AssetRecord, DownloadStatus, ModStatus, id_from_filename, kb_display};
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// URL prefix accepted unless configured otherwise. Matches both `http://`
/// and `https://`.
pub const DEFAULT_PROTOCOL: &str = "http";

/// How often, and how patiently, a worker retries a failing download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Pause between consecutive attempts. Not applied after the last one.
    pub retry_delay: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, retry_delay: Duration::from_secs(5) }
    }
}

/// Result of one [`FetchWorker::fetch`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub url: String,
    /// The record describing the asset, carrying the final status.
    pub record: AssetRecord,
    /// Transport attempts actually made.
    pub attempts: u32,
    /// Whether the worker stopped early because it was cancelled.
    pub cancelled: bool,
}
impl FetchOutcome {
    pub fn status(&self) -> DownloadStatus {
        self.record.dl_status
    }
}

/// Fetches a single URL into a destination directory, retrying on failure.
///
/// The worker drives the record through `PENDING -> {EXISTS, DOWNLOADED,
/// ERROR}`, writing every transition onto the record it returns.
#[derive(Debug, Clone)]
pub struct FetchWorker<T = Transport> {
    transport: T,
    policy: RetryPolicy,
    protocol: String,
    cancel: CancellationToken,
}
impl<T: FetchTransport> FetchWorker<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Aborts any in-progress and future fetches between attempts once
    /// `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Downloads `url` into `destination`.
    ///
    /// Never fails: problems are reported through the returned record's
    /// `dl_status` and `error_info`.
    #[tracing::instrument(skip(self, destination), fields(transport = self.transport.name()))]
    pub async fn fetch(&self, url: &str, destination: Option<&Path>) -> FetchOutcome {
        let mut outcome = FetchOutcome {
            url: url.to_string(),
            record: AssetRecord::new(url),
            attempts: 0,
            cancelled: false,
        };
        outcome.record.image_url = Some(url.to_string());

        let name = match file_name_from_url(url, &self.protocol) {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(error = %err, "Cannot derive a file name; not fetching");
                fail(&mut outcome.record, err.to_string());
                return outcome;
            },
        };
        outcome.record.id = id_from_filename(&name);
        outcome.record.filename = Some(name.clone());
        outcome.record.dl_status = DownloadStatus::Pending;

        let Some(directory) = destination.filter(|d| d.is_dir()) else {
            let kind = match destination {
                Some(d) => ErrorKind::MissingDestination(d.to_path_buf()),
                None => ErrorKind::NoDestination,
            };
            tracing::warn!(error = %kind, "Not fetching");
            fail(&mut outcome.record, kind.to_string());
            return outcome;
        };
        let target = directory.join(&name);
        if target.exists() {
            tracing::info!(path = %target.display(), "Already on disk; not fetching");
            outcome.record.dl_status = DownloadStatus::Exists;
            outcome.record.locations = vec![directory.to_path_buf()];
            return outcome;
        }

        self.attempt_all(&mut outcome, directory, &target).await;
        outcome
    }

    async fn attempt_all(&self, outcome: &mut FetchOutcome, directory: &Path, target: &Path) {
        let record = &mut outcome.record;
        let mut interrupted = false;
        for attempt in 1..=self.policy.max_attempts {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            outcome.attempts = attempt;
            let started = Instant::now();
            match self.transport.fetch(&outcome.url, target).await {
                Ok(bytes) => {
                    record.dl_status = DownloadStatus::Downloaded;
                    record.downloaded_on = Some(OffsetDateTime::now_utc());
                    record.download_duration = Some(started.elapsed());
                    record.file_size = Some(kb_display(bytes));
                    record.locations = vec![directory.to_path_buf()];
                    record.mod_status = ModStatus::New;
                    record.error_info = None;
                    tracing::info!(attempt, bytes, path = %target.display(), "Downloaded");
                    return;
                },
                Err(err) => {
                    record.dl_status = err.attempt_status();
                    record.error_info = Some(err.to_string());
                    tracing::warn!(attempt, max = self.policy.max_attempts, error = %err, "Fetch attempt failed");
                },
            }
            if attempt < self.policy.max_attempts {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {
                        interrupted = true;
                        break;
                    },
                    () = sleep(self.policy.retry_delay) => {},
                }
            }
        }
        if interrupted {
            tracing::info!(attempts = outcome.attempts, "Fetch cancelled");
            outcome.cancelled = true;
            record.error_info = Some("cancelled".to_string());
        } else {
            tracing::warn!(status = %record.dl_status, attempts = outcome.attempts, "Giving up");
        }
    }
}

fn fail(record: &mut AssetRecord, message: String) {
    record.dl_status = DownloadStatus::Error;
    record.error_info = Some(message);
}
