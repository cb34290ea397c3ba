use super::FetchTransport;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;

/// Configuration for [`SecondaryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondarySettings {
    /// When disabled every attempt fails immediately without running anything.
    pub enabled: bool,
    /// Program to run; looked up on `PATH` unless it is a path already.
    pub command: String,
    /// Arguments, with `{url}` and `{output}` replaced for each attempt.
    pub args: Vec<String>,
    /// Exit codes meaning the host could not be reached at all.
    pub connection_failure_codes: Vec<i32>,
    /// Files smaller than this (in KiB) are treated as error pages.
    pub min_size_kb: u64,
}
impl Default for SecondarySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "curl".to_string(),
            args: ["--silent", "--show-error", "--location", "--fail", "--output", "{output}", "{url}"]
                .map(String::from)
                .to_vec(),
            // curl: couldn't resolve host, couldn't connect, timed out.
            connection_failure_codes: vec![6, 7, 28],
            min_size_kb: 10,
        }
    }
}

/// Delegates each attempt to an external single-shot downloader.
#[derive(Debug, Clone)]
pub struct SecondaryTransport {
    program: PathBuf,
    settings: SecondarySettings,
}
impl SecondaryTransport {
    pub fn new(settings: &SecondarySettings) -> Self {
        let program = match which::which(&settings.command) {
            Ok(path) => path,
            Err(err) => {
                // Not fatal here: every attempt will fail to spawn and be retried.
                if settings.enabled {
                    tracing::warn!(command = %settings.command, error = %err, "Secondary downloader not found in PATH");
                }
                PathBuf::from(&settings.command)
            },
        };
        Self { program, settings: settings.clone() }
    }

    fn args(&self, url: &str, destination: &Path) -> Vec<String> {
        let output = destination.to_string_lossy();
        self.settings.args.iter().map(|arg| arg.replace("{url}", url).replace("{output}", &output)).collect()
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        if !self.settings.enabled {
            exn::bail!(ErrorKind::Disabled);
        }
        let output = Command::new(&self.program)
            .args(self.args(url, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ErrorKind::Connection(format!("could not run {}: {err}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(code = ?output.status.code(), stderr = %stderr.trim(), "Secondary downloader failed");
            match output.status.code() {
                Some(code) if self.settings.connection_failure_codes.contains(&code) => {
                    exn::bail!(ErrorKind::Connection(format!("downloader exit code {code}")))
                },
                Some(code) => exn::bail!(ErrorKind::CommandFailed(format!("exit code {code}"))),
                None => exn::bail!(ErrorKind::CommandFailed("termination by signal".to_string())),
            }
        }

        let actual = fs::metadata(destination).await.map(|m| m.len()).unwrap_or(0);
        let minimum = self.settings.min_size_kb.saturating_mul(1024);
        if actual < minimum {
            tracing::warn!(url, actual, minimum, "Discarding undersized download");
            exn::bail!(ErrorKind::Undersized { actual, minimum });
        }
        Ok(actual)
    }
}

#[async_trait]
impl FetchTransport for SecondaryTransport {
    fn name(&self) -> &'static str {
        "secondary"
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        let result = self.download(url, destination).await;
        if result.is_err() && fs::try_exists(destination).await.unwrap_or(false) {
            if let Err(err) = fs::remove_file(destination).await {
                tracing::warn!(path = %destination.display(), error = %err, "Could not remove failed download");
            }
        }
        result
    }
}
