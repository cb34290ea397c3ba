use crate::DEFAULT_EXTENSION;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hoard_record::AssetRecord;
use serde_json::{Map, Value};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Gives up looking for a free file name after this many clashes.
const MAX_NAME_CLASHES: u32 = 1000;

/// Writes one snapshot log per run.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    extension: String,
}
impl Default for SnapshotWriter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}
impl SnapshotWriter {
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self { extension: extension.trim_start_matches('.').to_string() }
    }

    /// Writes `records` as a pretty-printed JSON object keyed by id to a new
    /// file in `directory` named after the current UTC time.
    ///
    /// An existing snapshot is never overwritten: a numeric suffix is added to
    /// the name instead. Nothing is written, and `None` is returned, when there
    /// are no records.
    #[tracing::instrument(skip_all, fields(directory = %directory.as_ref().display()))]
    pub async fn write<'a>(
        &self,
        directory: impl AsRef<Path>,
        records: impl IntoIterator<Item = &'a AssetRecord>,
    ) -> Result<Option<PathBuf>> {
        let directory = directory.as_ref();
        let entries: Map<String, Value> =
            records.into_iter().map(|record| (record.id.clone(), Value::Object(record.to_fields()))).collect();
        if entries.is_empty() {
            tracing::debug!("No records to write; skipping snapshot");
            return Ok(None);
        }
        let contents = serde_json::to_vec_pretty(&Value::Object(entries)).or_raise(|| ErrorKind::Serialize)?;

        fs::create_dir_all(directory).await.or_raise(|| ErrorKind::Write(directory.into()))?;
        let stem = timestamp_stem(OffsetDateTime::now_utc());
        for attempt in 0..MAX_NAME_CLASHES {
            let name = match attempt {
                0 => format!("{stem}.{}", self.extension),
                n => format!("{stem}-{n}.{}", self.extension),
            };
            let path = directory.join(name);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(err) if err.kind() == IoErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err).or_raise(|| ErrorKind::Write(path.clone())),
            };
            file.write_all(&contents).await.or_raise(|| ErrorKind::Write(path.clone()))?;
            file.flush().await.or_raise(|| ErrorKind::Write(path.clone()))?;
            tracing::info!(path = %path.display(), bytes = contents.len(), "Wrote snapshot log");
            return Ok(Some(path));
        }
        exn::bail!(ErrorKind::Write(directory.join(stem)))
    }
}

fn timestamp_stem(now: OffsetDateTime) -> String {
    let format = format_description!("[year][month][day]T[hour][minute][second]Z");
    // Only fails for years beyond four digits.
    now.format(format).unwrap_or_else(|_| now.unix_timestamp().to_string())
}
