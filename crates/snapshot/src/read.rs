use crate::DEFAULT_EXTENSION;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hoard_record::{AssetRecord, DownloadStatus, Inventory};
use hoard_storage::has_extension;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Loads the records of every snapshot log in a directory.
///
/// Snapshots are read in file name order. The first `DOWNLOADED` entry for an
/// id wins; every other entry for that id is kept aside and only used to fill
/// in fields the winner left unset. Ids that were never `DOWNLOADED` in any
/// snapshot are not returned.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    extension: String,
}
impl Default for SnapshotReader {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}
impl SnapshotReader {
    pub fn new(extension: impl Into<String>) -> Self {
        Self { extension: extension.into() }
    }

    #[tracing::instrument(skip_all, fields(directory = %directory.as_ref().display()))]
    pub async fn load(&self, directory: impl AsRef<Path>) -> Inventory {
        let directory = directory.as_ref();
        let files = match self.list(directory).await {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(path = %directory.display(), error = %err, "Snapshot directory unavailable");
                return Inventory::new();
            },
        };

        let mut inventory = Inventory::new();
        let mut duplicates: HashMap<String, Vec<AssetRecord>> = HashMap::new();
        for file in &files {
            let entries = match read_entries(file).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(path = %file.display(), error = %err, "Skipping unreadable snapshot");
                    continue;
                },
            };
            for (key, value) in entries {
                let Value::Object(fields) = value else {
                    tracing::warn!(path = %file.display(), id = %key, "Skipping snapshot entry that is not an object");
                    continue;
                };
                let record = AssetRecord::from_fields(&key, &fields);
                if record.dl_status == DownloadStatus::Downloaded && !inventory.contains_key(&record.id) {
                    inventory.insert(record.id.clone(), record);
                } else {
                    duplicates.entry(record.id.clone()).or_default().push(record);
                }
            }
        }

        let mut backfilled = 0;
        for (id, record) in inventory.iter_mut() {
            for duplicate in duplicates.get(id).into_iter().flatten() {
                backfilled += record.backfill_optional(duplicate);
            }
        }
        let dropped = duplicates.keys().filter(|id| !inventory.contains_key(*id)).count();
        tracing::info!(
            files = files.len(),
            records = inventory.len(),
            backfilled,
            dropped,
            "Loaded snapshot logs"
        );
        inventory
    }

    async fn list(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        let mut reader = fs::read_dir(directory).await.or_raise(|| ErrorKind::Read(directory.into()))?;
        let mut files = Vec::new();
        while let Some(entry) = reader.next_entry().await.or_raise(|| ErrorKind::Read(directory.into()))? {
            let path = entry.path();
            if has_extension(&path, &self.extension) && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

async fn read_entries(file: &Path) -> Result<Map<String, Value>> {
    let contents = fs::read(file).await.or_raise(|| ErrorKind::Read(file.into()))?;
    let value: Value = serde_json::from_slice(&contents).or_raise(|| ErrorKind::InvalidJson(file.into()))?;
    match value {
        Value::Object(entries) => Ok(entries),
        _ => exn::bail!(ErrorKind::NotAnObject(file.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_record::ModStatus;
    use serde_json::json;
    use tempfile::TempDir;

    fn snapshot(dir: &Path, name: &str, contents: Value) {
        std::fs::write(dir.join(name), serde_json::to_vec(&contents).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_duplicates_backfill_downloaded_record() {
        let dir = TempDir::new().unwrap();
        snapshot(dir.path(), "2024-01-01.json", json!({ "img2": { "dl_status": "DOWNLOADED" } }));
        snapshot(dir.path(), "2024-01-02.json", json!({ "img2": { "author": "Bob", "dl_status": "PENDING" } }));

        let inventory = SnapshotReader::default().load(dir.path()).await;
        assert_eq!(inventory.len(), 1);
        let img2 = &inventory["img2"];
        assert_eq!(img2.author.as_deref(), Some("Bob"));
        assert_eq!(img2.dl_status, DownloadStatus::Downloaded);
    }

    #[tokio::test]
    async fn test_first_downloaded_entry_wins() {
        let dir = TempDir::new().unwrap();
        snapshot(
            dir.path(),
            "a.json",
            json!({ "img1": { "author": "First", "dl_status": "DOWNLOADED", "mod_status": "NEW" } }),
        );
        snapshot(
            dir.path(),
            "b.json",
            json!({ "img1": { "author": "Second", "description": "Lake", "dl_status": "DOWNLOADED" } }),
        );
        snapshot(dir.path(), "c.json", json!({ "img1": { "description": "Sea", "dl_status": "ERROR" } }));

        let img1 = &SnapshotReader::default().load(dir.path()).await["img1"];
        assert_eq!(img1.author.as_deref(), Some("First"));
        assert_eq!(img1.description.as_deref(), Some("Lake"));
        assert_eq!(img1.mod_status, ModStatus::New);
    }

    #[tokio::test]
    async fn test_never_downloaded_ids_are_dropped() {
        let dir = TempDir::new().unwrap();
        snapshot(dir.path(), "a.json", json!({ "img5": { "dl_status": "ERROR", "error_info": "404" } }));
        assert!(SnapshotReader::default().load(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_files_and_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.json"), b"{ not json").unwrap();
        snapshot(dir.path(), "b.json", json!(["img1"]));
        snapshot(
            dir.path(),
            "c.JSON",
            json!({ "img1": "DOWNLOADED", "img3": { "dl_status": "DOWNLOADED", "rating": 5 } }),
        );
        snapshot(dir.path(), "d.txt", json!({ "img4": { "dl_status": "DOWNLOADED" } }));

        let inventory = SnapshotReader::default().load(dir.path()).await;
        assert_eq!(inventory.keys().collect::<Vec<_>>(), vec!["img3"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(SnapshotReader::default().load(dir.path().join("absent")).await.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_id_field_is_the_identity() {
        let dir = TempDir::new().unwrap();
        snapshot(dir.path(), "a.json", json!({ "IMG6.jpg": { "id": "img6", "dl_status": "DOWNLOADED" } }));
        let inventory = SnapshotReader::new(".json").load(dir.path()).await;
        assert!(inventory.contains_key("img6"));
    }
}
