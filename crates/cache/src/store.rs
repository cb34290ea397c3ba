use crate::error::{ErrorKind, Result};
use crate::models::RecordRow;
use exn::ResultExt;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use hoard_record::{AssetRecord, Inventory};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Leading bytes of every cache file.
pub const MAGIC: [u8; 4] = *b"HRDC";
/// Version of the [`RecordRow`] layout. Caches written with any other version
/// are treated as a miss.
pub const SCHEMA_VERSION: u32 = 1;
const HEADER_LEN: usize = MAGIC.len() + size_of::<u32>();

/// Whole-inventory persistence to a single file.
#[derive(Debug, Clone)]
pub struct BinaryCacheStore {
    path: PathBuf,
}
impl BinaryCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replaces the cache file with `inventory`, creating parent
    /// directories as needed.
    #[tracing::instrument(skip_all, fields(path = %self.path.display(), records = inventory.len()))]
    pub async fn save(&self, inventory: &Inventory) -> Result<()> {
        let bytes = encode(inventory)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Write(parent.into()))?;
        }
        let temporary = self.temporary_path();
        fs::write(&temporary, &bytes).await.or_raise(|| ErrorKind::Write(temporary.clone()))?;
        if let Err(err) = fs::rename(&temporary, &self.path).await {
            // Best effort; the rename error is what matters.
            let _ = fs::remove_file(&temporary).await;
            return Err(err).or_raise(|| ErrorKind::Write(self.path.clone()));
        }
        tracing::info!(bytes = bytes.len(), "Saved inventory cache");
        Ok(())
    }

    /// Loads the whole inventory. A missing cache file is not an error: it is
    /// logged and yields an empty inventory.
    #[tracing::instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Inventory> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                tracing::warn!("No inventory cache found");
                return Ok(Inventory::new());
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::Read(self.path.clone())),
        };
        let inventory = decode(&bytes)?;
        tracing::info!(records = inventory.len(), "Loaded inventory cache");
        Ok(inventory)
    }

    /// Like [`load`](Self::load), but any failure (unreadable file, foreign
    /// or outdated format, corrupt payload) is logged and reported as a miss.
    pub async fn load_cached(&self) -> Option<Inventory> {
        match self.load().await {
            Ok(inventory) => Some(inventory),
            Err(err) => {
                match err.is_stale() {
                    true => tracing::warn!(path = %self.path.display(), error = %err, "Ignoring unusable cache"),
                    false => tracing::warn!(path = %self.path.display(), error = ?err, "Could not read cache"),
                }
                None
            },
        }
    }

    fn temporary_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "cache".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn encode(inventory: &Inventory) -> Result<Vec<u8>> {
    let rows: Vec<RecordRow> = inventory.values().map(RecordRow::from).collect();
    let payload = bincode::serialize(&rows).or_raise(|| ErrorKind::Encode)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len() / 2);
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    let mut encoder = GzEncoder::new(bytes, Compression::default());
    encoder.write_all(&payload).or_raise(|| ErrorKind::Encode)?;
    encoder.finish().or_raise(|| ErrorKind::Encode)
}

fn decode(bytes: &[u8]) -> Result<Inventory> {
    let Some((header, compressed)) = bytes.split_at_checked(HEADER_LEN) else {
        exn::bail!(ErrorKind::BadMagic);
    };
    let (magic, version) = header.split_at(MAGIC.len());
    if magic != MAGIC {
        exn::bail!(ErrorKind::BadMagic);
    }
    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(version);
    let found = u32::from_le_bytes(version_bytes);
    if found != SCHEMA_VERSION {
        exn::bail!(ErrorKind::VersionMismatch { found, expected: SCHEMA_VERSION });
    }
    let rows: Vec<RecordRow> = bincode::deserialize_from(GzDecoder::new(compressed)).or_raise(|| ErrorKind::Decode)?;
    let mut inventory = Inventory::new();
    for row in rows {
        let record = AssetRecord::try_from(row)?;
        inventory.insert(record.id.clone(), record);
    }
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_record::{DownloadStatus, ModStatus};
    use std::time::Duration;
    use tempfile::TempDir;
    use time::macros::datetime;

    fn inventory() -> Inventory {
        let mut img1 = AssetRecord::new("img1");
        img1.filename = Some("img1.jpg".to_string());
        img1.file_size = Some("2.0 KB".to_string());
        img1.locations = vec![PathBuf::from("/library"), PathBuf::from("/library/wallpaper")];
        img1.dl_status = DownloadStatus::Downloaded;
        img1.mod_status = ModStatus::New;
        img1.downloaded_on = Some(datetime!(2024-05-06 07:08:09 UTC));
        img1.download_duration = Some(Duration::from_millis(1234));
        img1.classification_metadata = vec!["wallpaper".to_string()];
        let mut img2 = AssetRecord::new("img2");
        img2.author = Some("Bob".to_string());
        img2.dl_status = DownloadStatus::Error;
        img2.error_info = Some("HTTP 404".to_string());
        [img1, img2].into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = BinaryCacheStore::new(dir.path().join("nested").join("inventory.bin"));
        store.save(&inventory()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), inventory());
        assert!(!dir.path().join("nested").join("inventory.bin.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = BinaryCacheStore::new(dir.path().join("inventory.bin"));
        store.save(&inventory()).await.unwrap();
        store.save(&Inventory::new()).await.unwrap();
        assert_eq!(store.load_cached().await, Some(Inventory::new()));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = BinaryCacheStore::new(dir.path().join("inventory.bin"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_version_mismatch_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = BinaryCacheStore::new(dir.path().join("inventory.bin"));
        store.save(&inventory()).await.unwrap();
        let mut bytes = std::fs::read(store.path()).unwrap();
        bytes[4..8].copy_from_slice(&(SCHEMA_VERSION + 1).to_le_bytes());
        std::fs::write(store.path(), &bytes).unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::VersionMismatch { expected: SCHEMA_VERSION, .. }));
        assert!(store.load_cached().await.is_none());
    }

    #[rstest::rstest]
    #[case::empty(b"".to_vec())]
    #[case::short(b"HRD".to_vec())]
    #[case::foreign(b"\x89PNG\r\n\x1a\n".to_vec())]
    #[case::truncated_payload([&MAGIC[..], &SCHEMA_VERSION.to_le_bytes(), b"\x1f\x8b"].concat())]
    fn test_garbage_is_stale(#[case] bytes: Vec<u8>) {
        let err = decode(&bytes).unwrap_err();
        assert!(err.is_stale());
    }
}
