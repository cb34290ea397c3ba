use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hoard_cache::BinaryCacheStore;
use hoard_record::{AssetRecord, Filesystem, Inventory, LocationProbe, merge_with, normalize_id};
use hoard_snapshot::{SnapshotReader, SnapshotWriter};
use hoard_storage::Scanner;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::PathBuf;

/// Combines the three sources into the canonical inventory, verifying merged
/// locations on the real filesystem.
///
/// See [`reconcile_with`].
pub fn reconcile(scanned: Inventory, snapshot: Inventory, cached: Option<Inventory>, force_scan: bool) -> Inventory {
    reconcile_with(scanned, snapshot, cached, force_scan, &Filesystem)
}

/// Combines the three sources into the canonical inventory.
///
/// Unless `force_scan` is set, a non-empty `cached` inventory is returned
/// as-is. Otherwise every snapshot record is merged into the scanned record
/// with the same id (the scanned record being the base), and the result is
/// [normalized](normalize_with).
pub fn reconcile_with(
    scanned: Inventory,
    snapshot: Inventory,
    cached: Option<Inventory>,
    force_scan: bool,
    probe: &impl LocationProbe,
) -> Inventory {
    if !force_scan
        && let Some(cached) = cached.filter(|cached| !cached.is_empty())
    {
        return cached;
    }

    let mut inventory = scanned;
    for (id, record) in snapshot {
        match inventory.entry(id) {
            Entry::Vacant(entry) => {
                entry.insert(record);
            },
            Entry::Occupied(mut entry) => {
                let merged = merge_with(entry.get(), &record, probe);
                entry.insert(merged);
            },
        }
    }
    normalize_with(inventory, probe)
}

/// Collapses keys that differ only by case or by a `.suffix`, verifying
/// merged locations on the real filesystem.
///
/// See [`normalize_with`].
pub fn normalize(inventory: Inventory) -> Inventory {
    normalize_with(inventory, &Filesystem)
}

/// Rewrites every key to its [normalized](normalize_id) form, merging records
/// that collide.
///
/// Within a collision the record whose key was already normalized is the
/// merge base; the others are merged into it in key order. If none was, the
/// first key in order is the base. Every record's `id` is set to its new key.
pub fn normalize_with(inventory: Inventory, probe: &impl LocationProbe) -> Inventory {
    let mut groups: BTreeMap<String, Vec<(String, AssetRecord)>> = BTreeMap::new();
    for (key, record) in inventory {
        groups.entry(normalize_id(&key)).or_default().push((key, record));
    }

    groups
        .into_iter()
        .map(|(normalized, mut members)| {
            if members.len() > 1 {
                let keys: Vec<&str> = members.iter().map(|(key, _)| key.as_str()).collect();
                tracing::debug!(id = %normalized, ?keys, "Merging records with colliding identities");
            }
            // Groups are never empty and their members are already in key order.
            let base = members.iter().position(|(key, _)| *key == normalized).unwrap_or(0);
            let (_, mut merged) = members.remove(base);
            for (_, record) in &members {
                merged = merge_with(&merged, record, probe);
            }
            merged.id = normalized.clone();
            (normalized, merged)
        })
        .collect()
}

/// Owns the sources and sinks of the canonical inventory.
#[derive(Debug, Clone)]
pub struct Reconciler {
    root: PathBuf,
    snapshots: PathBuf,
    scanner: Scanner,
    reader: SnapshotReader,
    writer: SnapshotWriter,
    cache: BinaryCacheStore,
    force_rescan: bool,
}
impl Reconciler {
    /// Reconciles the assets under `root` with the snapshot logs in
    /// `snapshots`, persisting to `cache`.
    pub fn new(root: impl Into<PathBuf>, snapshots: impl Into<PathBuf>, cache: BinaryCacheStore) -> Self {
        Self {
            root: root.into(),
            snapshots: snapshots.into(),
            scanner: Scanner::new("jpg", Vec::<String>::new()),
            reader: SnapshotReader::default(),
            writer: SnapshotWriter::default(),
            cache,
            force_rescan: false,
        }
    }

    pub fn with_scanner(mut self, scanner: Scanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Reads and writes snapshot logs with `extension`.
    pub fn with_snapshot_extension(mut self, extension: &str) -> Self {
        self.reader = SnapshotReader::new(extension);
        self.writer = SnapshotWriter::new(extension);
        self
    }

    /// Ignore the cache and always rebuild from the scan and snapshots.
    pub fn force_rescan(mut self, force: bool) -> Self {
        self.force_rescan = force;
        self
    }

    /// Produces the canonical inventory.
    ///
    /// A usable, non-empty cache short-circuits everything else. Otherwise the
    /// storage root is scanned while the snapshot logs are read, the two are
    /// reconciled and the result is saved to the cache. None of the sources
    /// failing aborts the pass: each is logged and treated as empty.
    #[tracing::instrument(skip_all, fields(root = %self.root.display(), force = self.force_rescan))]
    pub async fn run(&self) -> Inventory {
        let cached = match self.force_rescan {
            true => None,
            false => self.cache.load_cached().await,
        };
        if let Some(cached) = cached.filter(|cached| !cached.is_empty()) {
            tracing::info!(records = cached.len(), "Using cached inventory");
            return cached;
        }

        let ((scanned, stats), snapshot) =
            tokio::join!(self.scanner.scan(&self.root), self.reader.load(&self.snapshots));
        tracing::info!(%stats, scanned = scanned.len(), snapshot = snapshot.len(), "Sources loaded");

        let inventory = reconcile(scanned, snapshot, None, true);
        if let Err(err) = self.save(&inventory).await {
            tracing::warn!(error = ?err, "Continuing without a saved cache");
        }
        tracing::info!(records = inventory.len(), "Reconciled inventory");
        inventory
    }

    pub async fn save(&self, inventory: &Inventory) -> Result<()> {
        self.cache.save(inventory).await.or_raise(|| ErrorKind::Cache)
    }

    /// Appends a snapshot log of `records` to the snapshot directory.
    pub async fn write_snapshot<'a>(
        &self,
        records: impl IntoIterator<Item = &'a AssetRecord>,
    ) -> Result<Option<PathBuf>> {
        self.writer.write(&self.snapshots, records).await.or_raise(|| ErrorKind::Snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_record::DownloadStatus;
    use std::path::Path;
    use tempfile::TempDir;

    fn record(id: &str) -> AssetRecord {
        AssetRecord::new(id)
    }

    fn inventory(records: impl IntoIterator<Item = AssetRecord>) -> Inventory {
        records.into_iter().map(|record| (record.id.clone(), record)).collect()
    }

    fn only_a(directory: &Path, filename: &str) -> bool {
        directory == Path::new("/a") && filename == "img1.jpg"
    }

    #[test]
    fn test_snapshot_metadata_joins_scanned_record() {
        let mut scanned = record("img1");
        scanned.filename = Some("img1.jpg".to_string());
        scanned.dl_status = DownloadStatus::Downloaded;
        scanned.add_location("/a");
        let mut logged = record("img1");
        logged.author = Some("Jane".to_string());
        logged.dl_status = DownloadStatus::Downloaded;
        logged.add_location("/stale");

        let result = reconcile_with(inventory([scanned]), inventory([logged]), None, false, &only_a);
        let img1 = &result["img1"];
        assert_eq!(img1.author.as_deref(), Some("Jane"));
        assert_eq!(img1.dl_status, DownloadStatus::Downloaded);
        assert_eq!(img1.locations, vec![PathBuf::from("/a")]);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_snapshot_only_records_are_inserted() {
        let mut logged = record("img9");
        logged.dl_status = DownloadStatus::Error;
        let result = reconcile_with(Inventory::new(), inventory([logged.clone()]), None, false, &only_a);
        assert_eq!(result["img9"], logged);
    }

    #[test]
    fn test_case_and_extension_variants_collapse() {
        let mut scanned = record("IMG3.jpg");
        scanned.filename = Some("IMG3.jpg".to_string());
        scanned.dl_status = DownloadStatus::Downloaded;
        let mut logged = record("img3");
        logged.author = Some("Ann".to_string());

        let result = reconcile_with(inventory([scanned]), inventory([logged]), None, false, &only_a);
        assert_eq!(result.keys().collect::<Vec<_>>(), ["img3"]);
        let img3 = &result["img3"];
        assert_eq!(img3.id, "img3");
        // The already-normalized record is the base.
        assert_eq!(img3.author.as_deref(), Some("Ann"));
        assert_eq!(img3.filename.as_deref(), Some("IMG3.jpg"));
        assert_eq!(img3.dl_status, DownloadStatus::Downloaded);
    }

    #[test]
    fn test_normalization_without_normalized_base_uses_first_key() {
        let mut upper = record("IMG4");
        upper.author = Some("first".to_string());
        let mut dotted = record("img4.png");
        dotted.author = Some("second".to_string());
        dotted.description = Some("from the second".to_string());

        let result = normalize_with(inventory([upper, dotted]), &only_a);
        let img4 = &result["img4"];
        assert_eq!(img4.author.as_deref(), Some("first"));
        assert_eq!(img4.description.as_deref(), Some("from the second"));
    }

    #[test]
    fn test_normalize_rewrites_single_ids() {
        let result = normalize_with(inventory([record("Sunset")]), &only_a);
        assert_eq!(result["sunset"].id, "sunset");
    }

    #[test]
    fn test_non_empty_cache_wins() {
        let cached = inventory([record("cached")]);
        let result = reconcile_with(inventory([record("scanned")]), Inventory::new(), Some(cached.clone()), false, &only_a);
        assert_eq!(result, cached);
    }

    #[test]
    fn test_empty_cache_or_forced_scan_rebuilds() {
        let scanned = inventory([record("scanned")]);
        let empty = reconcile_with(scanned.clone(), Inventory::new(), Some(Inventory::new()), false, &only_a);
        assert!(empty.contains_key("scanned"));
        let forced =
            reconcile_with(scanned, Inventory::new(), Some(inventory([record("cached")])), true, &only_a);
        assert!(forced.contains_key("scanned"));
        assert!(!forced.contains_key("cached"));
    }

    #[tokio::test]
    async fn test_run_scans_reads_and_saves() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("library");
        let album = root.join("album_fav");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(album.join("img1.jpg"), [0u8; 10]).unwrap();
        let snapshots = dir.path().join("snapshots");
        std::fs::create_dir_all(&snapshots).unwrap();
        std::fs::write(
            snapshots.join("20240101T000000Z.json"),
            r#"{"img1": {"author": "Jane", "dl_status": "DOWNLOADED"}}"#,
        )
        .unwrap();
        let cache = BinaryCacheStore::new(dir.path().join("cache/inventory.bin"));

        let reconciler =
            Reconciler::new(&root, &snapshots, cache.clone()).with_scanner(Scanner::new(".JPG", ["_fav"]));
        let inventory = reconciler.run().await;
        let img1 = &inventory["img1"];
        assert_eq!(img1.author.as_deref(), Some("Jane"));
        assert_eq!(img1.classification_metadata, vec!["_fav".to_string()]);
        assert_eq!(img1.locations, vec![album.clone()]);
        assert_eq!(cache.load().await.unwrap(), inventory);

        // The cache now short-circuits: new files are not picked up.
        std::fs::write(album.join("img2.jpg"), [0u8; 10]).unwrap();
        assert!(!reconciler.run().await.contains_key("img2"));
        assert!(reconciler.clone().force_rescan(true).run().await.contains_key("img2"));
    }

    #[tokio::test]
    async fn test_write_snapshot_is_read_back() {
        let dir = TempDir::new().unwrap();
        let reconciler = Reconciler::new(dir.path().join("library"), dir.path().join("snapshots"), BinaryCacheStore::new(dir.path().join("cache.bin")));
        let mut fetched = record("img5");
        fetched.dl_status = DownloadStatus::Downloaded;
        fetched.image_url = Some("https://example.com/img5.jpg".to_string());

        let path = reconciler.write_snapshot([&fetched]).await.unwrap().unwrap();
        assert!(path.starts_with(dir.path().join("snapshots")));
        let loaded = SnapshotReader::default().load(dir.path().join("snapshots")).await;
        assert_eq!(loaded["img5"], fetched);
    }
}
