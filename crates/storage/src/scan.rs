//! Filesystem inventory scanning.
//!
//! Walks a storage root and builds one [`AssetRecord`] per asset file name,
//! tracking every directory the file appears in and classifying it by the
//! names of the directories it lives in.

use crate::error::{ErrorKind, Result};
use crate::path::has_extension;
use derive_more::Display;
use hoard_record::{AssetRecord, DownloadStatus, Inventory, id_from_filename, kb_display};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    Asset { filename: String, size: u64 },
    Descend(PathBuf),
    Skip,
}

/// Counters collected during a single scan, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[display("{directories_visited} directories visited, {files_cataloged} files cataloged, {directories_skipped} skipped")]
pub struct ScanStats {
    pub directories_visited: u64,
    pub files_cataloged: u64,
    pub directories_skipped: u64,
}

/// Builds an [`Inventory`] from the asset files found under a storage root.
///
/// # Examples
///
/// ```no_run
/// use hoard_storage::Scanner;
///
/// # async fn example() {
/// let scanner = Scanner::new("jpg", ["wallpaper", "portrait"]);
/// let (inventory, stats) = scanner.scan("/srv/images").await;
/// println!("{} assets ({stats})", inventory.len());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Scanner {
    extension: String,
    tags: Vec<String>,
}
impl Scanner {
    /// Creates a scanner for files with `extension` (leading dot optional,
    /// case-insensitive), classifying them with `tags`.
    pub fn new<T: Into<String>>(extension: impl Into<String>, tags: impl IntoIterator<Item = T>) -> Self {
        let extension = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_string(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Recursively scans `root`.
    ///
    /// Entries are visited in file name order so that repeated scans of an
    /// unchanged tree produce identical inventories. Sub-directories whose
    /// name contains a `.` are not descended into. A directory that cannot be
    /// read is logged and skipped; a missing root yields an empty inventory.
    #[tracing::instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn scan(&self, root: impl AsRef<Path>) -> (Inventory, ScanStats) {
        let mut inventory = Inventory::new();
        let mut stats = ScanStats::default();
        let mut stack = vec![root.as_ref().to_path_buf()];

        while let Some(current) = stack.pop() {
            let entries = match Self::read_sorted(&current).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(path = %current.display(), error = %err, "Skipping unreadable directory");
                    stats.directories_skipped += 1;
                    continue;
                },
            };
            stats.directories_visited += 1;
            let tag = self.classify(&current);

            let mut descend = Vec::new();
            for entry in entries {
                match self.process_entry(&entry).await {
                    Ok(WalkEntry::Asset { filename, size }) => {
                        self.catalog(&mut inventory, &current, filename, size, tag);
                        stats.files_cataloged += 1;
                    },
                    Ok(WalkEntry::Descend(directory)) => descend.push(directory),
                    Ok(WalkEntry::Skip) => {},
                    Err(err) => {
                        tracing::warn!(path = %entry.path().display(), error = %err, "Skipping unreadable entry");
                    },
                }
            }
            // Reversed so the stack pops sub-directories in name order.
            stack.extend(descend.into_iter().rev());
        }

        tracing::info!(assets = inventory.len(), %stats, "Scan complete");
        (inventory, stats)
    }

    async fn read_sorted(directory: &Path) -> Result<Vec<DirEntry>> {
        let mut reader = fs::read_dir(directory).await.map_err(|e| ErrorKind::from_io(e, directory))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| ErrorKind::from_io(e, directory))? {
            entries.push(entry);
        }
        entries.sort_by_key(|entry| entry.file_name());
        Ok(entries)
    }

    async fn process_entry(&self, entry: &DirEntry) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| ErrorKind::from_io(e, &path))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if metadata.is_dir() {
            return Ok(match name.contains('.') {
                true => {
                    tracing::debug!(path = %path.display(), "Not descending into dot-named directory");
                    WalkEntry::Skip
                },
                false => WalkEntry::Descend(path),
            });
        }
        if metadata.is_file() && has_extension(&path, &self.extension) {
            return Ok(WalkEntry::Asset { filename: name, size: metadata.len() });
        }
        Ok(WalkEntry::Skip)
    }

    /// Returns the first configured tag the directory's name ends with,
    /// ignoring case.
    fn classify(&self, directory: &Path) -> Option<&str> {
        let name = directory.file_name()?.to_string_lossy().to_lowercase();
        self.tags.iter().map(String::as_str).find(|tag| !tag.is_empty() && name.ends_with(&tag.to_lowercase()))
    }

    fn catalog(&self, inventory: &mut Inventory, directory: &Path, filename: String, size: u64, tag: Option<&str>) {
        let id = id_from_filename(&filename);
        let record = inventory.entry(id.clone()).or_insert_with(|| {
            let mut record = AssetRecord::new(id);
            record.file_size = Some(kb_display(size));
            record.filename = Some(filename);
            record.dl_status = DownloadStatus::Downloaded;
            record
        });
        if let Some(tag) = tag {
            record.add_classification(tag);
        }
        record.add_location(directory);
    }
}
