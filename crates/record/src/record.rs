use crate::status::{DownloadStatus, ModStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;

/// One cataloged asset and everything known about it.
///
/// Records are produced by the filesystem scanner, the snapshot log reader and
/// the fetch worker, then merged into the canonical inventory (see
/// [`merge`](crate::merge)). Every field has an "unset" sentinel: `None` for
/// optional values, [`DownloadStatus::NotSet`]/[`ModStatus::NotSet`] for the
/// statuses and the empty list for collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetRecord {
    /// Stable identity, derived from the file name without its extension.
    pub id: String,
    pub image_name: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub resolution: Option<String>,
    pub image_date: Option<String>,
    /// File name (including extension) as stored on disk.
    pub filename: Option<String>,
    /// Display-only size, e.g. `"12.5 KB"`. Not meant for arithmetic.
    pub file_size: Option<String>,
    /// Directories verified to contain `filename`, in discovery order.
    pub locations: Vec<PathBuf>,
    pub page_url: Option<String>,
    pub image_url: Option<String>,
    pub dl_status: DownloadStatus,
    pub mod_status: ModStatus,
    pub downloaded_on: Option<OffsetDateTime>,
    pub download_duration: Option<Duration>,
    pub error_info: Option<String>,
    /// Category tags inferred from classified directory names.
    pub classification_metadata: Vec<String>,
}
impl AssetRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    /// Appends a directory to [`locations`](Self::locations) unless it is
    /// already present. Returns `true` if it was added.
    pub fn add_location(&mut self, directory: impl Into<PathBuf>) -> bool {
        let directory = directory.into();
        if self.locations.contains(&directory) {
            return false;
        }
        self.locations.push(directory);
        true
    }

    /// Appends a tag to [`classification_metadata`](Self::classification_metadata)
    /// unless it is already present. Returns `true` if it was added.
    pub fn add_classification(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.classification_metadata.contains(&tag) {
            return false;
        }
        self.classification_metadata.push(tag);
        true
    }

    /// Fills every optional field that is still `None` from `other`.
    ///
    /// Statuses and collections are left alone; this is the narrow backfill
    /// used when recovering metadata from duplicate snapshot entries. Returns
    /// the number of fields that were filled.
    pub fn backfill_optional(&mut self, other: &AssetRecord) -> usize {
        let mut filled = 0;
        fill(&mut self.image_name, &other.image_name, &mut filled);
        fill(&mut self.author, &other.author, &mut filled);
        fill(&mut self.description, &other.description, &mut filled);
        fill(&mut self.resolution, &other.resolution, &mut filled);
        fill(&mut self.image_date, &other.image_date, &mut filled);
        fill(&mut self.filename, &other.filename, &mut filled);
        fill(&mut self.file_size, &other.file_size, &mut filled);
        fill(&mut self.page_url, &other.page_url, &mut filled);
        fill(&mut self.image_url, &other.image_url, &mut filled);
        fill(&mut self.downloaded_on, &other.downloaded_on, &mut filled);
        fill(&mut self.download_duration, &other.download_duration, &mut filled);
        fill(&mut self.error_info, &other.error_info, &mut filled);
        filled
    }
}

fn fill<T: Clone>(target: &mut Option<T>, source: &Option<T>, filled: &mut usize) {
    if target.is_none() && source.is_some() {
        *target = source.clone();
        *filled += 1;
    }
}

/// Derives a record identity from a file name by stripping its final extension.
///
/// ```
/// use hoard_record::id_from_filename;
/// assert_eq!(id_from_filename("sunset.jpg"), "sunset");
/// assert_eq!(id_from_filename("no-extension"), "no-extension");
/// assert_eq!(id_from_filename("archive.tar.gz"), "archive.tar");
/// ```
pub fn id_from_filename(filename: &str) -> String {
    Path::new(filename).file_stem().and_then(|s| s.to_str()).unwrap_or(filename).to_string()
}

/// Normalizes a key for the canonical inventory: lowercased, and everything
/// from the first `.` onwards removed.
///
/// ```
/// use hoard_record::normalize_id;
/// assert_eq!(normalize_id("IMG3.jpg"), "img3");
/// assert_eq!(normalize_id("img3"), "img3");
/// assert_eq!(normalize_id("Photo.2020.PNG"), "photo");
/// ```
pub fn normalize_id(key: &str) -> String {
    key.split('.').next().unwrap_or_default().to_lowercase()
}

/// Renders a byte count as the display string stored in `file_size`.
///
/// ```
/// use hoard_record::kb_display;
/// assert_eq!(kb_display(2048), "2.0 KB");
/// assert_eq!(kb_display(1500), "1.5 KB");
/// ```
pub fn kb_display(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_location_is_idempotent() {
        let mut record = AssetRecord::new("img1");
        assert!(record.add_location("/a"));
        assert!(!record.add_location("/a"));
        assert!(record.add_location("/b"));
        assert_eq!(record.locations, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_add_classification_is_idempotent() {
        let mut record = AssetRecord::new("img1");
        assert!(record.add_classification("wallpaper"));
        assert!(!record.add_classification("wallpaper"));
        assert_eq!(record.classification_metadata, vec!["wallpaper".to_string()]);
    }

    #[test]
    fn test_backfill_only_touches_unset_options() {
        let mut record = AssetRecord::new("img2");
        record.author = Some("Alice".to_string());
        let mut other = AssetRecord::new("img2");
        other.author = Some("Bob".to_string());
        other.description = Some("A lake".to_string());
        other.dl_status = DownloadStatus::Pending;
        other.locations = vec![PathBuf::from("/x")];

        assert_eq!(record.backfill_optional(&other), 1);
        assert_eq!(record.author.as_deref(), Some("Alice"));
        assert_eq!(record.description.as_deref(), Some("A lake"));
        assert_eq!(record.dl_status, DownloadStatus::NotSet);
        assert!(record.locations.is_empty());
    }

    #[test]
    fn test_normalize_id_edge_cases() {
        assert_eq!(normalize_id(""), "");
        assert_eq!(normalize_id(".hidden"), "");
        assert_eq!(normalize_id("MiXeD"), "mixed");
    }

    #[test]
    fn test_kb_display_rounds_to_one_decimal() {
        assert_eq!(kb_display(0), "0.0 KB");
        assert_eq!(kb_display(1024 * 1024), "1024.0 KB");
        assert_eq!(kb_display(1075), "1.0 KB");
    }
}
