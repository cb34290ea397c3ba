use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use hoard_record::{AssetRecord, DownloadStatus, ModStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;

/// On-disk layout of one record. Changing this struct means bumping
/// [`SCHEMA_VERSION`](crate::SCHEMA_VERSION).
#[derive(Serialize, Deserialize)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub(crate) struct RecordRow {
    id: String,
    image_name: Option<String>,
    author: Option<String>,
    description: Option<String>,
    resolution: Option<String>,
    image_date: Option<String>,
    filename: Option<String>,
    file_size: Option<String>,
    locations: Vec<PathBuf>,
    page_url: Option<String>,
    image_url: Option<String>,
    dl_status: String,
    mod_status: String,
    /// Nanoseconds since the Unix epoch, UTC.
    downloaded_on: Option<i128>,
    /// Whole seconds and sub-second nanoseconds.
    download_duration: Option<(u64, u32)>,
    error_info: Option<String>,
    classification_metadata: Vec<String>,
}
impl From<&AssetRecord> for RecordRow {
    fn from(record: &AssetRecord) -> Self {
        Self {
            id: record.id.clone(),
            image_name: record.image_name.clone(),
            author: record.author.clone(),
            description: record.description.clone(),
            resolution: record.resolution.clone(),
            image_date: record.image_date.clone(),
            filename: record.filename.clone(),
            file_size: record.file_size.clone(),
            locations: record.locations.clone(),
            page_url: record.page_url.clone(),
            image_url: record.image_url.clone(),
            dl_status: record.dl_status.as_str().to_string(),
            mod_status: record.mod_status.as_str().to_string(),
            downloaded_on: record.downloaded_on.map(OffsetDateTime::unix_timestamp_nanos),
            download_duration: record.download_duration.map(|d| (d.as_secs(), d.subsec_nanos())),
            error_info: record.error_info.clone(),
            classification_metadata: record.classification_metadata.clone(),
        }
    }
}
impl TryFrom<RecordRow> for AssetRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            image_name: row.image_name,
            author: row.author,
            description: row.description,
            resolution: row.resolution,
            image_date: row.image_date,
            filename: row.filename,
            file_size: row.file_size,
            locations: row.locations,
            page_url: row.page_url,
            image_url: row.image_url,
            dl_status: row.dl_status.parse::<DownloadStatus>().or_raise(|| ErrorKind::InvalidData("dl_status"))?,
            mod_status: row.mod_status.parse::<ModStatus>().or_raise(|| ErrorKind::InvalidData("mod_status"))?,
            downloaded_on: row
                .downloaded_on
                .map(OffsetDateTime::from_unix_timestamp_nanos)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("downloaded_on"))?,
            download_duration: row.download_duration.map(|(secs, nanos)| Duration::new(secs, nanos)),
            error_info: row.error_info,
            classification_metadata: row.classification_metadata,
        })
    }
}
