pub mod error;
mod fields;
mod merge;
mod record;
mod status;

pub use crate::merge::{Filesystem, LocationProbe, merge, merge_with};
pub use crate::record::{AssetRecord, id_from_filename, kb_display, normalize_id};
pub use crate::status::{DownloadStatus, ModStatus};
use std::collections::BTreeMap;

/// The canonical catalog: record identity to record, ordered by identity.
pub type Inventory = BTreeMap<String, AssetRecord>;
