//! The field-level merge rule.
//!
//! Merging is asymmetric: `base` always wins unless it still holds the "unset"
//! sentinel for a field, in which case `other` fills the gap. The only field
//! treated differently is `locations`, which is the union of both sides with
//! every entry re-verified against storage.

use crate::record::AssetRecord;
use std::path::Path;

/// Answers whether a directory currently holds a file with the given name.
pub trait LocationProbe {
    fn contains(&self, directory: &Path, filename: &str) -> bool;
}

/// Checks the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct Filesystem;
impl LocationProbe for Filesystem {
    fn contains(&self, directory: &Path, filename: &str) -> bool {
        directory.join(filename).is_file()
    }
}

impl<F> LocationProbe for F
where
    F: Fn(&Path, &str) -> bool,
{
    fn contains(&self, directory: &Path, filename: &str) -> bool {
        self(directory, filename)
    }
}

/// Merges `other` into a copy of `base`, verifying locations on the real filesystem.
///
/// See [`merge_with`].
pub fn merge(base: &AssetRecord, other: &AssetRecord) -> AssetRecord {
    merge_with(base, other, &Filesystem)
}

/// Merges `other` into a copy of `base`.
///
/// Every field of `base` (except `id`) that holds its unset sentinel takes the
/// value from `other`; populated fields are never overwritten. `locations`
/// becomes the de-duplicated union of both (base order first), filtered down to
/// the directories in which `probe` confirms the merged record's `filename`
/// exists. A merged record with no filename keeps no locations.
pub fn merge_with(base: &AssetRecord, other: &AssetRecord, probe: &impl LocationProbe) -> AssetRecord {
    let mut merged = base.clone();
    merged.backfill_optional(other);
    if merged.dl_status == Default::default() {
        merged.dl_status = other.dl_status;
    }
    if merged.mod_status == Default::default() {
        merged.mod_status = other.mod_status;
    }
    if merged.classification_metadata.is_empty() {
        merged.classification_metadata = other.classification_metadata.clone();
    }

    let candidates = base.locations.iter().chain(other.locations.iter());
    merged.locations = Vec::new();
    let Some(filename) = merged.filename.clone() else {
        if base.locations.len() + other.locations.len() > 0 {
            tracing::debug!(id = %merged.id, "Dropping all locations of a record without a filename");
        }
        return merged;
    };
    for location in candidates {
        if merged.locations.contains(location) {
            continue;
        }
        if probe.contains(location, &filename) {
            merged.locations.push(location.clone());
        } else {
            tracing::debug!(id = %merged.id, location = %location.display(), "Dropping stale location");
        }
    }
    merged
}
