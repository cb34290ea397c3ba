pub mod error;
mod read;
mod write;

pub use crate::read::SnapshotReader;
pub use crate::write::SnapshotWriter;

/// File extension used for snapshot logs unless configured otherwise.
pub const DEFAULT_EXTENSION: &str = "json";
