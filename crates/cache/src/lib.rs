//! Binary cache of the reconciled inventory.
//!
//! The cache is a convenience, not a source of truth: the files in storage and
//! the snapshot logs are. If the cache is deleted, corrupt, or was written by
//! an incompatible version, it is simply rebuilt by the next full
//! reconciliation.
//!
//! # Format
//! A single file holding the whole inventory:
//! - 4-byte magic, [`MAGIC`];
//! - little-endian `u32` schema version, [`SCHEMA_VERSION`];
//! - gzip-compressed `bincode` encoding of one row per record.

pub mod error;
mod models;
mod store;

pub use crate::store::{BinaryCacheStore, MAGIC, SCHEMA_VERSION};
