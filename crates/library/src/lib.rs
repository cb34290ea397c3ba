//! Inventory reconciliation and batch fetching.
//!
//! [`Reconciler`] builds the canonical [`Inventory`](hoard_record::Inventory)
//! from the persisted cache, or from a fresh filesystem scan combined with
//! the snapshot logs. [`fetch`] then streams a batch of downloads against that
//! inventory, and [`run_fetch`] folds the results back and persists them.

pub mod error;
mod fetch;
mod reconcile;

pub use crate::fetch::{FetchEvent, FetchReport, fetch, fold_into, run_fetch};
pub use crate::reconcile::{Reconciler, normalize, normalize_with, reconcile, reconcile_with};
