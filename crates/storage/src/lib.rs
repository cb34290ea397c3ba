pub mod error;
mod path;
mod scan;

pub use crate::path::{has_extension, validate_file_name};
pub use crate::scan::{ScanStats, Scanner};
