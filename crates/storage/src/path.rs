//! Path validation and security utilities.
//!
//! Names derived from untrusted input (such as the last segment of a download
//! URL) are joined onto storage directories, so they must never be able to
//! point anywhere else.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path};

/// Validates that `name` is a single, ordinary file name.
///
/// Rejects empty names, `.` and `..`, anything containing a path separator,
/// and null bytes. Returns the name unchanged if valid.
///
/// ```
/// use hoard_storage::validate_file_name;
/// assert!(validate_file_name("sunset.jpg").is_ok());
/// assert!(validate_file_name("..").is_err());
/// assert!(validate_file_name("a/b.jpg").is_err());
/// assert!(validate_file_name("a\0b").is_err());
/// ```
pub fn validate_file_name(name: &str) -> Result<&str> {
    // Null bytes pass through Path::components() on Unix but cause
    // truncation in C-based syscalls; reject them explicitly.
    if name.contains('\0') || name.contains('\\') {
        exn::bail!(ErrorKind::InvalidFileName(name.to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(component)), None) if component == name => Ok(name),
        _ => exn::bail!(ErrorKind::InvalidFileName(name.to_string())),
    }
}

/// Whether `path` has the given extension, ignoring ASCII case. The expected
/// extension may be written with or without its leading dot.
///
/// ```
/// use hoard_storage::has_extension;
/// use std::path::Path;
/// assert!(has_extension(Path::new("a/IMG1.JPG"), ".jpg"));
/// assert!(has_extension(Path::new("img1.jpg"), "jpg"));
/// assert!(!has_extension(Path::new("img1.jpeg"), "jpg"));
/// ```
pub fn has_extension(path: &Path, expected: &str) -> bool {
    let expected = expected.trim_start_matches('.');
    !expected.is_empty()
        && path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(expected))
}
