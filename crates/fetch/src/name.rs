use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use hoard_storage::validate_file_name;
use url::Url;

/// Derives the destination file name from a download URL.
///
/// The URL must start with `protocol`. The name is the last non-empty path
/// segment, without query or fragment and without percent-decoding, and must
/// be a plain file name.
///
/// ```
/// use hoard_fetch::file_name_from_url;
/// let name = file_name_from_url("https://img.example.com/full/sunset.jpg?size=large", "https://").unwrap();
/// assert_eq!(name, "sunset.jpg");
/// assert!(file_name_from_url("ftp://example.com/sunset.jpg", "https://").is_err());
/// assert!(file_name_from_url("https://example.com/", "https://").is_err());
/// ```
pub fn file_name_from_url(url: &str, protocol: &str) -> Result<String> {
    if !url.starts_with(protocol) {
        exn::bail!(ErrorKind::InvalidUrl(url.to_string()));
    }
    let parsed = Url::parse(url).or_raise(|| ErrorKind::InvalidUrl(url.to_string()))?;
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or_raise(|| ErrorKind::NoFileName(url.to_string()))?;
    let name = validate_file_name(segment).or_raise(|| ErrorKind::NoFileName(url.to_string()))?;
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://example.com/img1.jpg", "img1.jpg")]
    #[case("https://example.com/gallery/img1.jpg", "img1.jpg")]
    #[case("https://example.com/gallery/img1.jpg/", "img1.jpg")]
    #[case("https://example.com/gallery/img1.jpg#top", "img1.jpg")]
    #[case("https://example.com/gallery/my%20image.jpg", "my%20image.jpg")]
    #[case("https://example.com/a/../img1.jpg", "img1.jpg")]
    #[case("https://example.com/download", "download")]
    fn test_derived_names(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(file_name_from_url(url, "https://").unwrap(), expected);
    }

    #[rstest]
    #[case("http://example.com/img1.jpg")]
    #[case("example.com/img1.jpg")]
    #[case("")]
    fn test_protocol_prefix_is_required(#[case] url: &str) {
        let err = file_name_from_url(url, "https://").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidUrl(_)));
    }

    #[rstest]
    #[case("https://example.com")]
    #[case("https://example.com/")]
    #[case("https://example.com//")]
    #[case("https://example.com/..")]
    fn test_no_name(#[case] url: &str) {
        let err = file_name_from_url(url, "https://").unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoFileName(_)));
    }

    #[test]
    fn test_prefix_is_configurable() {
        assert_eq!(file_name_from_url("http://example.com/img1.jpg", "http").unwrap(), "img1.jpg");
    }
}
