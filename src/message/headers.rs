//! Content-length and transfer-encoding helpers.
//!
//! The two headers are mutually exclusive on an emitted message: setting one
//! through these helpers always removes the other.

use http::{
    HeaderMap,
    HeaderValue,
    header::{CONTENT_LENGTH, TRANSFER_ENCODING},
};

/// Declared content length, if present and well formed.
#[must_use]
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Returns `true` if a content-length header is present.
#[must_use]
pub fn is_content_length_set(headers: &HeaderMap) -> bool { headers.contains_key(CONTENT_LENGTH) }

/// Returns `true` if the transfer-encoding ends with `chunked`.
#[must_use]
pub fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Declare a fixed content length and drop any transfer-encoding.
pub fn set_content_length(headers: &mut HeaderMap, length: u64) {
    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
}

/// Switch to chunked transfer-encoding and drop any content-length.
pub fn set_chunked(headers: &mut HeaderMap) {
    headers.remove(CONTENT_LENGTH);
    headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("chunked", true)]
    #[case("gzip, chunked", true)]
    #[case("Chunked", true)]
    #[case("gzip", false)]
    fn detects_chunked_coding(#[case] value: &'static str, #[case] expected: bool) {
        let mut headers = HeaderMap::new();
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static(value));
        assert_eq!(is_chunked(&headers), expected);
    }

    #[test]
    fn content_length_and_chunked_are_exclusive() {
        let mut headers = HeaderMap::new();
        set_chunked(&mut headers);
        set_content_length(&mut headers, 5);
        assert_eq!(content_length(&headers), Some(5));
        assert!(!headers.contains_key(TRANSFER_ENCODING));

        set_chunked(&mut headers);
        assert!(!is_content_length_set(&headers));
        assert!(is_chunked(&headers));
    }

    #[test]
    fn malformed_content_length_reads_as_unset_value() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("five"));
        assert!(is_content_length_set(&headers));
        assert_eq!(content_length(&headers), None);
    }
}
