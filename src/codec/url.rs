use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except `0-9 A-Z a-z . - _ ~` is escaped.
const TRACKER_QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes raw bytes (info hash, peer id) for a tracker query string.
///
/// ```
/// use rswarm::codec::url_encode;
///
/// assert_eq!(url_encode(&[0x00, b'A', b'~', b'%']), "%00A~%25");
/// ```
pub fn url_encode(bytes: &[u8]) -> String {
    percent_encode(bytes, TRACKER_QUERY).to_string()
}

/// Reverses [`url_encode`]. Malformed escapes are passed through literally.
pub fn url_decode(s: &str) -> Vec<u8> {
    percent_decode_str(s).collect()
}
