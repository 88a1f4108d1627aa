//! Raw byte scanning over DPS responses.
//!
//! Responses are drained into a fixed scratch buffer and never parsed as
//! HTTP or JSON; the fields we need are pulled out with an exact substring
//! search. Brittle on purpose: the two response shapes are fixed, and this
//! layer assumes no parser is available.

/// First occurrence of `look_for` in `buffer` at or after `start`.
///
/// Returns `None` when absent, and also when `look_for` is longer than the
/// whole buffer.
pub fn index_of(buffer: &[u8], look_for: &[u8], start: usize) -> Option<usize> {
    if look_for.is_empty() || look_for.len() > buffer.len() {
        return None;
    }

    for pos in start..buffer.len() {
        if buffer.len() - pos < look_for.len() {
            return None;
        }

        if buffer[pos..pos + look_for.len()] == *look_for {
            return Some(pos);
        }
    }

    None
}

/// Slice out the quoted value following `marker`.
///
/// Finds `marker`, then the closing `"` starting one past the first value
/// byte (so the value is assumed non-empty), and returns the bytes between.
pub fn extract_after<'a>(buffer: &'a [u8], marker: &[u8]) -> Option<&'a [u8]> {
    let value_start = index_of(buffer, marker, 0)? + marker.len();
    let value_end = index_of(buffer, b"\"", value_start + 1)?;
    Some(&buffer[value_start..value_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_of_finds_first_match() {
        assert_eq!(index_of(b"needle in a needle stack", b"needle", 0), Some(0));
        assert_eq!(index_of(b"hay needle hay", b"needle", 0), Some(4));
        assert_eq!(index_of(b"needle in a needle stack", b"needle", 1), Some(12));
    }

    #[test]
    fn index_of_misses() {
        assert_eq!(index_of(b"haystack", b"needle", 0), None);
        // Needle longer than the whole buffer.
        assert_eq!(index_of(b"hay", b"needle", 0), None);
        // Needle longer than the remaining tail.
        assert_eq!(index_of(b"xxneed", b"needle", 0), None);
    }

    #[test]
    fn extract_after_pulls_the_quoted_value() {
        let body = br#"HTTP/1.1 200 OK

{"operationId":"4.abc123","status":"assigning"}"#;
        assert_eq!(
            extract_after(body, b"{\"operationId\":\""),
            Some(&b"4.abc123"[..])
        );
    }

    #[test]
    fn extract_after_yields_exact_hostname() {
        let body = br#"...{"assignedHub":"myhub.azure-devices.net","other":1}..."#;
        assert_eq!(
            extract_after(body, b"\"assignedHub\":\""),
            Some(&b"myhub.azure-devices.net"[..])
        );
    }

    #[test]
    fn extract_after_reports_missing_marker() {
        let body = br#"{"errorCode":401002,"message":"Unauthorized"}"#;
        assert_eq!(extract_after(body, b"\"assignedHub\":\""), None);
    }

    #[test]
    fn extract_after_reports_missing_close_quote() {
        assert_eq!(extract_after(b"{\"assignedHub\":\"trunc", b"\"assignedHub\":\""), None);
    }
}
