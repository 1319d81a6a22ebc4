//! Percent-decoding and re-escaping of request paths.
//!
//! Paths are handled as bytes: a valid escape may decode to bytes that are not
//! UTF-8 (`%E9`), and those must survive the round trip. `urlencoding` passes
//! malformed escapes through untouched, so escapes are checked here first and
//! a bad one is reported instead.

use crate::errors::PathDecodeError;

/// Strictly percent-decode a path. `%` must be followed by two hex digits.
pub fn decode_path(path: &[u8]) -> Result<Vec<u8>, PathDecodeError> {
    let mut i = 0;
    while i < path.len() {
        if path[i] == b'%' {
            let valid = path.len() > i + 2
                && path[i + 1].is_ascii_hexdigit()
                && path[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(path.len());
                let escape = String::from_utf8_lossy(&path[i..end]).into_owned();
                return Err(PathDecodeError::InvalidEscape(escape));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    Ok(urlencoding::decode_binary(path).into_owned())
}

/// Escape a decoded path for use in a request target. `/` stays a separator,
/// every byte outside the path character set becomes `%XX`.
pub fn escape_path(path: &[u8]) -> String {
    let mut out = String::with_capacity(path.len() + 8);
    let mut rest = path;
    while !rest.is_empty() {
        let keep = rest.iter().take_while(|&&b| is_path_byte(b)).count();
        // path bytes are all ASCII
        out.extend(rest[..keep].iter().map(|&b| b as char));
        rest = &rest[keep..];

        let escape = rest.iter().take_while(|&&b| !is_path_byte(b)).count();
        out.push_str(&urlencoding::encode_binary(&rest[..escape]));
        rest = &rest[escape..];
    }
    out
}

// RFC 3986 pchar minus pct-encoded, plus the "/" separator
fn is_path_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'/' | b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*'
                | b'+' | b',' | b';' | b'=' | b':' | b'@'
        )
}
