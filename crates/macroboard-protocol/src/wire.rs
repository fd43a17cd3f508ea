//! Discovery wire format: 16-bit length-prefixed strings.
//!
//! Each string on the wire is:
//!   [2 bytes big-endian signed length][UTF-8 bytes]

use crate::error::ProtocolError;

/// Encode `s` as a length-prefixed byte vector.
pub fn encode_string(s: &str) -> Result<Vec<u8>, ProtocolError> {
    let len = i16::try_from(s.len()).map_err(|_| ProtocolError::StringTooLong(s.len()))?;

    let mut buf = Vec::with_capacity(2 + s.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(buf)
}

/// Decode a length-prefixed string from the start of `bytes`.
///
/// Returns the string and the number of bytes consumed. Trailing bytes are
/// left untouched.
pub fn decode_string(bytes: &[u8]) -> Result<(String, usize), ProtocolError> {
    let Some(prefix) = bytes.get(..2) else {
        return Err(ProtocolError::MalformedFrame(
            "missing string length".to_string(),
        ));
    };
    let len = i16::from_be_bytes([prefix[0], prefix[1]]);
    let len = usize::try_from(len)
        .map_err(|_| ProtocolError::MalformedFrame(format!("negative string length {len}")))?;

    let end = 2 + len;
    let Some(body) = bytes.get(2..end) else {
        return Err(ProtocolError::MalformedFrame(format!(
            "string declares {len} bytes, {} available",
            bytes.len() - 2
        )));
    };
    let s = std::str::from_utf8(body)
        .map_err(|e| ProtocolError::MalformedFrame(format!("invalid UTF-8: {e}")))?;
    Ok((s.to_string(), end))
}

/// Whether `haystack` starts with `prefix`.
#[must_use]
pub fn has_prefix(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()] == *prefix
}
