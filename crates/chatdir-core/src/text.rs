//! Byte-bounded text helpers.
//!
//! Every limit in the chat protocol is a byte count (frame size, topic
//! length, name length). These helpers cut strings to such a limit without
//! splitting a UTF-8 sequence.

/// Truncates `s` to at most `max` bytes, backing off to a char boundary.
///
/// Returns the truncated slice and whether anything was cut.
pub fn truncate_bytes(s: &str, max: usize) -> (&str, bool) {
    if s.len() <= max {
        return (s, false);
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    (&s[..end], true)
}

/// Returns the prefix of `bytes` before the first NUL (or all of it).
pub fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(pos) => &bytes[..pos],
        None => bytes,
    }
}
