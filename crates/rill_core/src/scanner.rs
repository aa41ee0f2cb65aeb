//! Event boundary scanning.
//!
//! An event ends at the first blank line, i.e. two consecutive `\n`. Every
//! occurrence counts as a boundary, including one inside what a producer
//! meant as a multi-line payload; there is no escaping.

/// The blank-line separator between two events.
pub const DELIMITER: &str = "\n\n";

/// Split off the first complete event in `buffer`.
///
/// Returns the text strictly before the first delimiter and the text strictly
/// after it, or `None` when the buffer holds no complete event yet.
pub fn scan(buffer: &str) -> Option<(&str, &str)> {
    let pos = boundary(buffer, 0)?;
    Some((&buffer[..pos], &buffer[pos + DELIMITER.len()..]))
}

/// Byte position of the first delimiter starting at or after `from`.
///
/// `from` must lie on a char boundary.
pub fn boundary(buffer: &str, from: usize) -> Option<usize> {
    buffer[from..].find(DELIMITER).map(|pos| from + pos)
}

/// Where to resume searching once more text is appended to `buffer`, given
/// that `buffer` itself holds no delimiter. Only a trailing `\n` can pair up
/// with new text.
pub fn resume_point(buffer: &str) -> usize {
    if buffer.ends_with('\n') {
        buffer.len() - 1
    } else {
        buffer.len()
    }
}

/// Drain every complete event from `buffer`, returning them in order together
/// with the unconsumed tail.
pub fn scan_all(buffer: &str) -> (Vec<&str>, &str) {
    let mut events = Vec::new();
    let mut rest = buffer;
    while let Some((event, remainder)) = scan(rest) {
        events.push(event);
        rest = remainder;
    }
    (events, rest)
}
