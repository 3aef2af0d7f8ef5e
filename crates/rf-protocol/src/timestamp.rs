//! Timestamp parsing shared by every text source
//!
//! Sources write wall-clock times as `YYYY-MM-DD HH:MM:SS[.ffffff]` or with a
//! `T` separator. Python-style `,mmm` milliseconds are accepted too.

use chrono::{DateTime, NaiveDateTime};

/// Length of `YYYY-MM-DDTHH:MM:SS`
const BASE_LEN: usize = 19;

const FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a complete timestamp string
///
/// RFC 3339 strings with an offset are reduced to their local wall time.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    let normalized = text.replacen(',', ".", 1);
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
}

/// Split a timestamp off the start of a line
///
/// Returns the parsed time and the remainder of the line with leading
/// whitespace removed, or `None` if the line does not start with a timestamp.
pub fn split_leading_timestamp(line: &str) -> Option<(NaiveDateTime, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < BASE_LEN || !has_timestamp_shape(&bytes[..BASE_LEN]) {
        return None;
    }

    let mut end = BASE_LEN;
    if end < bytes.len() && (bytes[end] == b'.' || bytes[end] == b',') {
        let digits = bytes[end + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits > 0 {
            end += 1 + digits;
        }
    }

    let parsed = parse_timestamp(&line[..end])?;
    Some((parsed, line[end..].trim_start()))
}

fn has_timestamp_shape(bytes: &[u8]) -> bool {
    bytes.iter().enumerate().all(|(i, &b)| match i {
        4 | 7 => b == b'-',
        10 => b == b'T' || b == b' ',
        13 | 16 => b == b':',
        _ => b.is_ascii_digit(),
    })
}
