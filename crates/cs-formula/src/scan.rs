//! Parsing primitives for the serialized formula encoding.
//!
//! The encoding is ASCII; all scanning works on bytes.

use cs_core::{Error, Result};

/// Substring strictly between the first `open` delimiter and its matching
/// `close` delimiter, where matching respects nesting.
///
/// When `open` and `close` are the same character (quoting), matching is
/// first-occurrence-to-last-occurrence instead.
pub fn extract_delimited(open: char, close: char, s: &str) -> Result<&str> {
    let first = s.find(open).ok_or_else(|| {
        Error::MalformedEncoding(format!("open delimiter '{open}' not found in {s:?}"))
    })?;

    if open == close {
        return match s.rfind(close) {
            Some(last) if last > first => Ok(&s[first + 1..last]),
            _ => Err(Error::MalformedEncoding(format!(
                "closing delimiter '{close}' not found in {s:?}"
            ))),
        };
    }

    let mut level = 0usize;
    for (i, b) in s.bytes().enumerate().skip(first + 1) {
        if b == open as u8 {
            level += 1;
        } else if b == close as u8 {
            if level == 0 {
                return Ok(&s[first + 1..i]);
            }
            level -= 1;
        }
    }
    Err(Error::MalformedEncoding(format!("closing delimiter '{close}' not found in {s:?}")))
}

/// Split on a single-character delimiter, preserving empty fields.
pub fn split_fields(s: &str, delimiter: char) -> Vec<&str> {
    s.split(delimiter).collect()
}

/// Parse the longest leading decimal-float prefix of `s`.
///
/// Trailing junk is tolerated — an argument field may carry leftover
/// delimiter characters from the enclosing encoding.
pub fn parse_real_prefix(s: &str) -> Result<f64> {
    let t = s.trim_start();
    let b = t.as_bytes();
    let mut end = 0;
    let mut digits = 0usize;

    if end < b.len() && (b[end] == b'+' || b[end] == b'-') {
        end += 1;
    }
    while end < b.len() && b[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < b.len() && b[end] == b'.' {
        end += 1;
        while end < b.len() && b[end].is_ascii_digit() {
            end += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return Err(Error::MalformedEncoding(format!("invalid number: {s:?}")));
    }
    if end < b.len() && (b[end] == b'e' || b[end] == b'E') {
        let mut e_end = end + 1;
        if e_end < b.len() && (b[e_end] == b'+' || b[e_end] == b'-') {
            e_end += 1;
        }
        let exp_digits_start = e_end;
        while e_end < b.len() && b[e_end].is_ascii_digit() {
            e_end += 1;
        }
        if e_end > exp_digits_start {
            end = e_end;
        }
    }
    t[..end]
        .parse::<f64>()
        .map_err(|_| Error::MalformedEncoding(format!("invalid number: {s:?}")))
}
