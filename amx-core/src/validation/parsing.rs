//! Parsing utilities for AMX metadata strings
//!
//! Pure parsing functions for the textual forms stored in file metadata.
//! No I/O dependencies.

use crate::{AmxError, Result};

/// Parse a textual tuple such as `(25, 25)`, `(25,)` or a bare `25`
///
/// Returns the dimension sizes in order. Every dimension must be a
/// positive integer and at least one dimension must be present.
pub fn parse_shape_tuple(text: &str) -> Result<Vec<usize>> {
    let malformed = || AmxError::MalformedShape(text.to_string());

    let trimmed = text.trim();
    let inner = match (trimmed.strip_prefix('('), trimmed.strip_suffix(')')) {
        (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
        (None, None) => trimmed,
        _ => return Err(malformed()),
    };

    // A single trailing comma is how one-element tuples are written
    let inner = inner.trim();
    let inner = inner.strip_suffix(',').unwrap_or(inner);
    if inner.trim().is_empty() {
        return Err(malformed());
    }

    let mut dims = Vec::new();
    for part in inner.split(',') {
        let dim = parse_usize(part.trim()).ok_or_else(malformed)?;
        if dim == 0 {
            return Err(malformed());
        }
        dims.push(dim);
    }

    Ok(dims)
}

/// Parse a usize from a string of ASCII digits
///
/// Rejects signs, empty strings and anything that would overflow.
pub fn parse_usize(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<usize>().ok()
}
