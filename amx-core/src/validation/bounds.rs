//! Index bounds and size validation
//!
//! Pure arithmetic checks with overflow protection and no I/O.

use crate::{AmxError, Result};

/// Validate that a caller-supplied index lies within `[0, bound)` on `axis`
pub fn check_position(axis: usize, index: i64, bound: usize) -> Result<usize> {
    match usize::try_from(index) {
        Ok(position) if position < bound => Ok(position),
        _ => Err(AmxError::IndexOutOfBounds { axis, index, bound }),
    }
}

/// Product of dimension sizes, `None` on overflow
pub fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Validate that a byte buffer holds exactly `count` elements of `width` bytes
pub fn check_byte_len(len: usize, count: usize, width: usize) -> Result<()> {
    let expected = count
        .checked_mul(width)
        .ok_or_else(|| AmxError::InvalidSelection("selection too large to address".into()))?;
    if len != expected {
        return Err(AmxError::InvalidSelection(format!(
            "output buffer holds {len} bytes, {expected} required"
        )));
    }
    Ok(())
}
