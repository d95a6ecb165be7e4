//! Validation utilities
//!
//! Pure functions with no I/O dependencies.

pub mod bounds;
pub mod parsing;

pub use bounds::{check_byte_len, check_position, checked_product};
pub use parsing::{parse_shape_tuple, parse_usize};
