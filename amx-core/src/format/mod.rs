//! File format definitions for AMX matrix files
//!
//! Pure definitions of the metadata layout: shape descriptor, element
//! types and well-known keys. No I/O operations.

pub mod constants;
pub mod dtype;
pub mod shape;

pub use constants::*;
pub use dtype::DType;
pub use shape::Shape;
