//! Matrix element type constraints
//!
//! Defines which Rust types can receive gathered matrix values.

use crate::format::DType;

/// Trait for types that can be stored as matrix elements
///
/// Elements are plain fixed-width values whose raw bytes can be copied
/// straight out of a column buffer. Every implementor maps to exactly one
/// [`DType`]; no widening or narrowing happens on read.
pub trait MatrixElement:
    bytemuck::Pod + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    /// The stored element type this Rust type corresponds to
    const DTYPE: DType;
}

macro_rules! impl_matrix_element {
    ($($type:ty => $dtype:ident),* $(,)?) => {
        $(
            impl MatrixElement for $type {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

impl_matrix_element!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);
