//! AMX Core - N-dimensional matrix file definitions
//!
//! This crate provides the format definitions, selection model and
//! coordinate resolver for N-dimensional matrices stored as flattened
//! columns in a columnar container. It performs no I/O; the storage
//! backends live in the `amx` crate.

pub mod error;
pub mod format;
pub mod resolver;
pub mod selection;
pub mod traits;
pub mod validation;

pub use error::*;
pub use format::*;
pub use resolver::{resolve, resolve_points, GatherPlan, IndexLevel, OffsetIter};
pub use selection::{Label, LabelResolver, NoLookups, Selection};
pub use traits::*;
