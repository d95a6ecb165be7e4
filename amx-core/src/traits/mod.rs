//! Abstract interfaces for AMX
//!
//! Traits are pure interfaces; the I/O-backed implementations live in the
//! `amx` crate.

pub mod backend;
pub mod element;

pub use backend::{BackendKind, IoCounters, IoStats, StorageBackend};
pub use element::MatrixElement;
