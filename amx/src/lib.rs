//! AMX - N-dimensional skim matrices over columnar containers
//!
//! This library reads and writes N-dimensional numeric matrices stored as
//! flattened row-major columns, one column per variable, in either of two
//! container sub-formats:
//!
//! - **Columnar**: compressed, row-grouped Parquet; reads decode only the
//!   row groups a selection touches
//! - **Mapped**: uncompressed Arrow IPC, memory mapped; reads copy only the
//!   selected elements
//!
//! ## Architecture
//!
//! AMX follows a definition/implementation split:
//!
//! - **amx-core**: shape codec, dtypes, selections, the coordinate resolver
//!   and the storage backend trait (no I/O)
//! - **amx**: the two backends, schema registry, lookups, materializer,
//!   [`MatrixFile`] and [`MatrixWriter`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amx::{MatrixFile, Selection};
//!
//! fn example() -> amx::Result<()> {
//!     let file = MatrixFile::open("skims.parquet")?;
//!     println!("{} variables, shape {}", file.variable_names().len(), file.shape());
//!
//!     // rows 1 and 4, every column
//!     let slice = file.get("DIST", &[Selection::indices([1, 4])])?;
//!     let dist = slice.into_typed::<f32>()?;
//!     println!("{dist}");
//!     Ok(())
//! }
//! ```

pub use amx_core::{
    // Format definitions
    lookup_key, DType, Shape, OMX_VERSION,
    // Selections
    Label, Selection,
    // Backend capability
    BackendKind, IoStats, MatrixElement, StorageBackend,
    // Error handling
    AmxError, ErrorCategory, Result,
};

pub mod backend;
pub mod config;
pub mod lookup;
pub mod materialize;
pub mod matrix_file;
pub mod schema;
pub mod writer;

pub use config::{ColumnCompression, OpenOptions, WriteOptions};
pub use lookup::{LookupArray, LookupStore};
pub use materialize::{ArrayElement, AxisIndex, AxisLabels, MatrixArray, MatrixSlice, PointTable};
pub use matrix_file::MatrixFile;
pub use schema::{SchemaRegistry, Variable};
pub use writer::MatrixWriter;
