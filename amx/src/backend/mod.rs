//! Storage backends for the two container sub-formats
//!
//! - [`columnar::ColumnarBackend`]: Parquet, decoded one row group at a time
//! - [`mapped::MappedBackend`]: uncompressed Arrow IPC, addressed in place
//!   through a read-only memory mapping (requires the `mmap` feature)

pub mod columnar;
#[cfg(feature = "mmap")]
pub mod mapped;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use amx_core::{AmxError, BackendKind, DType, Result, StorageBackend, ARROW_IPC_MAGIC, PARQUET_MAGIC};
use arrow_array::Array;
use arrow_buffer::Buffer;
use arrow_schema::SchemaRef;

pub use columnar::ColumnarBackend;
#[cfg(feature = "mmap")]
pub use mapped::MappedBackend;

/// Detect the container sub-format from the leading magic bytes
pub fn sniff(path: &Path) -> Result<BackendKind> {
    let mut file = File::open(path)?;
    let mut head = [0u8; ARROW_IPC_MAGIC.len()];
    let mut filled = 0;
    while filled < head.len() {
        match file.read(&mut head[filled..])? {
            0 => break,
            n => filled += n,
        }
    }

    let head = &head[..filled];
    if head.starts_with(&ARROW_IPC_MAGIC) {
        Ok(BackendKind::Mapped)
    } else if head.starts_with(&PARQUET_MAGIC) {
        Ok(BackendKind::Columnar)
    } else {
        Err(AmxError::UnknownFormat)
    }
}

/// Open the backend for `kind`, returning it with the container schema
pub fn open_backend(path: &Path, kind: BackendKind) -> Result<(Box<dyn StorageBackend>, SchemaRef)> {
    match kind {
        BackendKind::Columnar => {
            let backend = ColumnarBackend::open(path)?;
            let schema = backend.schema().clone();
            Ok((Box::new(backend), schema))
        }
        #[cfg(feature = "mmap")]
        BackendKind::Mapped => {
            let backend = MappedBackend::open(path)?;
            let schema = backend.schema().clone();
            Ok((Box::new(backend), schema))
        }
        #[cfg(not(feature = "mmap"))]
        BackendKind::Mapped => Err(AmxError::backend_io(
            "opening mapped file",
            "built without the `mmap` feature",
        )),
    }
}

/// Raw value bytes of a fixed-width, null-free array
///
/// The returned buffer shares memory with the array; nothing is copied.
pub(crate) fn value_bytes(array: &dyn Array, dtype: DType, column: &str) -> Result<Buffer> {
    let unsupported = |reason: String| AmxError::UnsupportedColumn {
        column: column.to_string(),
        reason,
    };

    if array.null_count() > 0 {
        return Err(unsupported(format!("{} null values", array.null_count())));
    }

    let width = dtype.size_bytes();
    let data = array.to_data();
    if data.data_type().primitive_width() != Some(width) || data.buffers().len() != 1 {
        return Err(unsupported(format!(
            "stored as {} but registered as {dtype}",
            data.data_type()
        )));
    }

    let start = data.offset() * width;
    let len = data.len() * width;
    let buffer = &data.buffers()[0];
    if start + len > buffer.len() {
        return Err(unsupported("value buffer shorter than its length".into()));
    }
    Ok(buffer.slice_with_length(start, len))
}

/// Index of the chunk containing `offset`, given ascending chunk start rows
///
/// `starts` has one entry per chunk plus the total row count at the end.
pub(crate) fn chunk_of(starts: &[usize], offset: usize) -> Result<usize> {
    let total = starts.last().copied().unwrap_or(0);
    if offset >= total {
        return Err(AmxError::backend_io(
            "locating element",
            format!("offset {offset} beyond column length {total}"),
        ));
    }
    Ok(starts.partition_point(|&s| s <= offset) - 1)
}
