//! Options for opening and writing matrix files

use amx_core::BackendKind;

/// Options controlling how a matrix file is opened
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpenOptions {
    /// Force a sub-format instead of sniffing the magic bytes
    pub format: Option<BackendKind>,
    /// Decode embedded lookup arrays at open
    pub load_lookups: bool,
}

impl OpenOptions {
    /// Force the sub-format
    pub fn with_format(mut self, format: BackendKind) -> Self {
        self.format = Some(format);
        self
    }

    /// Skip decoding lookups; label selections will then fail
    pub fn without_lookups(mut self) -> Self {
        self.load_lookups = false;
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            format: None,
            load_lookups: true,
        }
    }
}

/// Codec applied to columnar (Parquet) output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColumnCompression {
    Uncompressed,
    Snappy,
    /// Zstandard at the given level
    Zstd(i32),
}

impl Default for ColumnCompression {
    fn default() -> Self {
        ColumnCompression::Zstd(3)
    }
}

/// Options controlling how a matrix file is written
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteOptions {
    /// Maximum rows per Parquet row group
    pub row_group_size: usize,
    /// Rows per Arrow IPC record batch; `None` writes one batch
    pub batch_size: Option<usize>,
    /// Parquet codec
    pub compression: ColumnCompression,
    /// Replace an existing file at the destination
    pub overwrite: bool,
}

impl WriteOptions {
    /// Set the Parquet row group size in rows
    pub fn with_row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = rows.max(1);
        self
    }

    /// Set the Arrow IPC record batch size in rows
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = Some(rows.max(1));
        self
    }

    /// Set the Parquet codec
    pub fn with_compression(mut self, compression: ColumnCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Allow replacing an existing file
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Row group size suited to a shape: whole rows of the trailing axes,
    /// close to `target_rows`
    pub fn row_group_size_for(dims: &[usize], target_rows: usize) -> usize {
        let row_len: usize = dims.iter().skip(1).product::<usize>().max(1);
        let rows = (target_rows / row_len).max(1);
        rows * row_len
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            row_group_size: 1024 * 1024,
            batch_size: None,
            compression: ColumnCompression::default(),
            overwrite: false,
        }
    }
}
