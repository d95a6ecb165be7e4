//! Columnar backend over Parquet files
//!
//! Only the footer is read at open. Every fetch decodes the row groups its
//! plan touches, projected to the one requested column, each exactly once,
//! and drops the decoded pages before returning.

use std::collections::BTreeMap;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use amx_core::{AmxError, BackendKind, DType, GatherPlan, IoCounters, IoStats, Result, StorageBackend};
use arrow_buffer::Buffer;
use arrow_schema::SchemaRef;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
};
use parquet::arrow::ProjectionMask;
use tracing::trace;

use super::{chunk_of, value_bytes};

/// Backend reading one column at a time from a Parquet file
#[derive(Debug)]
pub struct ColumnarBackend {
    path: PathBuf,
    metadata: ArrowReaderMetadata,
    /// First row of each row group, followed by the total row count
    row_group_starts: Vec<usize>,
    stats: IoCounters,
}

/// Values of one decoded row group, possibly split across batches
struct DecodedGroup {
    chunks: Vec<Buffer>,
    starts: Vec<usize>,
    width: usize,
}

impl DecodedGroup {
    fn element(&self, row: usize) -> Result<&[u8]> {
        let chunk = chunk_of(&self.starts, row)?;
        let at = (row - self.starts[chunk]) * self.width;
        Ok(&self.chunks[chunk].as_slice()[at..at + self.width])
    }

    /// Copy rows `range` (relative to the group) into `out`, one copy per batch
    fn copy_rows(&self, range: Range<usize>, out: &mut [u8]) {
        let mut written = 0;
        for (chunk, bytes) in self.chunks.iter().enumerate() {
            let lo = range.start.max(self.starts[chunk]);
            let hi = range.end.min(self.starts[chunk + 1]);
            if lo >= hi {
                continue;
            }
            let from = (lo - self.starts[chunk]) * self.width;
            let to = (hi - self.starts[chunk]) * self.width;
            out[written..written + to - from].copy_from_slice(&bytes.as_slice()[from..to]);
            written += to - from;
        }
    }
}

impl ColumnarBackend {
    /// Read the footer of the Parquet file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let metadata = ArrowReaderMetadata::load(&file, ArrowReaderOptions::new())
            .map_err(|e| AmxError::backend_io("reading parquet footer", e))?;

        let mut row_group_starts = vec![0usize];
        let mut total = 0usize;
        for group in metadata.metadata().row_groups() {
            total += usize::try_from(group.num_rows()).map_err(|_| {
                AmxError::backend_io("reading parquet footer", "negative row group length")
            })?;
            row_group_starts.push(total);
        }

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            row_group_starts,
            stats: IoCounters::default(),
        })
    }

    /// Arrow schema of the file, including its key/value metadata
    pub fn schema(&self) -> &SchemaRef {
        self.metadata.schema()
    }

    pub fn num_row_groups(&self) -> usize {
        self.row_group_starts.len() - 1
    }

    fn column_name(&self, column: usize) -> String {
        self.schema()
            .fields()
            .get(column)
            .map(|f| f.name().clone())
            .unwrap_or_else(|| format!("#{column}"))
    }

    fn decode_row_group(
        &self,
        file: &File,
        column: usize,
        dtype: DType,
        row_group: usize,
    ) -> Result<DecodedGroup> {
        let group_rows = self.row_group_starts[row_group + 1] - self.row_group_starts[row_group];
        let file = file.try_clone()?;
        let mask = ProjectionMask::roots(self.metadata.metadata().file_metadata().schema_descr(), [column]);
        let reader = ParquetRecordBatchReaderBuilder::new_with_metadata(file, self.metadata.clone())
            .with_projection(mask)
            .with_row_groups(vec![row_group])
            .with_batch_size(group_rows.max(1))
            .build()
            .map_err(|e| AmxError::backend_io(format!("opening row group {row_group}"), e))?;

        let name = self.column_name(column);
        let mut chunks = Vec::new();
        let mut starts = vec![0usize];
        for batch in reader {
            let batch =
                batch.map_err(|e| AmxError::backend_io(format!("decoding row group {row_group}"), e))?;
            if batch.num_columns() != 1 {
                return Err(AmxError::backend_io(
                    format!("decoding row group {row_group}"),
                    format!("projection returned {} columns", batch.num_columns()),
                ));
            }
            let bytes = value_bytes(batch.column(0).as_ref(), dtype, &name)?;
            let end = starts[starts.len() - 1] + batch.num_rows();
            starts.push(end);
            chunks.push(bytes);
        }

        if starts[starts.len() - 1] != group_rows {
            return Err(AmxError::backend_io(
                format!("decoding row group {row_group}"),
                format!("expected {group_rows} rows, decoded {}", starts[starts.len() - 1]),
            ));
        }

        self.stats.record_row_group();
        trace!(row_group, column = %name, rows = group_rows, "decoded row group");
        Ok(DecodedGroup {
            chunks,
            starts,
            width: dtype.size_bytes(),
        })
    }
}

impl StorageBackend for ColumnarBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Columnar
    }

    fn num_rows(&self) -> usize {
        self.row_group_starts[self.row_group_starts.len() - 1]
    }

    fn column_len(&self, column: usize) -> usize {
        self.metadata
            .metadata()
            .row_groups()
            .iter()
            .map(|group| usize::try_from(group.column(column).num_values()).unwrap_or(0))
            .sum()
    }

    fn fetch(&self, column: usize, dtype: DType, plan: &GatherPlan, out: &mut [u8]) -> Result<()> {
        let width = dtype.size_bytes();

        // row group -> (slot in output, row within group)
        let mut wanted: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
        for (slot, offset) in plan.offsets().enumerate() {
            let group = chunk_of(&self.row_group_starts, offset)?;
            wanted
                .entry(group)
                .or_default()
                .push((slot, offset - self.row_group_starts[group]));
        }

        let file = File::open(&self.path)?;
        for (group, requests) in wanted {
            let decoded = self.decode_row_group(&file, column, dtype, group)?;
            for (slot, row) in &requests {
                out[slot * width..(slot + 1) * width].copy_from_slice(decoded.element(*row)?);
            }
            self.stats.record_read(requests.len() * width);
        }
        Ok(())
    }

    fn fetch_contiguous_range(
        &self,
        column: usize,
        dtype: DType,
        range: Range<usize>,
        out: &mut [u8],
    ) -> Result<()> {
        if range.end > self.num_rows() {
            return Err(AmxError::backend_io(
                "reading contiguous range",
                format!("range {range:?} beyond column length {}", self.num_rows()),
            ));
        }
        let width = dtype.size_bytes();
        let file = File::open(&self.path)?;
        for group in 0..self.num_row_groups() {
            let start = self.row_group_starts[group];
            let end = self.row_group_starts[group + 1];
            let lo = range.start.max(start);
            let hi = range.end.min(end);
            if lo >= hi {
                continue;
            }
            let decoded = self.decode_row_group(&file, column, dtype, group)?;
            let dest = &mut out[(lo - range.start) * width..(hi - range.start) * width];
            decoded.copy_rows(lo - start..hi - start, dest);
            self.stats.record_read(dest.len());
        }
        Ok(())
    }

    fn io_stats(&self) -> IoStats {
        self.stats.snapshot()
    }
}
