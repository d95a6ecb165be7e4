//! Mapped backend over uncompressed Arrow IPC files
//!
//! The whole file is mapped read-only and wrapped as one Arrow [`Buffer`].
//! Record batches are decoded from the footer without copying, so every
//! column's values are byte slices of the mapping and a fetch copies only
//! the selected elements.

use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

use amx_core::{
    AmxError, BackendKind, DType, GatherPlan, IoCounters, IoStats, Result, StorageBackend,
    ARROW_IPC_MAGIC,
};
use arrow_array::RecordBatch;
use arrow_buffer::Buffer;
use arrow_ipc::convert::fb_to_schema;
use arrow_ipc::reader::{read_footer_length, FileDecoder};
use arrow_ipc::{root_as_footer, root_as_message, Block};
use arrow_schema::SchemaRef;
use memmap2::MmapOptions;
use tracing::{debug, trace};

use super::{chunk_of, value_bytes};

const TRAILER_LEN: usize = 10;
const CONTINUATION_MARKER: [u8; 4] = [0xff; 4];

/// Backend addressing an Arrow IPC file in place
#[derive(Debug)]
pub struct MappedBackend {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    /// First row of each batch, followed by the total row count
    batch_starts: Vec<usize>,
    stats: IoCounters,
}

fn ipc_error(context: &str, source: impl std::fmt::Display) -> AmxError {
    AmxError::backend_io(context, source.to_string())
}

impl MappedBackend {
    /// Map the file at `path` and decode its footer and batch headers
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and owned by the Buffer built below;
        // the file must not be truncated by another process while it is open
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let len = mmap.len();
        if len < 2 * ARROW_IPC_MAGIC.len() + TRAILER_LEN
            || mmap[len - ARROW_IPC_MAGIC.len()..] != ARROW_IPC_MAGIC
        {
            return Err(AmxError::backend_io("reading arrow file", "missing ARROW1 trailer"));
        }

        let ptr = NonNull::new(mmap.as_ptr() as *mut u8)
            .ok_or_else(|| AmxError::backend_io("mapping arrow file", "null mapping"))?;
        // SAFETY: ptr and len describe the live mapping, which the Arc keeps
        // alive for as long as any slice of the buffer exists
        let buffer = unsafe { Buffer::from_custom_allocation(ptr, len, Arc::new(mmap)) };

        Self::from_buffer(buffer)
    }

    fn from_buffer(buffer: Buffer) -> Result<Self> {
        let bytes = buffer.as_slice();
        let trailer_start = bytes.len() - TRAILER_LEN;
        let mut trailer = [0u8; TRAILER_LEN];
        trailer.copy_from_slice(&bytes[trailer_start..]);
        let footer_len =
            read_footer_length(trailer).map_err(|e| AmxError::backend_io("reading arrow footer", e))?;
        if footer_len > trailer_start {
            return Err(AmxError::backend_io("reading arrow footer", "footer longer than file"));
        }
        let footer = root_as_footer(&bytes[trailer_start - footer_len..trailer_start])
            .map_err(|e| ipc_error("reading arrow footer", e))?;
        let fb_schema = footer
            .schema()
            .ok_or_else(|| AmxError::backend_io("reading arrow footer", "footer has no schema"))?;
        let schema: SchemaRef = Arc::new(fb_to_schema(fb_schema));

        let mut decoder = FileDecoder::new(schema.clone(), footer.version());
        for block in footer.dictionaries().iter().flatten() {
            let data = block_data(&buffer, block)?;
            decoder
                .read_dictionary(block, &data)
                .map_err(|e| AmxError::backend_io("reading arrow dictionary", e))?;
        }

        let mut batches = Vec::new();
        let mut batch_starts = vec![0usize];
        for block in footer.recordBatches().iter().flatten() {
            let data = block_data(&buffer, block)?;
            reject_compressed(&data, block, &schema)?;
            let batch = decoder
                .read_record_batch(block, &data)
                .map_err(|e| AmxError::backend_io("reading arrow record batch", e))?
                .ok_or_else(|| AmxError::backend_io("reading arrow record batch", "empty block"))?;
            batch_starts.push(batch_starts[batch_starts.len() - 1] + batch.num_rows());
            batches.push(batch);
        }

        debug!(
            batches = batches.len(),
            rows = batch_starts[batch_starts.len() - 1],
            "mapped arrow file"
        );
        Ok(Self {
            schema,
            batches,
            batch_starts,
            stats: IoCounters::default(),
        })
    }

    /// Arrow schema of the file, including its key/value metadata
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn column_values(&self, batch: usize, column: usize, dtype: DType) -> Result<Buffer> {
        let name = self
            .schema
            .fields()
            .get(column)
            .map(|f| f.name().as_str())
            .unwrap_or("?");
        value_bytes(self.batches[batch].column(column).as_ref(), dtype, name)
    }
}

/// Metadata plus body of one block, sliced from the mapping
fn block_data(buffer: &Buffer, block: &Block) -> Result<Buffer> {
    let offset = usize::try_from(block.offset()).ok();
    let len = usize::try_from(block.metaDataLength())
        .ok()
        .zip(usize::try_from(block.bodyLength()).ok())
        .and_then(|(meta, body)| meta.checked_add(body));
    let span = offset.zip(len).filter(|&(offset, len)| {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= buffer.len())
    });
    match span {
        Some((offset, len)) => Ok(buffer.slice_with_length(offset, len)),
        _ => Err(AmxError::backend_io(
            "reading arrow block",
            format!("block at {} exceeds file length {}", block.offset(), buffer.len()),
        )),
    }
}

/// Compressed bodies would be decoded into fresh memory rather than
/// addressed in the mapping
fn reject_compressed(data: &Buffer, block: &Block, schema: &SchemaRef) -> Result<()> {
    let meta_len = usize::try_from(block.metaDataLength()).unwrap_or(0).min(data.len());
    let meta = &data.as_slice()[..meta_len];
    let prefix = if meta.starts_with(&CONTINUATION_MARKER) { 8 } else { 4 };
    if meta.len() < prefix {
        return Err(AmxError::backend_io("reading arrow message", "truncated message header"));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&meta[prefix - 4..prefix]);
    let message_len = (i32::from_le_bytes(len_bytes).max(0) as usize).min(meta.len() - prefix);

    let message = root_as_message(&meta[prefix..prefix + message_len])
        .map_err(|e| ipc_error("reading arrow message", e))?;
    let compressed = message
        .header_as_record_batch()
        .and_then(|batch| batch.compression())
        .is_some();
    if compressed {
        let column = schema
            .fields()
            .first()
            .map(|f| f.name().clone())
            .unwrap_or_default();
        return Err(AmxError::UnsupportedColumn {
            column,
            reason: "record batch body is compressed and cannot be memory mapped".into(),
        });
    }
    Ok(())
}

impl StorageBackend for MappedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mapped
    }

    fn num_rows(&self) -> usize {
        self.batch_starts[self.batch_starts.len() - 1]
    }

    fn column_len(&self, column: usize) -> usize {
        self.batches.iter().map(|b| b.column(column).len()).sum()
    }

    fn fetch(&self, column: usize, dtype: DType, plan: &GatherPlan, out: &mut [u8]) -> Result<()> {
        let width = dtype.size_bytes();
        let mut values: Vec<Option<Buffer>> = vec![None; self.batches.len()];

        for (slot, offset) in plan.offsets().enumerate() {
            let batch = chunk_of(&self.batch_starts, offset)?;
            if values[batch].is_none() {
                values[batch] = Some(self.column_values(batch, column, dtype)?);
            }
            if let Some(bytes) = &values[batch] {
                let at = (offset - self.batch_starts[batch]) * width;
                out[slot * width..(slot + 1) * width]
                    .copy_from_slice(&bytes.as_slice()[at..at + width]);
            }
        }

        self.stats.record_reads(plan.len(), plan.len() * width);
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
        for batch in 0..self.batches.len() {
            let start = self.batch_starts[batch];
            let lo = range.start.max(start);
            let hi = range.end.min(self.batch_starts[batch + 1]);
            if lo >= hi {
                continue;
            }
            let bytes = self.column_values(batch, column, dtype)?;
            let src = &bytes.as_slice()[(lo - start) * width..(hi - start) * width];
            out[(lo - range.start) * width..(hi - range.start) * width].copy_from_slice(src);
            self.stats.record_read(src.len());
            trace!(batch, rows = hi - lo, "copied contiguous slice");
        }
        Ok(())
    }

    fn io_stats(&self) -> IoStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use amx_core::{resolve, NoLookups, Selection, Shape};
    use arrow_array::{ArrayRef, Float64Array};
    use arrow_ipc::writer::{FileWriter, IpcWriteOptions};
    use arrow_ipc::CompressionType;
    use arrow_schema::{DataType, Field, Schema};

    fn write_ipc(path: &Path, values: Vec<f64>, batch_rows: usize, compress: bool) {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Float64, false)]));
        let mut options = IpcWriteOptions::default();
        if compress {
            options = options.try_with_compression(Some(CompressionType::ZSTD)).unwrap();
        }
        let mut writer =
            FileWriter::try_new_with_options(File::create(path).unwrap(), &schema, options).unwrap();
        for chunk in values.chunks(batch_rows) {
            let column: ArrayRef = Arc::new(Float64Array::from(chunk.to_vec()));
            writer
                .write(&RecordBatch::try_new(schema.clone(), vec![column]).unwrap())
                .unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_f64(backend: &MappedBackend, plan: &GatherPlan) -> Vec<f64> {
        let mut out = vec![0f64; plan.len()];
        backend
            .gather(0, DType::F64, plan, bytemuck::cast_slice_mut(&mut out))
            .unwrap();
        out
    }

    #[test]
    fn test_single_batch_contiguous_is_one_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.arrow");
        write_ipc(&path, (0..20).map(f64::from).collect(), 20, false);

        let backend = MappedBackend::open(&path).unwrap();
        assert_eq!(backend.num_batches(), 1);
        let shape = Shape::new(vec![4, 5]).unwrap();
        let plan = resolve(&shape, &[Selection::Index(2)], &NoLookups).unwrap();

        let before = backend.io_stats();
        assert_eq!(read_f64(&backend, &plan), vec![10.0, 11.0, 12.0, 13.0, 14.0]);
        let delta = backend.io_stats().since(&before);
        assert_eq!(delta.reads, 1);
        assert_eq!(delta.bytes_read, 40);
    }

    #[test]
    fn test_scattered_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.arrow");
        write_ipc(&path, (0..20).map(f64::from).collect(), 6, false);

        let backend = MappedBackend::open(&path).unwrap();
        assert_eq!(backend.num_batches(), 4);
        assert_eq!(backend.num_rows(), 20);

        let shape = Shape::new(vec![20]).unwrap();
        let plan = resolve(&shape, &[Selection::indices([19, 0, 7, 7])], &NoLookups).unwrap();
        assert_eq!(read_f64(&backend, &plan), vec![19.0, 0.0, 7.0, 7.0]);

        let run = resolve(&shape, &[Selection::range(4, 14)], &NoLookups).unwrap();
        let before = backend.io_stats();
        assert_eq!(read_f64(&backend, &run), (4..14).map(f64::from).collect::<Vec<_>>());
        // batches [0,6) [6,12) [12,18)
        assert_eq!(backend.io_stats().since(&before).reads, 3);
    }

    #[test]
    fn test_rejects_compressed_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.arrow");
        write_ipc(&path, (0..8).map(f64::from).collect(), 8, true);

        assert!(matches!(
            MappedBackend::open(&path),
            Err(AmxError::UnsupportedColumn { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.arrow");
        std::fs::write(&path, b"ARROW1\0\0garbage").unwrap();
        assert!(matches!(
            MappedBackend::open(&path),
            Err(AmxError::BackendIo { .. })
        ));
    }

    #[test]
    fn test_rejects_footer_block_beyond_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.arrow");
        write_ipc(&path, (0..8).map(f64::from).collect(), 8, false);

        let mut bytes = std::fs::read(&path).unwrap();
        let trailer_start = bytes.len() - TRAILER_LEN;
        let mut trailer = [0u8; TRAILER_LEN];
        trailer.copy_from_slice(&bytes[trailer_start..]);
        let footer_start = trailer_start - read_footer_length(trailer).unwrap();
        let (offset, body) = {
            let footer = root_as_footer(&bytes[footer_start..trailer_start]).unwrap();
            let block = footer.recordBatches().unwrap().get(0);
            (block.offset(), block.bodyLength())
        };

        // Block is { offset: i64, metaDataLength: i32, pad, bodyLength: i64 }
        let at = (footer_start..trailer_start - 24)
            .find(|&i| {
                bytes[i..i + 8] == offset.to_le_bytes() && bytes[i + 16..i + 24] == body.to_le_bytes()
            })
            .unwrap();
        bytes[at..at + 8].copy_from_slice(&i64::MAX.to_le_bytes());
        bytes[at + 16..at + 24].copy_from_slice(&i64::MAX.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            MappedBackend::open(&path),
            Err(AmxError::BackendIo { .. })
        ));
    }
}
