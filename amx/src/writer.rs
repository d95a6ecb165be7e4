//! Matrix writer for both sub-formats
//!
//! Collects flattened variables and lookups in memory, validates them
//! against the shape, and writes a single file carrying the `SHAPE`,
//! `OMX_VERSION`, `LOOKUP:<name>` and `LOOKUP_AXES` metadata keys.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use amx_core::{
    lookup_key, AmxError, Label, Result, Shape, LOOKUP_AXES_KEY, OMX_VERSION, OMX_VERSION_KEY,
    SHAPE_KEY,
};
use arrow_array::{ArrayRef, PrimitiveArray, RecordBatch};
use arrow_ipc::writer::FileWriter;
use arrow_schema::{ArrowError, Field, Schema, SchemaRef};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::config::{ColumnCompression, WriteOptions};
use crate::lookup::{encode_labels, LookupArray};
use crate::materialize::ArrayElement;
use crate::schema::dtype_from_arrow;

/// Builder for new matrix files
#[derive(Debug, Clone)]
pub struct MatrixWriter {
    shape: Shape,
    columns: Vec<(String, ArrayRef)>,
    lookups: Vec<LookupArray>,
}

fn write_error(path: &Path) -> impl Fn(ArrowError) -> AmxError + '_ {
    move |e| AmxError::backend_io(format!("writing {}", path.display()), e)
}

impl MatrixWriter {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            columns: Vec::new(),
            lookups: Vec::new(),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Add a variable from flattened row-major values
    pub fn add_variable<T: ArrayElement>(
        &mut self,
        name: impl Into<String>,
        values: Vec<T>,
    ) -> Result<&mut Self> {
        let array: ArrayRef = Arc::new(PrimitiveArray::<T::Arrow>::from_iter_values(values));
        self.add_array(name, array)
    }

    /// Add a variable from an Arrow array of a fixed-width numeric type
    pub fn add_array(&mut self, name: impl Into<String>, array: ArrayRef) -> Result<&mut Self> {
        let name = name.into();
        let unsupported = |reason: String| AmxError::UnsupportedColumn {
            column: name.clone(),
            reason,
        };

        if self.columns.iter().any(|(existing, _)| *existing == name) {
            return Err(unsupported("variable already added".into()));
        }
        if dtype_from_arrow(array.data_type()).is_none() {
            return Err(unsupported(format!(
                "{} is not a fixed-width numeric type",
                array.data_type()
            )));
        }
        if array.null_count() > 0 {
            return Err(unsupported(format!("{} null values", array.null_count())));
        }
        let expected = self.shape.num_elements();
        if array.len() != expected {
            return Err(AmxError::ShapeMismatch {
                variable: name,
                expected,
                actual: array.len(),
            });
        }

        self.columns.push((name, array));
        Ok(self)
    }

    /// Add a lookup, optionally bound to an axis
    pub fn add_lookup(
        &mut self,
        name: impl Into<String>,
        labels: Vec<Label>,
        axis: Option<usize>,
    ) -> Result<&mut Self> {
        let lookup = LookupArray::new(name, labels, axis)?;
        if self.lookups.iter().any(|l| l.name() == lookup.name()) {
            return Err(AmxError::UnsupportedColumn {
                column: lookup_key(lookup.name()),
                reason: "lookup already added".into(),
            });
        }
        if let Some(axis) = axis {
            let bound = self.shape.dim(axis).unwrap_or(0);
            if lookup.len() != bound {
                return Err(AmxError::LookupAxisMismatch {
                    lookup: lookup.name().to_string(),
                    axis,
                    len: lookup.len(),
                    bound,
                });
            }
            if let Some(first) = self.lookups.iter().find(|l| l.axis() == Some(axis)) {
                return Err(AmxError::AmbiguousLookupBinding {
                    axis,
                    first: first.name().to_string(),
                    second: lookup.name().to_string(),
                });
            }
        }
        self.lookups.push(lookup);
        Ok(self)
    }

    fn schema(&self) -> Result<SchemaRef> {
        let mut metadata = HashMap::new();
        metadata.insert(SHAPE_KEY.to_string(), self.shape.encode());
        metadata.insert(OMX_VERSION_KEY.to_string(), OMX_VERSION.to_string());

        let mut axes = BTreeMap::new();
        for lookup in &self.lookups {
            metadata.insert(lookup_key(lookup.name()), encode_labels(lookup.name(), lookup.labels())?);
            if let Some(axis) = lookup.axis() {
                axes.insert(lookup.name().to_string(), axis);
            }
        }
        if !axes.is_empty() {
            let json = serde_json::to_string(&axes)
                .map_err(|e| AmxError::backend_io("encoding lookup axes", e))?;
            metadata.insert(LOOKUP_AXES_KEY.to_string(), json);
        }

        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|(name, array)| Field::new(name, array.data_type().clone(), false))
            .collect();
        Ok(Arc::new(Schema::new_with_metadata(fields, metadata)))
    }

    fn batch(&self, path: &Path) -> Result<RecordBatch> {
        if self.columns.is_empty() {
            return Err(AmxError::EmptySchema);
        }
        let arrays = self.columns.iter().map(|(_, a)| a.clone()).collect();
        RecordBatch::try_new(self.schema()?, arrays).map_err(write_error(path))
    }

    fn create(path: &Path, options: &WriteOptions) -> Result<BufWriter<File>> {
        if path.exists() && !options.overwrite {
            return Err(AmxError::AlreadyExists(path.display().to_string()));
        }
        Ok(BufWriter::new(File::create(path)?))
    }

    /// Write a compressed, row-grouped Parquet file
    pub fn write_columnar(&self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        let path = path.as_ref();
        let batch = self.batch(path)?;
        let compression = match options.compression {
            ColumnCompression::Uncompressed => Compression::UNCOMPRESSED,
            ColumnCompression::Snappy => Compression::SNAPPY,
            ColumnCompression::Zstd(level) => Compression::ZSTD(
                ZstdLevel::try_new(level).map_err(|e| AmxError::backend_io("configuring zstd", e))?,
            ),
        };
        let props = WriterProperties::builder()
            .set_max_row_group_size(options.row_group_size.max(1))
            .set_compression(compression)
            .build();

        let out = Self::create(path, options)?;
        let parquet_error = |e: ParquetError| {
            AmxError::backend_io(format!("writing {}", path.display()), e)
        };
        let mut writer =
            ArrowWriter::try_new(out, batch.schema(), Some(props)).map_err(parquet_error)?;
        writer.write(&batch).map_err(parquet_error)?;
        let mut out = writer.into_inner().map_err(parquet_error)?;
        out.flush()?;

        debug!(
            path = %path.display(),
            variables = self.columns.len(),
            lookups = self.lookups.len(),
            row_group_size = options.row_group_size,
            "wrote columnar matrix file"
        );
        Ok(())
    }

    /// Write an uncompressed Arrow IPC file suitable for memory mapping
    pub fn write_mapped(&self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        let path = path.as_ref();
        let batch = self.batch(path)?;

        let out = Self::create(path, options)?;
        let mut writer = FileWriter::try_new(out, &batch.schema()).map_err(write_error(path))?;
        let rows = batch.num_rows();
        let step = options.batch_size.unwrap_or(rows).max(1);
        let mut offset = 0;
        while offset < rows {
            let len = step.min(rows - offset);
            writer
                .write(&batch.slice(offset, len))
                .map_err(write_error(path))?;
            offset += len;
        }
        let mut out = writer.into_inner().map_err(write_error(path))?;
        out.flush()?;

        debug!(
            path = %path.display(),
            variables = self.columns.len(),
            lookups = self.lookups.len(),
            batches = rows.div_ceil(step),
            "wrote mapped matrix file"
        );
        Ok(())
    }
}
