//! Open matrix file handle

use std::path::{Path, PathBuf};

use amx_core::{
    resolve, resolve_points, BackendKind, DType, IoStats, Result, Selection, Shape, StorageBackend,
};
use tracing::{debug, trace};

use crate::backend::{open_backend, sniff};
use crate::config::OpenOptions;
use crate::lookup::LookupStore;
use crate::materialize::{self, materialize, MatrixArray, MatrixSlice, PointTable};
use crate::schema::SchemaRegistry;

/// An open skim matrix file
///
/// Opening reads metadata only. Every read resolves its selection against
/// the shape and copies just the selected elements out of the backend. The
/// handle is immutable, so one `MatrixFile` can serve reads from several
/// threads at once.
pub struct MatrixFile {
    path: PathBuf,
    registry: SchemaRegistry,
    lookups: LookupStore,
    backend: Box<dyn StorageBackend>,
}

impl std::fmt::Debug for MatrixFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixFile")
            .field("path", &self.path)
            .field("backend", &self.backend.kind())
            .field("shape", self.registry.shape())
            .field("variables", &self.registry.variable_names())
            .field("lookups", &self.lookups.names())
            .finish()
    }
}

impl MatrixFile {
    /// Open a file, detecting its sub-format from the magic bytes
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let kind = match options.format {
            Some(kind) => kind,
            None => sniff(path)?,
        };
        let (backend, schema) = open_backend(path, kind)?;
        let registry = SchemaRegistry::from_schema(&schema, backend.as_ref())?;
        let lookups = if options.load_lookups {
            LookupStore::from_metadata(schema.metadata(), registry.shape())?
        } else {
            LookupStore::empty()
        };

        debug!(
            backend = %kind,
            shape = %registry.shape(),
            variables = registry.variables().len(),
            lookups = lookups.len(),
            "opened matrix file"
        );
        Ok(Self {
            path: path.to_path_buf(),
            registry,
            lookups,
            backend,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Variable names in column order
    pub fn variable_names(&self) -> Vec<&str> {
        self.registry.variable_names()
    }

    /// Same as [`MatrixFile::variable_names`]
    pub fn list_matrices(&self) -> Vec<&str> {
        self.variable_names()
    }

    pub fn shape(&self) -> &Shape {
        self.registry.shape()
    }

    pub fn ndim(&self) -> usize {
        self.registry.shape().ndim()
    }

    pub fn dtype_of(&self, name: &str) -> Result<DType> {
        self.registry.dtype_of(name)
    }

    pub fn omx_version(&self) -> Option<&str> {
        self.registry.omx_version()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn lookups(&self) -> &LookupStore {
        &self.lookups
    }

    /// Cumulative physical I/O since open
    pub fn io_stats(&self) -> IoStats {
        self.backend.io_stats()
    }

    /// Read a selection with the per-axis index attached
    pub fn get(&self, name: &str, selections: &[Selection]) -> Result<MatrixSlice> {
        self.get_with(name, selections, true)
    }

    /// Read a selection; one [`Selection`] per leading axis, the rest default to all
    #[tracing::instrument(level = "debug", skip(self, selections), fields(selections = selections.len()))]
    pub fn get_with(
        &self,
        name: &str,
        selections: &[Selection],
        attach_index: bool,
    ) -> Result<MatrixSlice> {
        let variable = self.registry.variable(name)?;
        let plan = resolve(self.registry.shape(), selections, &self.lookups)?;
        trace!(elements = plan.len(), shape = ?plan.shape(), "resolved selection");

        let values = materialize(self.backend.as_ref(), variable, &plan)?;
        let index = attach_index.then(|| materialize::attach_index(&plan, &self.lookups));
        Ok(MatrixSlice { values, index })
    }

    /// Read a whole variable
    pub fn get_matrix(&self, name: &str) -> Result<MatrixArray> {
        Ok(self.get_with(name, &[], false)?.values)
    }

    /// Read the elements at zipped points, one index vector per axis
    ///
    /// Point `k` is `(indexes[0][k], indexes[1][k], ...)`; the result is
    /// one-dimensional with one element per point.
    pub fn get_points(&self, name: &str, indexes: &[Vec<i64>]) -> Result<MatrixSlice> {
        let variable = self.registry.variable(name)?;
        let plan = resolve_points(self.registry.shape(), indexes)?;
        let values = materialize(self.backend.as_ref(), variable, &plan)?;
        let index = Some(materialize::attach_index(&plan, &self.lookups));
        Ok(MatrixSlice { values, index })
    }

    /// Read several variables at the same points, resolving them once
    pub fn get_points_many(&self, names: &[&str], indexes: &[Vec<i64>]) -> Result<PointTable> {
        let variables = names
            .iter()
            .map(|name| self.registry.variable(name))
            .collect::<Result<Vec<_>>>()?;
        let plan = resolve_points(self.registry.shape(), indexes)?;

        let mut columns = Vec::with_capacity(variables.len());
        for variable in variables {
            let values = materialize(self.backend.as_ref(), variable, &plan)?;
            columns.push((variable.name.clone(), values));
        }
        Ok(PointTable {
            index: materialize::attach_index(&plan, &self.lookups),
            columns,
        })
    }

    /// Release the backend, unmapping the file
    pub fn close(self) {
        debug!(path = %self.path.display(), "closing matrix file");
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_matrix_file_is_send_sync() {
        assert_send_sync::<MatrixFile>();
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MatrixFile::open(dir.path().join("absent.parquet")).unwrap_err();
        assert_eq!(err.category(), amx_core::ErrorCategory::Io);
    }
}
