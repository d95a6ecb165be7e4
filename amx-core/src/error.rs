//! Error types for AMX operations

use std::fmt;

use thiserror::Error;

use crate::format::DType;

/// Boxed source error carried by [`AmxError::BackendIo`]
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while opening or reading matrix files
#[derive(Debug, Error)]
pub enum AmxError {
    /// Shape metadata is missing or does not parse as positive integers
    #[error("malformed shape metadata: {0:?}")]
    MalformedShape(String),

    /// A column's element count disagrees with the declared shape
    #[error("variable {variable:?} holds {actual} elements but shape requires {expected}")]
    ShapeMismatch {
        variable: String,
        expected: usize,
        actual: usize,
    },

    /// The file declares no variables
    #[error("file declares no matrix variables")]
    EmptySchema,

    /// Requested variable is not present in the file
    #[error("unknown variable: {0:?}")]
    UnknownVariable(String),

    /// A lookup contains the same label twice
    #[error("lookup {lookup:?} contains duplicate label {label}")]
    DuplicateLabel { lookup: String, label: String },

    /// A requested label is absent from the lookup
    #[error("label {label} not found in lookup {lookup:?}")]
    UnknownLabel { lookup: String, label: String },

    /// Requested lookup name is not present, or no lookup is bound to the axis
    #[error("unknown lookup: {0}")]
    UnknownLookup(String),

    /// A lookup's length does not match the axis it is used on
    #[error("lookup {lookup:?} has {len} labels but axis {axis} has length {bound}")]
    LookupAxisMismatch {
        lookup: String,
        axis: usize,
        len: usize,
        bound: usize,
    },

    /// More than one lookup is bound to the same axis
    #[error("axis {axis} is bound to both {first:?} and {second:?}")]
    AmbiguousLookupBinding {
        axis: usize,
        first: String,
        second: String,
    },

    /// A resolved position falls outside `[0, bound)`
    #[error("index {index} out of bounds for axis {axis} with length {bound}")]
    IndexOutOfBounds { axis: usize, index: i64, bound: usize },

    /// A selection is structurally invalid (zero step, mismatched point lengths)
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// More per-axis selections than the matrix has axes
    #[error("{given} selections given for a {ndim}-dimensional matrix")]
    TooManySelections { given: usize, ndim: usize },

    /// Requested element type differs from the stored one
    #[error("dtype mismatch: stored {stored}, requested {requested}")]
    DTypeMismatch { stored: DType, requested: DType },

    /// A column cannot be addressed as raw fixed-width values
    #[error("unsupported column {column:?}: {reason}")]
    UnsupportedColumn { column: String, reason: String },

    /// The file is neither a Parquet nor an Arrow IPC container
    #[error("unrecognized container format")]
    UnknownFormat,

    /// Refusing to overwrite an existing output file
    #[error("output file already exists: {0}")]
    AlreadyExists(String),

    /// Underlying read or decode failure
    #[error("backend I/O error while {context}: {source}")]
    BackendIo {
        context: String,
        #[source]
        source: BoxedSource,
    },
}

/// Broad grouping of [`AmxError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// File structure or metadata problems, detected at open
    Format,
    /// Caller-supplied selection problems, detected at get
    Selection,
    /// Failures of the underlying storage
    Io,
}

impl AmxError {
    /// Wrap a storage-layer error with a short description of the operation
    pub fn backend_io<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxedSource>,
    {
        AmxError::BackendIo {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            AmxError::MalformedShape(_)
            | AmxError::ShapeMismatch { .. }
            | AmxError::EmptySchema
            | AmxError::DuplicateLabel { .. }
            | AmxError::LookupAxisMismatch { .. }
            | AmxError::AmbiguousLookupBinding { .. }
            | AmxError::UnsupportedColumn { .. }
            | AmxError::UnknownFormat => ErrorCategory::Format,
            AmxError::UnknownVariable(_)
            | AmxError::UnknownLabel { .. }
            | AmxError::UnknownLookup(_)
            | AmxError::IndexOutOfBounds { .. }
            | AmxError::InvalidSelection(_)
            | AmxError::TooManySelections { .. }
            | AmxError::DTypeMismatch { .. } => ErrorCategory::Selection,
            AmxError::AlreadyExists(_) | AmxError::BackendIo { .. } => ErrorCategory::Io,
        }
    }
}

impl From<std::io::Error> for AmxError {
    fn from(err: std::io::Error) -> Self {
        AmxError::backend_io("performing file I/O", err)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorCategory::Format => "format",
            ErrorCategory::Selection => "selection",
            ErrorCategory::Io => "io",
        };
        write!(f, "{msg}")
    }
}

/// Result type for AMX operations
pub type Result<T> = std::result::Result<T, AmxError>;
