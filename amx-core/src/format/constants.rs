//! Metadata keys and magic bytes for AMX files

/// Schema metadata key holding the textual shape tuple
pub const SHAPE_KEY: &str = "SHAPE";

/// Schema metadata key holding the format version string
pub const OMX_VERSION_KEY: &str = "OMX_VERSION";

/// Version string written into new files
pub const OMX_VERSION: &str = "0.3.0a";

/// Prefix of the metadata keys holding embedded lookup arrays
pub const LOOKUP_KEY_PREFIX: &str = "LOOKUP:";

/// Schema metadata key holding the JSON lookup-to-axis binding
pub const LOOKUP_AXES_KEY: &str = "LOOKUP_AXES";

/// Leading magic bytes of a Parquet file
pub const PARQUET_MAGIC: [u8; 4] = *b"PAR1";

/// Leading magic bytes of an Arrow IPC file
pub const ARROW_IPC_MAGIC: [u8; 6] = *b"ARROW1";

/// Metadata key for a lookup name
pub fn lookup_key(name: &str) -> String {
    format!("{LOOKUP_KEY_PREFIX}{name}")
}
