//! Schema registry: variables, dtypes and the shape of an open file

use std::collections::HashMap;

use amx_core::{
    AmxError, DType, Result, Shape, StorageBackend, OMX_VERSION, OMX_VERSION_KEY, SHAPE_KEY,
};
use arrow_schema::{DataType, Schema};
use tracing::{debug, warn};

/// One matrix variable stored as a flattened column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub dtype: DType,
    /// Position of the column in the container schema
    pub column: usize,
}

/// Variables and shape of a matrix file, validated against each other
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    shape: Shape,
    variables: Vec<Variable>,
    by_name: HashMap<String, usize>,
    omx_version: Option<String>,
}

/// Element type for an Arrow column type, if it is fixed-width numeric
pub fn dtype_from_arrow(data_type: &DataType) -> Option<DType> {
    Some(match data_type {
        DataType::Int8 => DType::I8,
        DataType::Int16 => DType::I16,
        DataType::Int32 => DType::I32,
        DataType::Int64 => DType::I64,
        DataType::UInt8 => DType::U8,
        DataType::UInt16 => DType::U16,
        DataType::UInt32 => DType::U32,
        DataType::UInt64 => DType::U64,
        DataType::Float32 => DType::F32,
        DataType::Float64 => DType::F64,
        _ => return None,
    })
}

/// Arrow column type used to store `dtype`
pub fn arrow_type(dtype: DType) -> DataType {
    match dtype {
        DType::I8 => DataType::Int8,
        DType::I16 => DataType::Int16,
        DType::I32 => DataType::Int32,
        DType::I64 => DataType::Int64,
        DType::U8 => DataType::UInt8,
        DType::U16 => DataType::UInt16,
        DType::U32 => DataType::UInt32,
        DType::U64 => DataType::UInt64,
        DType::F32 => DataType::Float32,
        DType::F64 => DataType::Float64,
    }
}

impl SchemaRegistry {
    /// Build the registry from a container schema and check every column
    /// length against the declared shape
    pub fn from_schema(schema: &Schema, backend: &dyn StorageBackend) -> Result<Self> {
        let metadata = schema.metadata();
        let shape = match metadata.get(SHAPE_KEY) {
            Some(text) => Shape::decode(text)?,
            None => return Err(AmxError::MalformedShape(format!("missing {SHAPE_KEY} key"))),
        };

        let omx_version = metadata.get(OMX_VERSION_KEY).cloned();
        match omx_version.as_deref() {
            Some(OMX_VERSION) => {}
            Some(other) => warn!(version = other, expected = OMX_VERSION, "unexpected OMX version"),
            None => debug!("file carries no OMX version"),
        }

        if schema.fields().is_empty() {
            return Err(AmxError::EmptySchema);
        }

        let expected = shape.num_elements();
        let mut variables = Vec::with_capacity(schema.fields().len());
        let mut by_name = HashMap::with_capacity(schema.fields().len());
        for (column, field) in schema.fields().iter().enumerate() {
            let dtype = dtype_from_arrow(field.data_type()).ok_or_else(|| {
                AmxError::UnsupportedColumn {
                    column: field.name().clone(),
                    reason: format!("{} is not a fixed-width numeric type", field.data_type()),
                }
            })?;

            let actual = backend.column_len(column);
            if actual != expected {
                return Err(AmxError::ShapeMismatch {
                    variable: field.name().clone(),
                    expected,
                    actual,
                });
            }

            by_name.insert(field.name().clone(), variables.len());
            variables.push(Variable {
                name: field.name().clone(),
                dtype,
                column,
            });
        }

        Ok(Self {
            shape,
            variables,
            by_name,
            omx_version,
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Variable names in column order
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.by_name
            .get(name)
            .map(|&i| &self.variables[i])
            .ok_or_else(|| AmxError::UnknownVariable(name.to_string()))
    }

    pub fn dtype_of(&self, name: &str) -> Result<DType> {
        self.variable(name).map(|v| v.dtype)
    }

    pub fn omx_version(&self) -> Option<&str> {
        self.omx_version.as_deref()
    }
}
