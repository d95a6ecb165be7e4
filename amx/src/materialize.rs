//! Result materializer: typed N-d arrays from gathered bytes

use amx_core::{AmxError, DType, GatherPlan, Label, MatrixElement, Result, StorageBackend};
use arrow_array::types::{
    Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type,
    UInt64Type, UInt8Type,
};
use arrow_array::ArrowPrimitiveType;
use ndarray::{ArrayD, IxDyn};
use tracing::trace;

use crate::lookup::LookupStore;
use crate::schema::Variable;

/// Element types that can be materialized into a [`MatrixArray`]
pub trait ArrayElement: MatrixElement {
    /// Arrow type used when writing columns of this element type
    type Arrow: ArrowPrimitiveType<Native = Self>;

    fn wrap(array: ArrayD<Self>) -> MatrixArray;
    fn unwrap(array: MatrixArray) -> std::result::Result<ArrayD<Self>, MatrixArray>;
    fn unwrap_ref(array: &MatrixArray) -> Option<&ArrayD<Self>>;
}

/// Materialized values of one variable, typed by the stored dtype
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixArray {
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

macro_rules! impl_array_element {
    ($($type:ty => $variant:ident, $arrow:ty),* $(,)?) => {
        $(
            impl ArrayElement for $type {
                type Arrow = $arrow;

                fn wrap(array: ArrayD<Self>) -> MatrixArray {
                    MatrixArray::$variant(array)
                }

                fn unwrap(array: MatrixArray) -> std::result::Result<ArrayD<Self>, MatrixArray> {
                    match array {
                        MatrixArray::$variant(a) => Ok(a),
                        other => Err(other),
                    }
                }

                fn unwrap_ref(array: &MatrixArray) -> Option<&ArrayD<Self>> {
                    match array {
                        MatrixArray::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_array_element!(
    i8 => I8, Int8Type,
    i16 => I16, Int16Type,
    i32 => I32, Int32Type,
    i64 => I64, Int64Type,
    u8 => U8, UInt8Type,
    u16 => U16, UInt16Type,
    u32 => U32, UInt32Type,
    u64 => U64, UInt64Type,
    f32 => F32, Float32Type,
    f64 => F64, Float64Type,
);

/// Apply `$body` to the inner array of any variant
macro_rules! each_variant {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            MatrixArray::I8($a) => $body,
            MatrixArray::I16($a) => $body,
            MatrixArray::I32($a) => $body,
            MatrixArray::I64($a) => $body,
            MatrixArray::U8($a) => $body,
            MatrixArray::U16($a) => $body,
            MatrixArray::U32($a) => $body,
            MatrixArray::U64($a) => $body,
            MatrixArray::F32($a) => $body,
            MatrixArray::F64($a) => $body,
        }
    };
}

impl MatrixArray {
    pub fn dtype(&self) -> DType {
        match self {
            MatrixArray::I8(_) => DType::I8,
            MatrixArray::I16(_) => DType::I16,
            MatrixArray::I32(_) => DType::I32,
            MatrixArray::I64(_) => DType::I64,
            MatrixArray::U8(_) => DType::U8,
            MatrixArray::U16(_) => DType::U16,
            MatrixArray::U32(_) => DType::U32,
            MatrixArray::U64(_) => DType::U64,
            MatrixArray::F32(_) => DType::F32,
            MatrixArray::F64(_) => DType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        each_variant!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        each_variant!(self, a => a.ndim())
    }

    pub fn len(&self) -> usize {
        each_variant!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the array as element type `T`; no conversion is performed
    pub fn into_typed<T: ArrayElement>(self) -> Result<ArrayD<T>> {
        T::unwrap(self).map_err(|other| AmxError::DTypeMismatch {
            stored: other.dtype(),
            requested: T::DTYPE,
        })
    }

    /// Borrow the array as element type `T`
    pub fn as_typed<T: ArrayElement>(&self) -> Result<&ArrayD<T>> {
        T::unwrap_ref(self).ok_or(AmxError::DTypeMismatch {
            stored: self.dtype(),
            requested: T::DTYPE,
        })
    }

    /// Raw bytes of the elements in logical order
    pub fn to_bytes(&self) -> Vec<u8> {
        each_variant!(self, a => a.iter().flat_map(|v| bytemuck::bytes_of(v).to_vec()).collect())
    }
}

/// Labels attached to one output axis
#[derive(Debug, Clone, PartialEq)]
pub enum AxisLabels {
    /// Selected positions; no lookup is bound to the source axis
    Positions(Vec<usize>),
    /// Labels of the bound lookup at the selected positions
    Labels(Vec<Label>),
}

impl AxisLabels {
    pub fn len(&self) -> usize {
        match self {
            AxisLabels::Positions(p) => p.len(),
            AxisLabels::Labels(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index attached to one output axis
#[derive(Debug, Clone, PartialEq)]
pub struct AxisIndex {
    pub output_axis: usize,
    pub source_axis: usize,
    /// Name of the lookup the labels came from
    pub lookup: Option<String>,
    pub labels: AxisLabels,
}

/// Result of a read: values plus the optional per-axis index
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSlice {
    pub values: MatrixArray,
    pub index: Option<Vec<AxisIndex>>,
}

impl MatrixSlice {
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn into_typed<T: ArrayElement>(self) -> Result<ArrayD<T>> {
        self.values.into_typed()
    }
}

/// Values of several variables at the same points, sharing one index
#[derive(Debug, Clone, PartialEq)]
pub struct PointTable {
    /// One entry per source axis, all on output axis 0
    pub index: Vec<AxisIndex>,
    /// Variable name and its one-dimensional values, in request order
    pub columns: Vec<(String, MatrixArray)>,
}

impl PointTable {
    pub fn num_points(&self) -> usize {
        self.index.first().map(|i| i.labels.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&MatrixArray> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values)
    }
}

fn gather_typed<T: ArrayElement>(
    backend: &dyn StorageBackend,
    column: usize,
    plan: &GatherPlan,
) -> Result<ArrayD<T>> {
    let mut values = vec![T::zeroed(); plan.len()];
    backend.gather(column, T::DTYPE, plan, bytemuck::cast_slice_mut(&mut values))?;
    ArrayD::from_shape_vec(IxDyn(plan.shape()), values)
        .map_err(|e| AmxError::backend_io("shaping gathered values", e))
}

/// Gather the plan's elements of `variable` and shape them
pub fn materialize(
    backend: &dyn StorageBackend,
    variable: &Variable,
    plan: &GatherPlan,
) -> Result<MatrixArray> {
    trace!(
        variable = %variable.name,
        elements = plan.len(),
        contiguous = plan.contiguous().is_some(),
        "materializing"
    );
    let column = variable.column;
    Ok(match variable.dtype {
        DType::I8 => MatrixArray::I8(gather_typed(backend, column, plan)?),
        DType::I16 => MatrixArray::I16(gather_typed(backend, column, plan)?),
        DType::I32 => MatrixArray::I32(gather_typed(backend, column, plan)?),
        DType::I64 => MatrixArray::I64(gather_typed(backend, column, plan)?),
        DType::U8 => MatrixArray::U8(gather_typed(backend, column, plan)?),
        DType::U16 => MatrixArray::U16(gather_typed(backend, column, plan)?),
        DType::U32 => MatrixArray::U32(gather_typed(backend, column, plan)?),
        DType::U64 => MatrixArray::U64(gather_typed(backend, column, plan)?),
        DType::F32 => MatrixArray::F32(gather_typed(backend, column, plan)?),
        DType::F64 => MatrixArray::F64(gather_typed(backend, column, plan)?),
    })
}

/// Per-level labels for a plan: bound lookup labels where a lookup is
/// bound to the source axis, plain positions otherwise
pub fn attach_index(plan: &GatherPlan, lookups: &LookupStore) -> Vec<AxisIndex> {
    plan.levels()
        .iter()
        .map(|level| match lookups.bound_to(level.source_axis) {
            Some(lookup) => AxisIndex {
                output_axis: level.output_axis,
                source_axis: level.source_axis,
                lookup: Some(lookup.name().to_string()),
                labels: AxisLabels::Labels(
                    level
                        .positions
                        .iter()
                        .filter_map(|&p| lookup.label(p).cloned())
                        .collect(),
                ),
            },
            None => AxisIndex {
                output_axis: level.output_axis,
                source_axis: level.source_axis,
                lookup: None,
                labels: AxisLabels::Positions(level.positions.clone()),
            },
        })
        .collect()
}
