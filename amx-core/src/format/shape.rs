//! N-dimensional shape descriptor and its metadata encoding
//!
//! The shape is stored in file metadata as a textual tuple such as
//! `(25, 25)` or `(25, 25, 3)`. Values are flattened row-major, so
//! the last axis varies fastest.

use std::fmt;
use std::str::FromStr;

use crate::validation::{checked_product, parse_shape_tuple};
use crate::{AmxError, Result};

/// Ordered, non-empty sequence of positive dimension sizes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<usize>", into = "Vec<usize>"))]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a shape, validating that it is non-empty, positive and addressable
    pub fn new(dims: impl Into<Vec<usize>>) -> Result<Self> {
        let dims = dims.into();
        if dims.is_empty() || dims.contains(&0) || checked_product(&dims).is_none() {
            return Err(AmxError::MalformedShape(format!("{dims:?}")));
        }
        Ok(Self { dims })
    }

    /// Decode the metadata form
    pub fn decode(text: &str) -> Result<Self> {
        let dims = parse_shape_tuple(text)?;
        if checked_product(&dims).is_none() {
            return Err(AmxError::MalformedShape(text.to_string()));
        }
        Ok(Self { dims })
    }

    /// Decode the metadata form from raw bytes
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| AmxError::MalformedShape(String::from_utf8_lossy(bytes).into_owned()))?;
        Self::decode(text)
    }

    /// Encode to the metadata form, `(25, 25)` or `(25,)` for one axis
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Dimension sizes
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of axes
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Length of one axis
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Total element count of a variable with this shape
    pub fn num_elements(&self) -> usize {
        // Overflow is rejected at construction
        self.dims.iter().product()
    }

    /// Row-major strides in elements: `stride[i] = product(dims[i+1..])`
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.dims.len()];
        for axis in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.dims[axis + 1];
        }
        strides
    }

    /// Linear offset of a full coordinate, without bounds checks
    pub fn offset_of(&self, coords: &[usize]) -> usize {
        coords
            .iter()
            .zip(self.strides())
            .map(|(&c, stride)| c * stride)
            .sum()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        if self.dims.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl FromStr for Shape {
    type Err = AmxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl TryFrom<Vec<usize>> for Shape {
    type Error = AmxError;

    fn try_from(dims: Vec<usize>) -> Result<Self> {
        Self::new(dims)
    }
}

impl From<Shape> for Vec<usize> {
    fn from(shape: Shape) -> Self {
        shape.dims
    }
}
