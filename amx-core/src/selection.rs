//! Per-axis selections and labels
//!
//! A `get` call carries one [`Selection`] per axis. Axes left out at the
//! end default to [`Selection::All`].

use std::fmt;

use crate::Result;

/// Value of one entry in a lookup array
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Label {
    Int(i64),
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(v) => write!(f, "{v}"),
            Label::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Label::Int(value)
    }
}

impl From<i32> for Label {
    fn from(value: i32) -> Self {
        Label::Int(value as i64)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::Text(value.to_string())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Label::Text(value)
    }
}

/// Selection along one axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every position, in order
    All,
    /// A single position; the axis is dropped from the output shape
    Index(i64),
    /// `start..stop` stepping by `step`
    Range { start: i64, stop: i64, step: usize },
    /// Arbitrary positions in the given order; repeats allowed
    Indices(Vec<i64>),
    /// Labels translated to positions through a lookup
    ///
    /// With `lookup: None` the lookup bound to the axis is used.
    Labels {
        lookup: Option<String>,
        labels: Vec<Label>,
    },
}

impl Selection {
    /// Contiguous `start..stop`
    pub fn range(start: i64, stop: i64) -> Self {
        Selection::Range {
            start,
            stop,
            step: 1,
        }
    }

    /// Positions in the given order
    pub fn indices<I: Into<i64>>(positions: impl IntoIterator<Item = I>) -> Self {
        Selection::Indices(positions.into_iter().map(Into::into).collect())
    }

    /// Labels resolved through the lookup bound to the axis
    pub fn labels<L: Into<Label>>(labels: impl IntoIterator<Item = L>) -> Self {
        Selection::Labels {
            lookup: None,
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Labels resolved through a named lookup
    pub fn labels_in<L: Into<Label>>(
        lookup: impl Into<String>,
        labels: impl IntoIterator<Item = L>,
    ) -> Self {
        Selection::Labels {
            lookup: Some(lookup.into()),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this selection drops its axis from the output
    pub fn is_scalar(&self) -> bool {
        matches!(self, Selection::Index(_))
    }
}

impl From<i64> for Selection {
    fn from(index: i64) -> Self {
        Selection::Index(index)
    }
}

impl From<std::ops::Range<i64>> for Selection {
    fn from(range: std::ops::Range<i64>) -> Self {
        Selection::range(range.start, range.end)
    }
}

impl From<Vec<i64>> for Selection {
    fn from(positions: Vec<i64>) -> Self {
        Selection::Indices(positions)
    }
}

/// Translates label selections into positions
///
/// Implemented by the lookup store of an open file.
pub trait LabelResolver {
    /// Resolve `labels` on `axis` (of length `bound`) into positions
    fn resolve_labels(
        &self,
        axis: usize,
        bound: usize,
        lookup: Option<&str>,
        labels: &[Label],
    ) -> Result<Vec<usize>>;
}

/// Resolver for files without lookups: every label selection fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookups;

impl LabelResolver for NoLookups {
    fn resolve_labels(
        &self,
        axis: usize,
        _bound: usize,
        lookup: Option<&str>,
        _labels: &[Label],
    ) -> Result<Vec<usize>> {
        Err(crate::AmxError::UnknownLookup(match lookup {
            Some(name) => format!("{name:?}"),
            None => format!("no lookup bound to axis {axis}"),
        }))
    }
}
