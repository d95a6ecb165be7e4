//! Coordinate resolver
//!
//! Translates per-axis selections into the ordered linear offsets of a
//! row-major flattened column. Pure index arithmetic; the variable's
//! values are never touched here.
//!
//! Offsets are produced by walking the Cartesian product of the per-axis
//! positions with the last axis fastest, each axis in the order the caller
//! gave. Reshaping the gathered values to [`GatherPlan::shape`] therefore
//! reproduces the requested selection without any permutation.

use std::ops::Range;

use crate::format::Shape;
use crate::selection::{LabelResolver, Selection};
use crate::validation::{check_position, checked_product};
use crate::{AmxError, Result};

/// Positions selected along one source axis, attached to an output axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLevel {
    /// Output axis these positions label
    pub output_axis: usize,
    /// Axis of the stored matrix the positions refer to
    pub source_axis: usize,
    /// Selected positions, aligned with the output axis
    pub positions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Offsets {
    Run(Range<usize>),
    Scattered(Vec<usize>),
}

/// Resolved read plan for one selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherPlan {
    offsets: Offsets,
    shape: Vec<usize>,
    levels: Vec<IndexLevel>,
}

impl GatherPlan {
    fn from_offsets(offsets: Vec<usize>, shape: Vec<usize>, levels: Vec<IndexLevel>) -> Self {
        let offsets = match contiguous_run(&offsets) {
            Some(run) => Offsets::Run(run),
            None => Offsets::Scattered(offsets),
        };
        Self {
            offsets,
            shape,
            levels,
        }
    }

    /// Number of elements to gather
    pub fn len(&self) -> usize {
        match &self.offsets {
            Offsets::Run(run) => run.len(),
            Offsets::Scattered(list) => list.len(),
        }
    }

    /// Whether the plan gathers nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Output logical shape; scalar-selected axes are dropped
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Per-output-axis positions used for attaching labels
    pub fn levels(&self) -> &[IndexLevel] {
        &self.levels
    }

    /// The single ascending run of offsets, when the plan forms one
    pub fn contiguous(&self) -> Option<Range<usize>> {
        match &self.offsets {
            Offsets::Run(run) => Some(run.clone()),
            Offsets::Scattered(_) => None,
        }
    }

    /// Offsets in gather order
    pub fn offsets(&self) -> OffsetIter<'_> {
        match &self.offsets {
            Offsets::Run(run) => OffsetIter::Run(run.clone()),
            Offsets::Scattered(list) => OffsetIter::Scattered(list.iter()),
        }
    }
}

/// Iterator over the offsets of a [`GatherPlan`]
#[derive(Debug, Clone)]
pub enum OffsetIter<'a> {
    Run(Range<usize>),
    Scattered(std::slice::Iter<'a, usize>),
}

impl Iterator for OffsetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            OffsetIter::Run(run) => run.next(),
            OffsetIter::Scattered(iter) => iter.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            OffsetIter::Run(run) => run.size_hint(),
            OffsetIter::Scattered(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for OffsetIter<'_> {}

/// Resolve one selection per axis into a [`GatherPlan`]
///
/// Missing trailing selections default to [`Selection::All`].
pub fn resolve(
    shape: &Shape,
    selections: &[Selection],
    labels: &dyn LabelResolver,
) -> Result<GatherPlan> {
    let ndim = shape.ndim();
    if selections.len() > ndim {
        return Err(AmxError::TooManySelections {
            given: selections.len(),
            ndim,
        });
    }

    let mut per_axis = Vec::with_capacity(ndim);
    let mut out_shape = Vec::with_capacity(ndim);
    let mut levels = Vec::with_capacity(ndim);
    for (axis, &bound) in shape.dims().iter().enumerate() {
        let selection = selections.get(axis).unwrap_or(&Selection::All);
        let positions = expand_axis(axis, bound, selection, labels)?;
        if !selection.is_scalar() {
            levels.push(IndexLevel {
                output_axis: out_shape.len(),
                source_axis: axis,
                positions: positions.clone(),
            });
            out_shape.push(positions.len());
        }
        per_axis.push(positions);
    }

    if selections.iter().all(|s| *s == Selection::All) {
        return Ok(GatherPlan {
            offsets: Offsets::Run(0..shape.num_elements()),
            shape: out_shape,
            levels,
        });
    }

    let offsets = cartesian_offsets(&per_axis, &shape.strides())?;
    Ok(GatherPlan::from_offsets(offsets, out_shape, levels))
}

/// Resolve zipped per-axis index vectors into one offset per point
///
/// `indexes[axis][k]` is the position of point `k` on `axis`. The output
/// is one-dimensional with one element per point.
pub fn resolve_points(shape: &Shape, indexes: &[Vec<i64>]) -> Result<GatherPlan> {
    if indexes.len() != shape.ndim() {
        return Err(AmxError::InvalidSelection(format!(
            "{} index vectors given for a {}-dimensional matrix",
            indexes.len(),
            shape.ndim()
        )));
    }
    let count = indexes[0].len();
    if let Some(other) = indexes.iter().find(|v| v.len() != count) {
        return Err(AmxError::InvalidSelection(format!(
            "index vectors differ in length ({count} vs {})",
            other.len()
        )));
    }

    let strides = shape.strides();
    let mut offsets = vec![0usize; count];
    let mut levels = Vec::with_capacity(shape.ndim());
    for (axis, (index, &bound)) in indexes.iter().zip(shape.dims()).enumerate() {
        let positions = index
            .iter()
            .map(|&i| check_position(axis, i, bound))
            .collect::<Result<Vec<_>>>()?;
        for (offset, &position) in offsets.iter_mut().zip(&positions) {
            *offset += position * strides[axis];
        }
        levels.push(IndexLevel {
            output_axis: 0,
            source_axis: axis,
            positions,
        });
    }

    Ok(GatherPlan::from_offsets(offsets, vec![count], levels))
}

fn expand_axis(
    axis: usize,
    bound: usize,
    selection: &Selection,
    labels: &dyn LabelResolver,
) -> Result<Vec<usize>> {
    match selection {
        Selection::All => Ok((0..bound).collect()),
        Selection::Index(index) => Ok(vec![check_position(axis, *index, bound)?]),
        Selection::Range { start, stop, step } => {
            if *step == 0 {
                return Err(AmxError::InvalidSelection(format!(
                    "range on axis {axis} has zero step"
                )));
            }
            if start >= stop {
                return Ok(Vec::new());
            }
            (*start..*stop)
                .step_by(*step)
                .map(|i| check_position(axis, i, bound))
                .collect()
        }
        Selection::Indices(indices) => indices
            .iter()
            .map(|&i| check_position(axis, i, bound))
            .collect(),
        Selection::Labels { lookup, labels: wanted } => {
            let positions = labels.resolve_labels(axis, bound, lookup.as_deref(), wanted)?;
            if let Some(&bad) = positions.iter().find(|&&p| p >= bound) {
                return Err(AmxError::IndexOutOfBounds {
                    axis,
                    index: bad as i64,
                    bound,
                });
            }
            Ok(positions)
        }
    }
}

/// Walk the Cartesian product with the last axis fastest
fn cartesian_offsets(per_axis: &[Vec<usize>], strides: &[usize]) -> Result<Vec<usize>> {
    let lens: Vec<usize> = per_axis.iter().map(Vec::len).collect();
    let total = checked_product(&lens)
        .ok_or_else(|| AmxError::InvalidSelection("selection too large to address".into()))?;
    let mut offsets = Vec::with_capacity(total);
    if total == 0 {
        return Ok(offsets);
    }

    let ndim = per_axis.len();
    let mut counter = vec![0usize; ndim];
    // partial[k] holds the offset contributed by axes before k
    let mut partial = vec![0usize; ndim + 1];
    for k in 0..ndim {
        partial[k + 1] = partial[k] + per_axis[k][0] * strides[k];
    }

    loop {
        offsets.push(partial[ndim]);

        let mut axis = ndim;
        loop {
            if axis == 0 {
                return Ok(offsets);
            }
            axis -= 1;
            counter[axis] += 1;
            if counter[axis] < lens[axis] {
                break;
            }
            counter[axis] = 0;
        }
        for k in axis..ndim {
            partial[k + 1] = partial[k] + per_axis[k][counter[k]] * strides[k];
        }
    }
}

fn contiguous_run(offsets: &[usize]) -> Option<Range<usize>> {
    let first = *offsets.first()?;
    offsets
        .windows(2)
        .all(|w| w[1] == w[0] + 1)
        .then(|| first..first + offsets.len())
}
