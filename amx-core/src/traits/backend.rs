//! Storage backend capability interface
//!
//! A backend owns one open container file and can copy the raw bytes of
//! selected elements of one column into a caller buffer. Two variants
//! exist: a row-grouped compressed backend that must decode whole row
//! groups, and a memory-mapped backend that addresses bytes directly.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::format::DType;
use crate::resolver::GatherPlan;
use crate::validation::check_byte_len;
use crate::Result;

/// Physical sub-format behind a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BackendKind {
    /// Compressed, row-grouped columnar file (Parquet)
    Columnar,
    /// Uncompressed, memory-mappable file (Arrow IPC)
    Mapped,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Columnar => write!(f, "columnar"),
            BackendKind::Mapped => write!(f, "mapped"),
        }
    }
}

/// Snapshot of cumulative physical I/O performed by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    /// Physical read calls (slice copies or row group reads)
    pub reads: u64,
    /// Row groups fully decoded
    pub row_groups_decoded: u64,
    /// Bytes copied into caller buffers
    pub bytes_read: u64,
}

impl IoStats {
    /// Difference between two snapshots
    pub fn since(&self, earlier: &IoStats) -> IoStats {
        IoStats {
            reads: self.reads - earlier.reads,
            row_groups_decoded: self.row_groups_decoded - earlier.row_groups_decoded,
            bytes_read: self.bytes_read - earlier.bytes_read,
        }
    }
}

/// Relaxed atomic counters backing [`IoStats`]
///
/// Diagnostic only; they never influence what is read.
#[derive(Debug, Default)]
pub struct IoCounters {
    reads: AtomicU64,
    row_groups_decoded: AtomicU64,
    bytes_read: AtomicU64,
}

impl IoCounters {
    pub fn record_read(&self, bytes: usize) {
        self.record_reads(1, bytes);
    }

    pub fn record_reads(&self, count: usize, bytes: usize) {
        self.reads.fetch_add(count as u64, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_row_group(&self) {
        self.row_groups_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IoStats {
        IoStats {
            reads: self.reads.load(Ordering::Relaxed),
            row_groups_decoded: self.row_groups_decoded.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

/// Trait for backends that serve raw element bytes of one column
///
/// Implementations are read-only after construction, so one backend may
/// serve concurrent calls from several threads.
pub trait StorageBackend: Send + Sync {
    /// Physical sub-format of this backend
    fn kind(&self) -> BackendKind;

    /// Logical length shared by every column
    fn num_rows(&self) -> usize;

    /// Physical element count of one column
    fn column_len(&self, _column: usize) -> usize {
        self.num_rows()
    }

    /// Copy the elements at the plan's offsets, in plan order, into `out`
    ///
    /// `out` holds exactly `plan.len() * dtype.size_bytes()` bytes.
    fn fetch(&self, column: usize, dtype: DType, plan: &GatherPlan, out: &mut [u8]) -> Result<()>;

    /// Copy the elements in `range` into `out`
    fn fetch_contiguous_range(
        &self,
        column: usize,
        dtype: DType,
        range: Range<usize>,
        out: &mut [u8],
    ) -> Result<()>;

    /// Cumulative I/O performed so far
    fn io_stats(&self) -> IoStats;

    /// Fill `out` for `plan`, taking the contiguous fast path when possible
    fn gather(&self, column: usize, dtype: DType, plan: &GatherPlan, out: &mut [u8]) -> Result<()> {
        check_byte_len(out.len(), plan.len(), dtype.size_bytes())?;
        if plan.is_empty() {
            return Ok(());
        }
        match plan.contiguous() {
            Some(range) => self.fetch_contiguous_range(column, dtype, range, out),
            None => self.fetch(column, dtype, plan, out),
        }
    }
}
