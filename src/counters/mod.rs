//! Per-position observation counters and their snapshot format.
//!
//! Shallow positions keep their counts in a compact inline array. Positions
//! whose depth exceeds [`INLINE_CAPACITY`] store a link into a partitioned
//! [`MemoryPool`] instead; the link is an index pair, never an address.

mod entry;
mod model;
mod pool;
pub mod snapshot;

pub use entry::{BaseCounts, CounterView, OverflowRef, INLINE_CAPACITY};
pub use model::{CounterModel, CounterModelBuilder};
pub use pool::{MemoryPool, OverflowRecord};
pub use snapshot::{SnapshotError, SNAPSHOT_MAGIC};

use thiserror::Error;

/// Everything loaded from one snapshot: inline array, overflow pool and
/// invalid-position set, released together when dropped.
pub type SnpBundle = CounterModel;

/// Violations of the counter model's invariants.
#[derive(Debug, Error)]
pub enum CounterError {
    /// Per-class counts sum past the recorded depth.
    #[error("observed {observed} bases but depth is {depth}")]
    DepthBelowSum {
        /// Sum of the per-class counts.
        observed: u64,
        /// Recorded total depth.
        depth: u32,
    },

    /// Position outside `[0, genome_length)`.
    #[error("position {position} outside genome of length {genome_length}")]
    PositionOutOfRange {
        /// Requested position.
        position: u64,
        /// Genome length of the model.
        genome_length: u64,
    },

    /// Position already holds counters.
    #[error("position {position} recorded twice")]
    AlreadyRecorded {
        /// Repeated position.
        position: u64,
    },

    /// Pool partition count must be between 1 and 65536.
    #[error("invalid overflow partition count {0}")]
    InvalidPartitionCount(usize),

    /// Partition index not present in the pool.
    #[error("overflow partition {partition} out of range ({partitions} partitions)")]
    PartitionOutOfRange {
        /// Requested partition.
        partition: usize,
        /// Partitions in the pool.
        partitions: usize,
    },

    /// Partition cannot address another record.
    #[error("overflow partition {partition} is full")]
    PartitionFull {
        /// Saturated partition.
        partition: usize,
    },

    /// Overflow flag set but the link names no record.
    #[error("position {position} links to missing overflow record {location:?}")]
    DanglingOverflow {
        /// Position carrying the link.
        position: u64,
        /// Unresolvable location.
        location: OverflowRef,
    },

    /// Overflow link resolves to a record for a different position.
    #[error("position {position} links to the overflow record of position {record_position}")]
    MisplacedOverflow {
        /// Position carrying the link.
        position: u64,
        /// Position stored in the resolved record.
        record_position: u64,
    },

    /// Overflow record whose depth would have fit inline.
    #[error("position {position} stored in overflow with depth {depth} within inline capacity")]
    OverflowWithinCapacity {
        /// Position of the record.
        position: u64,
        /// Its depth.
        depth: u32,
    },

    /// Overflow record that no inline slot links to.
    #[error("overflow record {partition}:{slot} for position {position} is not referenced")]
    OrphanOverflow {
        /// Partition holding the record.
        partition: usize,
        /// Slot inside the partition.
        slot: usize,
        /// Position stored in the record.
        position: u64,
    },

    /// Invalid-position set sized for a different genome.
    #[error("invalid-position set covers {len} positions, genome has {genome_length}")]
    InvalidSetLength {
        /// Bits in the set.
        len: usize,
        /// Genome length of the model.
        genome_length: usize,
    },
}
