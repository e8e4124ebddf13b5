//! Binary snapshot of a [`CounterModel`].
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic "SNPSNAP1" | genome_length u64 | partitions u32
//! genome_length × 8-byte slots
//!     inline   [0, a, c, g, t, other, depth, 0]
//!     overflow [1, 0, partition u16, slot u32]
//! per partition: u32 record count, then 32-byte records
//!     (position u64, five u32 class counts, depth u32)
//! u64 invalid count, then that many strictly increasing u64 positions
//! 32-byte blake3 digest of everything above
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bitvec::prelude::*;
use thiserror::Error;
use tracing::debug;

use super::entry::{CounterSlot, TAG_INLINE, TAG_OVERFLOW};
use super::{BaseCounts, CounterError, CounterModel, MemoryPool, OverflowRecord};
use crate::reference::BASE_CLASSES;
use crate::util::binary::{
    is_short_read, read_array, read_u32, read_u64, write_u32, write_u64, HashingReader,
    HashingWriter,
};

/// Leading bytes of a snapshot file.
pub const SNAPSHOT_MAGIC: [u8; 8] = *b"SNPSNAP1";

const HEADER_BYTES: u64 = 20;
const SLOT_BYTES: u64 = 8;
const DIGEST_BYTES: u64 = 32;

/// Errors raised while reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot missing or unreadable.
    #[error("snapshot {} could not be accessed: {source}", .path.display())]
    Io {
        /// Snapshot path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// File shorter than its header declares.
    #[error("snapshot {} is truncated", .path.display())]
    Truncated {
        /// Snapshot path.
        path: PathBuf,
    },

    /// Snapshot was taken over a reference of a different length.
    #[error("snapshot {} covers {declared} positions but the reference has {expected}", .path.display())]
    LengthMismatch {
        /// Snapshot path.
        path: PathBuf,
        /// Length stored in the snapshot.
        declared: u64,
        /// Length of the loaded reference.
        expected: u64,
    },

    /// Structural damage: bad magic, tags, digest or ordering.
    #[error("snapshot {} is corrupt: {reason}", .path.display())]
    Corrupt {
        /// Snapshot path.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Decoded counters violate the model's invariants.
    #[error("snapshot {} is inconsistent: {source}", .path.display())]
    Inconsistent {
        /// Snapshot path.
        path: PathBuf,
        /// Violated invariant.
        #[source]
        source: CounterError,
    },
}

/// Read the snapshot at `path`, which must describe `genome_length` positions.
pub fn load(path: &Path, genome_length: usize) -> Result<CounterModel, SnapshotError> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    let file_len = file
        .metadata()
        .map_err(|source| io_error(path, source))?
        .len();
    let mut reader = HashingReader::new(BufReader::new(file));
    let read_err = |err: io::Error| classify(path, err);
    let corrupt = |reason: String| SnapshotError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let magic: [u8; 8] = read_array(&mut reader).map_err(read_err)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }
    let declared = read_u64(&mut reader).map_err(read_err)?;
    if declared != genome_length as u64 {
        return Err(SnapshotError::LengthMismatch {
            path: path.to_path_buf(),
            declared,
            expected: genome_length as u64,
        });
    }
    let partitions = read_u32(&mut reader).map_err(read_err)? as usize;

    let minimum = (genome_length as u64)
        .checked_mul(SLOT_BYTES)
        .and_then(|slots| slots.checked_add(4 * partitions as u64))
        .and_then(|size| size.checked_add(HEADER_BYTES + 8 + DIGEST_BYTES));
    match minimum {
        Some(minimum) if file_len >= minimum => {}
        Some(_) => {
            return Err(SnapshotError::Truncated {
                path: path.to_path_buf(),
            })
        }
        None => return Err(corrupt("declared sizes overflow".to_string())),
    }

    let mut slots = Vec::with_capacity(genome_length);
    for position in 0..genome_length {
        let bytes: [u8; 8] = read_array(&mut reader).map_err(read_err)?;
        let slot = decode_slot(bytes, partitions)
            .map_err(|reason| corrupt(format!("slot {position}: {reason}")))?;
        slots.push(slot);
    }

    let mut records = Vec::with_capacity(partitions);
    for partition in 0..partitions {
        let count = read_u32(&mut reader).map_err(read_err)?;
        let mut partition_records = Vec::new();
        for _ in 0..count {
            let record = read_record(&mut reader).map_err(read_err)?.map_err(|source| {
                SnapshotError::Inconsistent {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            if record.position >= genome_length as u64 {
                return Err(corrupt(format!(
                    "overflow record in partition {partition} names position {}",
                    record.position
                )));
            }
            partition_records.push(record);
        }
        records.push(partition_records);
    }

    let invalid_count = read_u64(&mut reader).map_err(read_err)?;
    if invalid_count > genome_length as u64 {
        return Err(corrupt(format!(
            "{invalid_count} invalid positions exceed genome length"
        )));
    }
    let mut invalid = bitvec![u64, Lsb0; 0; genome_length];
    let mut previous: Option<u64> = None;
    for _ in 0..invalid_count {
        let position = read_u64(&mut reader).map_err(read_err)?;
        if position >= genome_length as u64 || previous.is_some_and(|prev| prev >= position) {
            return Err(corrupt(format!(
                "invalid position {position} out of range or out of order"
            )));
        }
        invalid.set(position as usize, true);
        previous = Some(position);
    }

    let (digest, mut inner) = reader.finish();
    let stored: [u8; 32] = read_array(&mut inner).map_err(read_err)?;
    if digest.as_bytes() != &stored {
        return Err(corrupt("digest mismatch".to_string()));
    }
    let mut trailing = [0u8; 1];
    if inner.read(&mut trailing).map_err(read_err)? != 0 {
        return Err(corrupt("trailing bytes after digest".to_string()));
    }

    let pool = MemoryPool::from_partitions(records).map_err(|source| {
        SnapshotError::Inconsistent {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let model = CounterModel::from_parts(slots, pool, invalid).map_err(|source| {
        SnapshotError::Inconsistent {
            path: path.to_path_buf(),
            source,
        }
    })?;

    debug!(
        path = %path.display(),
        genome_length,
        partitions,
        overflow = model.overflow_len(),
        invalid = model.invalid_count(),
        "snapshot loaded"
    );
    Ok(model)
}

/// Write `model` to `path` in the snapshot layout.
pub fn save(model: &CounterModel, path: &Path) -> Result<(), SnapshotError> {
    let write_err = |source: io::Error| io_error(path, source);
    let file = File::create(path).map_err(write_err)?;
    let mut writer = HashingWriter::new(BufWriter::new(file));

    writer.write_all(&SNAPSHOT_MAGIC).map_err(write_err)?;
    write_u64(&mut writer, model.genome_length() as u64).map_err(write_err)?;
    write_u32(&mut writer, model.partition_count() as u32).map_err(write_err)?;

    for slot in model.slots() {
        writer.write_all(&slot.to_bytes()).map_err(write_err)?;
    }

    let pool = model.pool();
    for partition in 0..pool.partition_count() {
        let records = pool.partition(partition);
        let count = u32::try_from(records.len()).map_err(|_| SnapshotError::Inconsistent {
            path: path.to_path_buf(),
            source: CounterError::PartitionFull { partition },
        })?;
        write_u32(&mut writer, count).map_err(write_err)?;
        for record in records {
            write_record(&mut writer, record).map_err(write_err)?;
        }
    }

    write_u64(&mut writer, model.invalid_count() as u64).map_err(write_err)?;
    for position in model.invalid_positions() {
        write_u64(&mut writer, position as u64).map_err(write_err)?;
    }

    let (digest, mut inner) = writer.finish();
    inner.write_all(digest.as_bytes()).map_err(write_err)?;
    inner.flush().map_err(write_err)
}

fn decode_slot(bytes: [u8; 8], partitions: usize) -> Result<CounterSlot, String> {
    match bytes[0] {
        TAG_INLINE => {
            let observed: u32 = bytes[1..1 + BASE_CLASSES]
                .iter()
                .map(|&count| u32::from(count))
                .sum();
            let depth = bytes[6];
            if observed > u32::from(depth) {
                return Err(format!("observed {observed} bases but depth is {depth}"));
            }
            if bytes[7] != 0 {
                return Err("inline slot has a non-zero pad byte".to_string());
            }
        }
        TAG_OVERFLOW => {
            if bytes[1] != 0 {
                return Err("overflow slot has a non-zero pad byte".to_string());
            }
            let partition = u16::from_le_bytes([bytes[2], bytes[3]]);
            if usize::from(partition) >= partitions {
                return Err(format!(
                    "overflow partition {partition} out of range ({partitions} partitions)"
                ));
            }
        }
        tag => return Err(format!("unknown slot tag {tag}")),
    }
    Ok(CounterSlot::from_bytes(bytes))
}

fn read_record<R: Read>(reader: &mut R) -> io::Result<Result<OverflowRecord, CounterError>> {
    let position = read_u64(reader)?;
    let mut counts = [0u32; BASE_CLASSES];
    for count in counts.iter_mut() {
        *count = read_u32(reader)?;
    }
    let depth = read_u32(reader)?;
    Ok(BaseCounts::new(counts, depth).map(|counts| OverflowRecord { position, counts }))
}

fn write_record<W: Write>(writer: &mut W, record: &OverflowRecord) -> io::Result<()> {
    write_u64(writer, record.position)?;
    for &count in record.counts.counts() {
        write_u32(writer, count)?;
    }
    write_u32(writer, record.counts.depth())
}

fn io_error(path: &Path, source: io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn classify(path: &Path, err: io::Error) -> SnapshotError {
    if is_short_read(&err) {
        SnapshotError::Truncated {
            path: path.to_path_buf(),
        }
    } else {
        io_error(path, err)
    }
}
