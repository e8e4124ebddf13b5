//! Exome region index: sorted half-open intervals on the reference.
//!
//! File layout (little-endian): `u32 count` followed by `count` records of
//! `u32 start, u32 end`. Intervals are half-open, `[start, end)`.
//!
//! Regions are normalised on load: sorted by start, overlapping or touching
//! intervals merged and empty intervals dropped. Membership queries depend on
//! that order, so an unsorted file is repaired rather than trusted.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::util::binary::{is_short_read, read_u32, write_u32};

/// Errors raised while loading an exome region index.
#[derive(Debug, Error)]
pub enum ExomeError {
    /// Region file missing or unreadable.
    #[error("exome region index {} could not be read: {source}", .path.display())]
    Io {
        /// Path of the region index.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// File ends before the region count.
    #[error("exome region index {} is missing its region count", .path.display())]
    MissingCount {
        /// Path of the region index.
        path: PathBuf,
    },

    /// Fewer interval records than the declared count.
    #[error("exome region index {} is truncated: declared {declared} regions, read {read}", .path.display())]
    Truncated {
        /// Path of the region index.
        path: PathBuf,
        /// Count stored in the header.
        declared: u32,
        /// Complete records actually present.
        read: u32,
    },

    /// An interval whose start lies after its end.
    #[error("exome region {index} is inverted: start {start} > end {end}")]
    Inverted {
        /// Record index within the file.
        index: usize,
        /// Declared start.
        start: u32,
        /// Declared end.
        end: u32,
    },
}

/// Half-open interval `[start, end)` on the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExomeRegion {
    /// First covered position.
    pub start: u32,
    /// One past the last covered position.
    pub end: u32,
}

impl ExomeRegion {
    /// Construct an interval.
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of positions covered.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the interval covers nothing.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `position` falls inside the interval.
    pub fn contains(&self, position: u64) -> bool {
        u64::from(self.start) <= position && position < u64::from(self.end)
    }
}

/// Sorted, non-overlapping set of exome intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExomeRegionTable {
    regions: Vec<ExomeRegion>,
}

impl ExomeRegionTable {
    /// Build a table from arbitrary intervals, normalising their order.
    pub fn from_regions(regions: Vec<ExomeRegion>) -> Result<Self, ExomeError> {
        if let Some((index, region)) = regions
            .iter()
            .enumerate()
            .find(|(_, region)| region.start > region.end)
        {
            return Err(ExomeError::Inverted {
                index,
                start: region.start,
                end: region.end,
            });
        }

        let sorted = regions.windows(2).all(|pair| pair[0].start <= pair[1].start);
        let mut regions = regions;
        if !sorted {
            warn!(
                regions = regions.len(),
                "exome regions are not sorted by start; sorting"
            );
            regions.sort_unstable();
        }

        let input_len = regions.len();
        let mut merged: Vec<ExomeRegion> = Vec::with_capacity(input_len);
        for region in regions.into_iter().filter(|region| !region.is_empty()) {
            match merged.last_mut() {
                Some(last) if region.start <= last.end => last.end = last.end.max(region.end),
                _ => merged.push(region),
            }
        }
        if merged.len() != input_len {
            debug!(
                input = input_len,
                kept = merged.len(),
                "merged overlapping or empty exome regions"
            );
        }

        Ok(Self { regions: merged })
    }

    /// Read the binary region index at `path`.
    pub fn load(path: &Path) -> Result<Self, ExomeError> {
        let io_err = |source: io::Error| ExomeError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
        let declared = read_u32(&mut reader).map_err(|err| {
            if is_short_read(&err) {
                ExomeError::MissingCount {
                    path: path.to_path_buf(),
                }
            } else {
                io_err(err)
            }
        })?;

        let mut regions = Vec::new();
        for read in 0..declared {
            let start = read_u32(&mut reader);
            let end = start.and_then(|start| read_u32(&mut reader).map(|end| (start, end)));
            match end {
                Ok((start, end)) => regions.push(ExomeRegion::new(start, end)),
                Err(err) if is_short_read(&err) => {
                    return Err(ExomeError::Truncated {
                        path: path.to_path_buf(),
                        declared,
                        read,
                    })
                }
                Err(err) => return Err(io_err(err)),
            }
        }

        Self::from_regions(regions)
    }

    /// Write the table in the binary index layout.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let count = u32::try_from(self.regions.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many regions"))?;
        write_u32(&mut writer, count)?;
        for region in &self.regions {
            write_u32(&mut writer, region.start)?;
            write_u32(&mut writer, region.end)?;
        }
        writer.flush()
    }

    /// Whether `position` falls in any interval. `O(log n)`.
    pub fn contains(&self, position: u64) -> bool {
        let idx = self
            .regions
            .partition_point(|region| u64::from(region.end) <= position);
        self.regions
            .get(idx)
            .is_some_and(|region| region.contains(position))
    }

    /// Normalised intervals in ascending order.
    pub fn regions(&self) -> &[ExomeRegion] {
        &self.regions
    }

    /// Number of intervals after normalisation.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the table holds no intervals.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Total number of covered positions.
    pub fn covered_bases(&self) -> u64 {
        self.regions.iter().map(|region| u64::from(region.len())).sum()
    }
}
