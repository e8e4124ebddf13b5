use super::{BaseCounts, CounterError, OverflowRef};

/// Extended counters for a position whose depth exceeds the inline capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowRecord {
    /// Reference position the record belongs to.
    pub position: u64,
    /// Full-width counts.
    pub counts: BaseCounts,
}

/// Arena of overflow records, partitioned by the worker that created them.
///
/// Records are addressed by [`OverflowRef`] rather than by address, so a
/// partition can grow or be reloaded without invalidating the inline array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPool {
    partitions: Vec<Vec<OverflowRecord>>,
}

impl MemoryPool {
    /// Create a pool with `partitions` empty partitions.
    pub fn new(partitions: usize) -> Result<Self, CounterError> {
        if partitions == 0 || partitions > usize::from(u16::MAX) + 1 {
            return Err(CounterError::InvalidPartitionCount(partitions));
        }
        Ok(Self {
            partitions: vec![Vec::new(); partitions],
        })
    }

    pub(crate) fn from_partitions(partitions: Vec<Vec<OverflowRecord>>) -> Result<Self, CounterError> {
        let mut pool = Self::new(partitions.len())?;
        pool.partitions = partitions;
        Ok(pool)
    }

    /// Append a record to `partition` and return its location.
    pub fn insert(
        &mut self,
        partition: usize,
        record: OverflowRecord,
    ) -> Result<OverflowRef, CounterError> {
        let partitions = self.partitions.len();
        let records = self
            .partitions
            .get_mut(partition)
            .ok_or(CounterError::PartitionOutOfRange {
                partition,
                partitions,
            })?;
        let slot = u32::try_from(records.len()).map_err(|_| CounterError::PartitionFull {
            partition,
        })?;
        records.push(record);
        Ok(OverflowRef {
            // `new` bounds the partition count by u16::MAX + 1.
            partition: partition as u16,
            slot,
        })
    }

    /// Resolve a location; `None` if it does not name a live record.
    #[inline]
    pub fn get(&self, location: OverflowRef) -> Option<&OverflowRecord> {
        self.partitions
            .get(usize::from(location.partition))?
            .get(location.slot as usize)
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Records held by one partition.
    pub fn partition(&self, partition: usize) -> &[OverflowRecord] {
        self.partitions
            .get(partition)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of records across partitions.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    /// Whether the pool holds no records.
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(position: u64) -> OverflowRecord {
        OverflowRecord {
            position,
            counts: BaseCounts::from_counts([300, 0, 0, 0, 0]),
        }
    }

    #[test]
    fn insert_returns_stable_locations() {
        let mut pool = MemoryPool::new(3).unwrap();
        let first = pool.insert(2, record(10)).unwrap();
        let second = pool.insert(2, record(11)).unwrap();
        let other = pool.insert(0, record(12)).unwrap();

        assert_eq!(first, OverflowRef { partition: 2, slot: 0 });
        assert_eq!(second, OverflowRef { partition: 2, slot: 1 });
        assert_eq!(other, OverflowRef { partition: 0, slot: 0 });
        assert_eq!(pool.get(second).unwrap().position, 11);
        assert_eq!(pool.len(), 3);
        assert!(pool.partition(1).is_empty());
    }

    #[test]
    fn unknown_locations_do_not_resolve() {
        let mut pool = MemoryPool::new(1).unwrap();
        pool.insert(0, record(1)).unwrap();
        assert!(pool.get(OverflowRef { partition: 0, slot: 1 }).is_none());
        assert!(pool.get(OverflowRef { partition: 4, slot: 0 }).is_none());
    }

    #[test]
    fn partition_bounds_are_checked() {
        assert!(matches!(
            MemoryPool::new(0),
            Err(CounterError::InvalidPartitionCount(0))
        ));
        let mut pool = MemoryPool::new(2).unwrap();
        assert!(matches!(
            pool.insert(2, record(0)),
            Err(CounterError::PartitionOutOfRange {
                partition: 2,
                partitions: 2
            })
        ));
    }
}
