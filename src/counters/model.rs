use bitvec::prelude::*;

use super::entry::{CounterSlot, InlineCounts, SlotEntry};
use super::{BaseCounts, CounterError, CounterView, MemoryPool, OverflowRecord};

/// Per-position base-observation counters for a whole reference.
///
/// Owns the inline array, the overflow pool and the invalid-position set as
/// one unit; dropping the model releases all three together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterModel {
    slots: Vec<CounterSlot>,
    pool: MemoryPool,
    invalid: BitVec<u64, Lsb0>,
}

impl CounterModel {
    /// Assemble a model from decoded parts, checking every cross-reference.
    pub(crate) fn from_parts(
        slots: Vec<CounterSlot>,
        pool: MemoryPool,
        invalid: BitVec<u64, Lsb0>,
    ) -> Result<Self, CounterError> {
        if invalid.len() != slots.len() {
            return Err(CounterError::InvalidSetLength {
                len: invalid.len(),
                genome_length: slots.len(),
            });
        }

        let mut referenced: Vec<BitVec<u64, Lsb0>> = (0..pool.partition_count())
            .map(|partition| bitvec![u64, Lsb0; 0; pool.partition(partition).len()])
            .collect();

        for (position, slot) in slots.iter().enumerate() {
            let SlotEntry::Overflow(location) = slot.entry() else {
                continue;
            };
            let position = position as u64;
            let record = pool
                .get(location)
                .ok_or(CounterError::DanglingOverflow { position, location })?;
            if record.position != position {
                return Err(CounterError::MisplacedOverflow {
                    position,
                    record_position: record.position,
                });
            }
            if record.counts.fits_inline() {
                return Err(CounterError::OverflowWithinCapacity {
                    position,
                    depth: record.counts.depth(),
                });
            }
            // Positions are unique and each record names one position, so a
            // record can be linked from at most one slot.
            referenced[usize::from(location.partition)].set(location.slot as usize, true);
        }

        for (partition, marks) in referenced.iter().enumerate() {
            if let Some(slot) = marks.first_zero() {
                return Err(CounterError::OrphanOverflow {
                    partition,
                    slot,
                    position: pool.partition(partition)[slot].position,
                });
            }
        }

        Ok(Self {
            slots,
            pool,
            invalid,
        })
    }

    /// Number of reference positions covered.
    pub fn genome_length(&self) -> usize {
        self.slots.len()
    }

    /// Counters at `position`, resolving overflow records; `None` past the end.
    pub fn get(&self, position: usize) -> Option<CounterView<'_>> {
        match self.slots.get(position)?.entry() {
            SlotEntry::Inline(inline) => Some(CounterView::Inline(inline.widen())),
            SlotEntry::Overflow(location) => {
                // `from_parts` and the builder guarantee every link resolves.
                let record = self.pool.get(location)?;
                Some(CounterView::Overflow { location, record })
            }
        }
    }

    /// Total observed depth at `position`, zero past the end.
    pub fn depth_of(&self, position: usize) -> u32 {
        self.get(position).map_or(0, |view| view.depth())
    }

    /// Whether the overflow flag is set at `position`.
    pub fn is_overflow(&self, position: usize) -> bool {
        self.slots.get(position).is_some_and(|slot| slot.is_overflow())
    }

    /// Whether `position` is explicitly marked unusable.
    pub fn is_invalid(&self, position: usize) -> bool {
        self.invalid.get(position).map_or(false, |bit| *bit)
    }

    /// Number of positions marked unusable.
    pub fn invalid_count(&self) -> usize {
        self.invalid.count_ones()
    }

    /// Invalid positions in ascending order.
    pub fn invalid_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.invalid.iter_ones()
    }

    /// Overflow pool backing deep positions.
    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    /// Number of overflow-pool partitions.
    pub fn partition_count(&self) -> usize {
        self.pool.partition_count()
    }

    /// Number of positions whose counters live in the overflow pool.
    pub fn overflow_len(&self) -> usize {
        self.pool.len()
    }

    pub(crate) fn slots(&self) -> &[CounterSlot] {
        &self.slots
    }
}

/// Incremental construction of a [`CounterModel`].
///
/// Mirrors how upstream alignment workers fill the counters: each position is
/// recorded once, by one worker, whose id selects the overflow partition.
#[derive(Debug)]
pub struct CounterModelBuilder {
    slots: Vec<CounterSlot>,
    recorded: BitVec<u64, Lsb0>,
    invalid: BitVec<u64, Lsb0>,
    pool: MemoryPool,
}

impl CounterModelBuilder {
    /// Start an empty model over `genome_length` positions.
    pub fn new(genome_length: usize, partitions: usize) -> Result<Self, CounterError> {
        Ok(Self {
            slots: vec![CounterSlot::default(); genome_length],
            recorded: bitvec![u64, Lsb0; 0; genome_length],
            invalid: bitvec![u64, Lsb0; 0; genome_length],
            pool: MemoryPool::new(partitions)?,
        })
    }

    /// Store the counts observed at `position` by worker `partition`.
    ///
    /// Depths above [`INLINE_CAPACITY`](super::INLINE_CAPACITY) are placed in
    /// the overflow pool; everything else stays inline.
    pub fn record(
        &mut self,
        position: usize,
        counts: BaseCounts,
        partition: usize,
    ) -> Result<&mut Self, CounterError> {
        self.check_position(position)?;
        if self.recorded[position] {
            return Err(CounterError::AlreadyRecorded {
                position: position as u64,
            });
        }

        let slot = match InlineCounts::narrow(&counts) {
            Some(inline) => CounterSlot::inline(inline),
            None => CounterSlot::overflow(self.pool.insert(
                partition,
                OverflowRecord {
                    position: position as u64,
                    counts,
                },
            )?),
        };
        self.slots[position] = slot;
        self.recorded.set(position, true);
        Ok(self)
    }

    /// Exclude `position` from candidate scanning.
    pub fn mark_invalid(&mut self, position: usize) -> Result<&mut Self, CounterError> {
        self.check_position(position)?;
        self.invalid.set(position, true);
        Ok(self)
    }

    /// Finish construction.
    pub fn build(self) -> CounterModel {
        CounterModel {
            slots: self.slots,
            pool: self.pool,
            invalid: self.invalid,
        }
    }

    fn check_position(&self, position: usize) -> Result<(), CounterError> {
        if position >= self.slots.len() {
            return Err(CounterError::PositionOutOfRange {
                position: position as u64,
                genome_length: self.slots.len() as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::{OverflowRef, INLINE_CAPACITY};
    use crate::reference::BaseCode;

    fn model() -> CounterModel {
        let mut builder = CounterModelBuilder::new(16, 2).unwrap();
        builder
            .record(3, BaseCounts::from_counts([40, 1, 0, 0, 0]), 0)
            .unwrap()
            .record(7, BaseCounts::from_counts([200, 100, 0, 0, 0]), 1)
            .unwrap()
            .record(9, BaseCounts::from_counts([INLINE_CAPACITY, 0, 0, 0, 0]), 1)
            .unwrap()
            .mark_invalid(12)
            .unwrap();
        builder.build()
    }

    #[test]
    fn inline_and_overflow_positions_resolve() {
        let model = model();
        let view = model.get(3).unwrap();
        assert!(!view.is_overflow());
        assert_eq!(view.counts().count(BaseCode::C), 1);
        assert_eq!(model.depth_of(3), 41);

        let deep = model.get(7).unwrap();
        assert!(deep.is_overflow());
        assert_eq!(deep.depth(), 300);
        assert!(matches!(
            deep,
            CounterView::Overflow {
                location: OverflowRef { partition: 1, slot: 0 },
                ..
            }
        ));
    }

    #[test]
    fn overflow_only_above_capacity() {
        let model = model();
        assert!(!model.is_overflow(9));
        assert!(model.is_overflow(7));
        assert_eq!(model.overflow_len(), 1);
    }

    #[test]
    fn unrecorded_positions_are_empty() {
        let model = model();
        assert_eq!(model.depth_of(0), 0);
        assert!(model.get(16).is_none());
        assert_eq!(model.depth_of(100), 0);
    }

    #[test]
    fn invalid_positions_are_tracked() {
        let model = model();
        assert!(model.is_invalid(12));
        assert!(!model.is_invalid(3));
        assert_eq!(model.invalid_positions().collect::<Vec<_>>(), vec![12]);
    }

    #[test]
    fn recording_twice_is_rejected() {
        let mut builder = CounterModelBuilder::new(4, 1).unwrap();
        builder
            .record(1, BaseCounts::from_counts([1, 0, 0, 0, 0]), 0)
            .unwrap();
        assert!(matches!(
            builder.record(1, BaseCounts::from_counts([2, 0, 0, 0, 0]), 0),
            Err(CounterError::AlreadyRecorded { position: 1 })
        ));
        assert!(matches!(
            builder.record(4, BaseCounts::default(), 0),
            Err(CounterError::PositionOutOfRange { .. })
        ));
    }

    #[test]
    fn from_parts_rejects_orphan_records() {
        let model = model();
        let mut pool = model.pool().clone();
        pool.insert(
            0,
            OverflowRecord {
                position: 2,
                counts: BaseCounts::from_counts([500, 0, 0, 0, 0]),
            },
        )
        .unwrap();
        let result = CounterModel::from_parts(
            model.slots().to_vec(),
            pool,
            bitvec![u64, Lsb0; 0; 16],
        );
        assert!(matches!(
            result,
            Err(CounterError::OrphanOverflow {
                partition: 0,
                slot: 0,
                position: 2
            })
        ));
    }

    #[test]
    fn from_parts_rejects_links_to_foreign_records() {
        let model = model();
        let mut slots = model.slots().to_vec();
        slots[8] = slots[7];
        let result =
            CounterModel::from_parts(slots, model.pool().clone(), bitvec![u64, Lsb0; 0; 16]);
        assert!(matches!(
            result,
            Err(CounterError::MisplacedOverflow {
                position: 8,
                record_position: 7
            })
        ));
    }

    #[test]
    fn from_parts_rejects_shallow_overflow_records() {
        let model = model();
        for depth in [10, INLINE_CAPACITY] {
            let mut pool = model.pool().clone();
            let location = pool
                .insert(
                    1,
                    OverflowRecord {
                        position: 9,
                        counts: BaseCounts::from_counts([depth, 0, 0, 0, 0]),
                    },
                )
                .unwrap();
            let mut slots = model.slots().to_vec();
            slots[9] = CounterSlot::overflow(location);
            let result = CounterModel::from_parts(slots, pool, bitvec![u64, Lsb0; 0; 16]);
            assert!(
                matches!(
                    result,
                    Err(CounterError::OverflowWithinCapacity { position: 9, depth: d }) if d == depth
                ),
                "depth {depth} must be stored inline"
            );
        }
    }

    #[test]
    fn from_parts_rejects_dangling_links() {
        let model = model();
        let mut slots = model.slots().to_vec();
        slots[5] = CounterSlot::overflow(OverflowRef {
            partition: 0,
            slot: 3,
        });
        let result =
            CounterModel::from_parts(slots, model.pool().clone(), bitvec![u64, Lsb0; 0; 16]);
        assert!(matches!(
            result,
            Err(CounterError::DanglingOverflow { position: 5, .. })
        ));
    }
}
