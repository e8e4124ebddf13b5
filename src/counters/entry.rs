use crate::reference::{BaseCode, BASE_CLASSES};

use super::{CounterError, OverflowRecord};

/// Largest total depth stored inline; deeper positions go to the overflow pool.
pub const INLINE_CAPACITY: u32 = u8::MAX as u32;

/// Per-position tally of observed base classes plus total depth.
///
/// Invariant: the per-class counts never sum to more than `depth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct BaseCounts {
    counts: [u32; BASE_CLASSES],
    depth: u32,
}

impl BaseCounts {
    /// Counts with an explicit total depth.
    pub fn new(counts: [u32; BASE_CLASSES], depth: u32) -> Result<Self, CounterError> {
        let observed: u64 = counts.iter().map(|&count| u64::from(count)).sum();
        if observed > u64::from(depth) {
            return Err(CounterError::DepthBelowSum { observed, depth });
        }
        Ok(Self { counts, depth })
    }

    /// Counts whose depth equals the number of observations.
    ///
    /// # Panics
    /// Panics if the counts sum past `u32::MAX`.
    pub fn from_counts(counts: [u32; BASE_CLASSES]) -> Self {
        let depth = counts
            .iter()
            .try_fold(0u32, |acc, &count| acc.checked_add(count))
            .expect("base counts overflow u32 depth");
        Self { counts, depth }
    }

    /// Observations of a single class.
    #[inline]
    pub fn count(&self, base: BaseCode) -> u32 {
        self.counts[base.index()]
    }

    /// All class counts in [`BaseCode`] order.
    #[inline]
    pub fn counts(&self) -> &[u32; BASE_CLASSES] {
        &self.counts
    }

    /// Total observed depth.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether this tally fits the inline representation.
    #[inline]
    pub fn fits_inline(&self) -> bool {
        self.depth <= INLINE_CAPACITY
    }
}

/// Location of an [`OverflowRecord`]: pool partition plus local slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverflowRef {
    /// Partition (worker identity at construction time).
    pub partition: u16,
    /// Index inside the partition.
    pub slot: u32,
}

/// Compact counters for a position whose depth fits in a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct InlineCounts {
    pub(crate) counts: [u8; BASE_CLASSES],
    pub(crate) depth: u8,
}

impl InlineCounts {
    pub(crate) fn widen(&self) -> BaseCounts {
        BaseCounts {
            counts: self.counts.map(u32::from),
            depth: u32::from(self.depth),
        }
    }

    /// Narrow `counts`; `None` when the depth exceeds the inline capacity.
    pub(crate) fn narrow(counts: &BaseCounts) -> Option<Self> {
        let depth = u8::try_from(counts.depth).ok()?;
        // Each class count is bounded by depth, so these conversions cannot fail.
        let narrowed = counts.counts.map(|count| count as u8);
        Some(Self {
            counts: narrowed,
            depth,
        })
    }
}

pub(crate) const TAG_INLINE: u8 = 0;
pub(crate) const TAG_OVERFLOW: u8 = 1;

/// Entry of the inline array packed into one little-endian word, in the byte
/// layout the snapshot stores:
///
/// ```text
/// inline   [0, a, c, g, t, other, depth, 0]
/// overflow [1, 0, partition u16, slot u32]
/// ```
///
/// The all-zero word is an empty inline tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub(crate) struct CounterSlot(u64);

/// Unpacked form of a [`CounterSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotEntry {
    Inline(InlineCounts),
    Overflow(OverflowRef),
}

impl CounterSlot {
    pub(crate) fn inline(inline: InlineCounts) -> Self {
        let mut bytes = [0u8; 8];
        bytes[0] = TAG_INLINE;
        bytes[1..1 + BASE_CLASSES].copy_from_slice(&inline.counts);
        bytes[6] = inline.depth;
        Self(u64::from_le_bytes(bytes))
    }

    pub(crate) fn overflow(location: OverflowRef) -> Self {
        let mut bytes = [0u8; 8];
        bytes[0] = TAG_OVERFLOW;
        bytes[2..4].copy_from_slice(&location.partition.to_le_bytes());
        bytes[4..8].copy_from_slice(&location.slot.to_le_bytes());
        Self(u64::from_le_bytes(bytes))
    }

    #[inline]
    pub(crate) fn is_overflow(self) -> bool {
        self.to_bytes()[0] == TAG_OVERFLOW
    }

    pub(crate) fn entry(self) -> SlotEntry {
        let bytes = self.to_bytes();
        if bytes[0] == TAG_OVERFLOW {
            SlotEntry::Overflow(OverflowRef {
                partition: u16::from_le_bytes([bytes[2], bytes[3]]),
                slot: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            })
        } else {
            let mut counts = [0u8; BASE_CLASSES];
            counts.copy_from_slice(&bytes[1..1 + BASE_CLASSES]);
            SlotEntry::Inline(InlineCounts {
                counts,
                depth: bytes[6],
            })
        }
    }

    /// Reinterpret a stored slot; callers check the tag and padding first.
    pub(crate) fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    #[inline]
    pub(crate) fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

/// Read view of one position's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterView<'a> {
    /// Counts held in the inline array.
    Inline(BaseCounts),
    /// Counts resolved from the overflow pool.
    Overflow {
        /// Where the record lives.
        location: OverflowRef,
        /// The resolved record.
        record: &'a OverflowRecord,
    },
}

impl CounterView<'_> {
    /// The position's counts regardless of where they are stored.
    pub fn counts(&self) -> BaseCounts {
        match self {
            CounterView::Inline(counts) => *counts,
            CounterView::Overflow { record, .. } => record.counts,
        }
    }

    /// Total observed depth.
    pub fn depth(&self) -> u32 {
        self.counts().depth()
    }

    /// Whether the overflow flag is set for this position.
    pub fn is_overflow(&self) -> bool {
        matches!(self, CounterView::Overflow { .. })
    }
}
