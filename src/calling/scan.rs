use std::ops::Range;

use rayon::prelude::*;
use rayon::ThreadPool;
use thiserror::Error;

/// Errors raised while planning a blocked scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Configuration invalid (e.g., zero block size).
    #[error("invalid scan configuration: {0}")]
    InvalidConfiguration(String),
}

/// Partition of `[0, total_units)` into contiguous blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    /// Positions per block.
    pub block_size: usize,
    /// Number of blocks `T = ⌈n / b⌉`.
    pub num_blocks: usize,
    /// Total number of positions.
    pub total_units: usize,
}

impl ScanPlan {
    /// Construct a plan with an explicit block size.
    ///
    /// An empty genome yields a plan without blocks.
    pub fn with_block_size(total_units: usize, block_size: usize) -> Result<Self, ScanError> {
        if block_size == 0 {
            return Err(ScanError::InvalidConfiguration(
                "block size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            block_size,
            num_blocks: total_units.div_ceil(block_size),
            total_units,
        })
    }

    /// All blocks in ascending order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockContext> + '_ {
        (1..=self.num_blocks).map(move |block_id| {
            let start = (block_id - 1) * self.block_size;
            BlockContext {
                block_id,
                range: start..(start + self.block_size).min(self.total_units),
            }
        })
    }
}

/// Per-block metadata supplied to processors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    /// 1-indexed block identifier.
    pub block_id: usize,
    /// Positions covered by the block.
    pub range: Range<usize>,
}

/// Work performed independently on each block.
///
/// Implementations only read shared state; every block produces its own
/// output value, so blocks can run in any order on any worker.
pub trait BlockProcessor: Sync {
    /// Private per-block result.
    type Output: Send;
    /// Failure reported by a block.
    type Error: Send;

    /// Process every position in `context`.
    fn process_block(&self, context: &BlockContext) -> Result<Self::Output, Self::Error>;
}

/// Run `processor` over every block of `plan` on `pool`, handing outputs to
/// `consume` in ascending block order.
///
/// Blocks are dispatched in waves of one block per worker, so at most one
/// wave of outputs is buffered at a time. The first error, in block order,
/// stops the scan.
pub fn run_ordered<P, F>(
    plan: &ScanPlan,
    processor: &P,
    pool: &ThreadPool,
    mut consume: F,
) -> Result<(), P::Error>
where
    P: BlockProcessor,
    F: FnMut(&BlockContext, P::Output) -> Result<(), P::Error>,
{
    let wave = pool.current_num_threads().max(1);
    let blocks: Vec<BlockContext> = plan.blocks().collect();

    for chunk in blocks.chunks(wave) {
        let outputs: Vec<Result<P::Output, P::Error>> = pool.install(|| {
            chunk
                .par_iter()
                .map(|context| processor.process_block(context))
                .collect()
        });
        for (context, output) in chunk.iter().zip(outputs) {
            consume(context, output?)?;
        }
    }
    Ok(())
}
