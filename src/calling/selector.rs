use std::io::{self, Write};
use std::ops::AddAssign;

use rayon::ThreadPoolBuildError;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::CallerConfig;
use crate::counters::CounterModel;
use crate::exome::ExomeRegionTable;
use crate::reference::{BaseCode, PackedReference};

use super::record::{CandidateAttributeRecord, RECORD_BYTES};
use super::scan::{run_ordered, BlockContext, BlockProcessor, ScanError, ScanPlan};
use super::scoring::SiteScorer;

/// Errors raised by the candidate scan.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// Counters and reference describe genomes of different lengths.
    #[error("counter model covers {counters} positions but the reference has {reference}")]
    LengthMismatch {
        /// Genome length of the counter model.
        counters: usize,
        /// Length of the reference sequence.
        reference: usize,
    },

    /// Scan plan could not be built.
    #[error(transparent)]
    Plan(#[from] ScanError),

    /// Worker pool could not be started.
    #[error("failed to start scan workers: {0}")]
    Workers(#[from] ThreadPoolBuildError),

    /// Intermediate sink rejected a write.
    #[error("failed to write candidate records: {0}")]
    Sink(#[source] io::Error),
}

/// Per-position tallies of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionSummary {
    /// Candidate records written to the sink.
    pub emitted: u64,
    /// Positions that reached the scorer.
    pub scanned: u64,
    /// Positions skipped for insufficient depth.
    pub below_coverage: u64,
    /// Positions excluded as invalid, ambiguous, or outside the exome.
    pub excluded: u64,
}

impl AddAssign for SelectionSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.emitted += rhs.emitted;
        self.scanned += rhs.scanned;
        self.below_coverage += rhs.below_coverage;
        self.excluded += rhs.excluded;
    }
}

/// Outcome of evaluating a single position.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Invalid, ambiguous in the reference, or outside the exome.
    Excluded,
    /// Depth below the minimum coverage.
    BelowCoverage,
    /// Scored, but not significant.
    Rejected,
    /// Significant; to be written to the sink.
    Candidate(CandidateAttributeRecord),
}

/// Scans a [`CounterModel`] for significant positions.
#[derive(Debug)]
pub struct CandidateSelector<'a, S> {
    counters: &'a CounterModel,
    reference: &'a PackedReference,
    exome: Option<&'a ExomeRegionTable>,
    scorer: S,
    min_coverage: u32,
    significance_threshold: f64,
    threads: usize,
    plan: ScanPlan,
}

/// Candidate records and tallies of one scan block.
#[derive(Debug, Default)]
pub struct BlockOutput {
    buffer: Vec<u8>,
    summary: SelectionSummary,
}

impl<'a, S: SiteScorer + Sync> CandidateSelector<'a, S> {
    /// Bind the read-only inputs of a scan.
    ///
    /// `exome` is `None` when region filtering is disabled.
    pub fn new(
        counters: &'a CounterModel,
        reference: &'a PackedReference,
        exome: Option<&'a ExomeRegionTable>,
        scorer: S,
        config: &CallerConfig,
    ) -> Result<Self, SelectorError> {
        if counters.genome_length() != reference.len() {
            return Err(SelectorError::LengthMismatch {
                counters: counters.genome_length(),
                reference: reference.len(),
            });
        }
        let plan = ScanPlan::with_block_size(counters.genome_length(), config.scan_block_size)?;
        Ok(Self {
            counters,
            reference,
            exome,
            scorer,
            min_coverage: config.min_coverage,
            significance_threshold: config.significance_threshold,
            threads: config.num_of_cpu_threads,
            plan,
        })
    }

    /// Decide what happens to `position`.
    pub fn evaluate(&self, position: usize) -> Evaluation {
        let Some(reference) = self.reference.base_at(position) else {
            return Evaluation::Excluded;
        };
        if reference == BaseCode::N || self.counters.is_invalid(position) {
            return Evaluation::Excluded;
        }
        if let Some(exome) = self.exome {
            if !exome.contains(position as u64) {
                return Evaluation::Excluded;
            }
        }

        let Some(view) = self.counters.get(position) else {
            return Evaluation::Excluded;
        };
        let counts = view.counts();
        if counts.depth() < self.min_coverage {
            return Evaluation::BelowCoverage;
        }

        match self.scorer.score(&counts, reference) {
            Some(score) if score.statistic > self.significance_threshold => {
                Evaluation::Candidate(CandidateAttributeRecord {
                    position: position as u64,
                    reference,
                    alternate: score.alternate,
                    genotype: score.genotype,
                    counts,
                    statistic: score.statistic,
                })
            }
            _ => Evaluation::Rejected,
        }
    }

    /// Scan every position and write the candidates to `sink` in position order.
    ///
    /// Returns the tallies; `emitted` is the exact number of records written.
    pub fn select<W: Write>(&self, sink: &mut W) -> Result<SelectionSummary, SelectorError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|idx| format!("snapcall-scan-{idx}"))
            .build()?;

        let mut summary = SelectionSummary::default();
        run_ordered(&self.plan, self, &pool, |context, output| {
            debug!(
                block = context.block_id,
                emitted = output.summary.emitted,
                "scan block finished"
            );
            sink.write_all(&output.buffer).map_err(SelectorError::Sink)?;
            summary += output.summary;
            Ok(())
        })?;
        sink.flush().map_err(SelectorError::Sink)?;

        info!(
            emitted = summary.emitted,
            scanned = summary.scanned,
            below_coverage = summary.below_coverage,
            excluded = summary.excluded,
            "candidate scan finished"
        );
        Ok(summary)
    }
}

impl<S: SiteScorer + Sync> BlockProcessor for CandidateSelector<'_, S> {
    type Output = BlockOutput;
    type Error = SelectorError;

    fn process_block(&self, context: &BlockContext) -> Result<BlockOutput, SelectorError> {
        let mut output = BlockOutput::default();
        for position in context.range.clone() {
            match self.evaluate(position) {
                Evaluation::Excluded => output.summary.excluded += 1,
                Evaluation::BelowCoverage => output.summary.below_coverage += 1,
                Evaluation::Rejected => output.summary.scanned += 1,
                Evaluation::Candidate(record) => {
                    output.summary.scanned += 1;
                    output.summary.emitted += 1;
                    output.buffer.reserve(RECORD_BYTES);
                    record
                        .write_to(&mut output.buffer)
                        .map_err(SelectorError::Sink)?;
                }
            }
        }
        Ok(output)
    }
}
