use std::io::{self, Read, Write};

use thiserror::Error;
use tracing::{info, warn};

use super::record::{CandidateAttributeRecord, RecordError};
use super::report::{write_entry, write_header, FilterOutcome, VariantReportEntry};

/// Errors raised while calibrating the candidate stream.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Fewer records than the scan reported.
    #[error("candidate stream truncated: expected {expected} records, found {read}")]
    Truncated {
        /// Records announced by the scan.
        expected: u64,
        /// Complete records actually present.
        read: u64,
    },

    /// A record could not be decoded.
    #[error("malformed candidate record {index}: {source}")]
    Record {
        /// Zero-based index of the record in the stream.
        index: u64,
        /// Decoding failure.
        #[source]
        source: RecordError,
    },

    /// Report sink rejected a write.
    #[error("failed to write report: {0}")]
    Report(#[source] io::Error),
}

/// Maps a candidate's attributes to the probability that it is a real variant.
pub trait ProbabilityModel {
    /// Probability in `[0, 1]`.
    fn predict(&self, record: &CandidateAttributeRecord) -> f64;
}

/// Logistic model over the statistic, log depth, and allele fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticModel {
    /// Intercept.
    pub intercept: f64,
    /// Weight of the (capped) likelihood-ratio statistic.
    pub statistic_weight: f64,
    /// Statistic values above this are treated as this value.
    pub statistic_cap: f64,
    /// Weight of `ln(depth)`.
    pub depth_weight: f64,
    /// Weight of the alternate allele fraction.
    pub allele_fraction_weight: f64,
    /// Weight of the fraction of reads supporting neither allele.
    pub other_fraction_weight: f64,
}

impl Default for LogisticModel {
    fn default() -> Self {
        Self {
            intercept: -4.0,
            statistic_weight: 0.15,
            statistic_cap: 100.0,
            depth_weight: 0.6,
            allele_fraction_weight: 3.0,
            other_fraction_weight: -4.0,
        }
    }
}

impl ProbabilityModel for LogisticModel {
    fn predict(&self, record: &CandidateAttributeRecord) -> f64 {
        let statistic = record.statistic.clamp(0.0, self.statistic_cap);
        let depth = f64::from(record.depth().max(1));
        let z = self.intercept
            + self.statistic_weight * statistic
            + self.depth_weight * depth.ln()
            + self.allele_fraction_weight * record.allele_fraction()
            + self.other_fraction_weight * record.other_fraction();
        1.0 / (1.0 + (-z).exp())
    }
}

/// Counts reported by [`ProbabilityCalibrator::calibrate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationSummary {
    /// Report rows written.
    pub records: u64,
    /// Rows with a `PASS` filter.
    pub passed: u64,
    /// Rows with a `LowProb` filter.
    pub low_probability: u64,
    /// Bytes found after the last expected record and ignored.
    pub trailing_bytes: u64,
}

/// Turns the intermediate candidate stream into the final report.
#[derive(Debug, Clone)]
pub struct ProbabilityCalibrator<M> {
    model: M,
    cutoff: f64,
}

impl<M: ProbabilityModel> ProbabilityCalibrator<M> {
    /// Calibrator with a `PASS` threshold of `cutoff`.
    pub fn new(model: M, cutoff: f64) -> Self {
        Self { model, cutoff }
    }

    /// Score exactly `expected` records from `input` and write the report to
    /// `output`.
    ///
    /// `verbose` adds per-record log lines; the report bytes do not depend
    /// on it.
    pub fn calibrate<R: Read, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
        expected: u64,
        verbose: bool,
    ) -> Result<CalibrationSummary, CalibrationError> {
        let mut summary = CalibrationSummary::default();
        write_header(output).map_err(CalibrationError::Report)?;

        for index in 0..expected {
            let record = match CandidateAttributeRecord::read_from(input) {
                Ok(Some(record)) => record,
                Ok(None) | Err(RecordError::PartialRecord { .. }) => {
                    return Err(CalibrationError::Truncated {
                        expected,
                        read: index,
                    })
                }
                Err(source) => return Err(CalibrationError::Record { index, source }),
            };

            let entry = self.entry_for(&record);
            if verbose {
                info!(
                    position = entry.position + 1,
                    statistic = entry.statistic,
                    allele_fraction = record.allele_fraction(),
                    probability = entry.probability,
                    filter = %entry.filter,
                    "calibrated candidate"
                );
            }
            write_entry(output, &entry).map_err(CalibrationError::Report)?;

            summary.records += 1;
            match entry.filter {
                FilterOutcome::Pass => summary.passed += 1,
                FilterOutcome::LowProb => summary.low_probability += 1,
            }
        }
        output.flush().map_err(CalibrationError::Report)?;

        summary.trailing_bytes = io::copy(input, &mut io::sink()).map_err(|source| {
            CalibrationError::Record {
                index: expected,
                source: source.into(),
            }
        })?;
        if summary.trailing_bytes > 0 {
            warn!(
                expected,
                trailing_bytes = summary.trailing_bytes,
                "ignoring data after the last expected candidate record"
            );
        }

        if verbose {
            info!(
                records = summary.records,
                passed = summary.passed,
                low_probability = summary.low_probability,
                "calibration finished"
            );
        }
        Ok(summary)
    }

    fn entry_for(&self, record: &CandidateAttributeRecord) -> VariantReportEntry {
        let probability = self.model.predict(record).clamp(0.0, 1.0);
        VariantReportEntry {
            position: record.position,
            reference: record.reference,
            alternate: record.alternate,
            genotype: record.genotype,
            depth: record.depth(),
            ref_count: record.ref_count(),
            alt_count: record.alt_count(),
            statistic: record.statistic,
            probability,
            filter: FilterOutcome::classify(probability, self.cutoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::report::REPORT_HEADER;
    use crate::calling::scoring::Genotype;
    use crate::counters::BaseCounts;
    use crate::reference::BaseCode;

    fn record(position: u64, statistic: f64, counts: [u32; 5]) -> CandidateAttributeRecord {
        CandidateAttributeRecord {
            position,
            reference: BaseCode::C,
            alternate: BaseCode::A,
            genotype: Genotype::Homozygous,
            counts: BaseCounts::from_counts(counts),
            statistic,
        }
    }

    fn stream(records: &[CandidateAttributeRecord]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for rec in records {
            rec.write_to(&mut bytes).unwrap();
        }
        bytes
    }

    #[test]
    fn logistic_model_orders_by_evidence() {
        let model = LogisticModel::default();
        let strong = model.predict(&record(0, 200.0, [40, 1, 0, 0, 0]));
        let weak = model.predict(&record(0, 3.5, [3, 8, 0, 0, 0]));
        let noisy = model.predict(&record(0, 3.5, [3, 2, 0, 0, 6]));
        assert!(strong > 0.99);
        assert!(weak < strong);
        assert!(noisy < weak);
        assert!((0.0..=1.0).contains(&noisy));
    }

    #[test]
    fn writes_header_and_one_row_per_record() {
        let records = [record(9, 200.0, [40, 1, 0, 0, 0]), record(99, 3.5, [3, 8, 0, 0, 0])];
        let bytes = stream(&records);
        let calibrator = ProbabilityCalibrator::new(LogisticModel::default(), 0.5);

        let mut report = Vec::new();
        let summary = calibrator
            .calibrate(&mut bytes.as_slice(), &mut report, 2, false)
            .unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.passed + summary.low_probability, 2);

        let text = String::from_utf8(report).unwrap();
        assert!(text.starts_with(REPORT_HEADER));
        let rows: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("10\tC\tA\thom\t41\t1\t40\t200.0000\t"));
        assert!(rows[1].starts_with("100\t"));
    }

    #[test]
    fn verbose_does_not_change_report() {
        let bytes = stream(&[record(5, 12.0, [20, 5, 0, 0, 1])]);
        let calibrator = ProbabilityCalibrator::new(LogisticModel::default(), 0.5);

        let mut quiet = Vec::new();
        let mut loud = Vec::new();
        calibrator
            .calibrate(&mut bytes.as_slice(), &mut quiet, 1, false)
            .unwrap();
        calibrator
            .calibrate(&mut bytes.as_slice(), &mut loud, 1, true)
            .unwrap();
        assert_eq!(quiet, loud);
    }

    #[test]
    fn fewer_records_than_declared_fails() {
        let bytes = stream(&[record(1, 10.0, [20, 1, 0, 0, 0])]);
        let calibrator = ProbabilityCalibrator::new(LogisticModel::default(), 0.5);
        let result = calibrator.calibrate(&mut bytes.as_slice(), &mut Vec::new(), 3, false);
        assert!(matches!(
            result,
            Err(CalibrationError::Truncated { expected: 3, read: 1 })
        ));

        let partial = &bytes[..20];
        let result = calibrator.calibrate(&mut &partial[..], &mut Vec::new(), 1, false);
        assert!(matches!(
            result,
            Err(CalibrationError::Truncated { expected: 1, read: 0 })
        ));
    }

    #[test]
    fn extra_records_are_ignored() {
        let bytes = stream(&[record(1, 10.0, [20, 1, 0, 0, 0]), record(2, 10.0, [20, 1, 0, 0, 0])]);
        let calibrator = ProbabilityCalibrator::new(LogisticModel::default(), 0.5);
        let mut report = Vec::new();
        let summary = calibrator
            .calibrate(&mut bytes.as_slice(), &mut report, 1, false)
            .unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(summary.trailing_bytes, 48);
        assert_eq!(String::from_utf8(report).unwrap().lines().count(), 2);
    }
}
