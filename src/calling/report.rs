use anyhow::{anyhow, Result};
use std::fmt;
use std::io::{self, Write};

use crate::reference::BaseCode;

use super::scoring::Genotype;

/// Column header of the final report.
pub const REPORT_HEADER: &str =
    "#position\tref\talt\tgenotype\tdepth\tref_count\talt_count\tstatistic\tprobability\tfilter\n";

/// Filter column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Calibrated probability at or above the cutoff.
    Pass,
    /// Calibrated probability below the cutoff.
    LowProb,
}

impl FilterOutcome {
    /// Classify `probability` against `cutoff`.
    pub fn classify(probability: f64, cutoff: f64) -> Self {
        if probability >= cutoff {
            FilterOutcome::Pass
        } else {
            FilterOutcome::LowProb
        }
    }
}

impl fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterOutcome::Pass => "PASS",
            FilterOutcome::LowProb => "LowProb",
        })
    }
}

/// One row of the final report.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantReportEntry {
    /// Genomic coordinate (0-based).
    pub position: u64,
    /// Reference base.
    pub reference: BaseCode,
    /// Called alternate base.
    pub alternate: BaseCode,
    /// Called genotype.
    pub genotype: Genotype,
    /// Total depth at the position.
    pub depth: u32,
    /// Reads supporting the reference base.
    pub ref_count: u32,
    /// Reads supporting the alternate base.
    pub alt_count: u32,
    /// Log-likelihood ratio from the scan.
    pub statistic: f64,
    /// Calibrated probability that the call is real.
    pub probability: f64,
    /// Outcome of the probability cutoff.
    pub filter: FilterOutcome,
}

/// Write the column header.
pub fn write_header<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(REPORT_HEADER.as_bytes())
}

/// Write one report row.
pub fn write_entry<W: Write>(writer: &mut W, entry: &VariantReportEntry) -> io::Result<()> {
    writeln!(
        writer,
        "{pos}\t{ref_base}\t{alt_base}\t{genotype}\t{depth}\t{ref_count}\t{alt_count}\t{statistic:.4}\t{probability:.6}\t{filter}",
        pos = entry.position + 1,
        ref_base = entry.reference.to_ascii() as char,
        alt_base = entry.alternate.to_ascii() as char,
        genotype = entry.genotype.label(),
        depth = entry.depth,
        ref_count = entry.ref_count,
        alt_count = entry.alt_count,
        statistic = entry.statistic,
        probability = entry.probability,
        filter = entry.filter,
    )
}

/// Render entries into a report string (useful for tests and snapshots).
pub fn render_report(entries: &[VariantReportEntry]) -> Result<String> {
    let mut buffer = Vec::new();
    write_header(&mut buffer)?;
    for entry in entries {
        write_entry(&mut buffer, entry)?;
    }
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered report is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_one_based_and_fixed_precision() {
        let entry = VariantReportEntry {
            position: 1499,
            reference: BaseCode::C,
            alternate: BaseCode::T,
            genotype: Genotype::Heterozygous,
            depth: 23,
            ref_count: 12,
            alt_count: 11,
            statistic: 12.345678,
            probability: 0.25,
            filter: FilterOutcome::classify(0.25, 0.5),
        };
        let report = render_report(&[entry]).unwrap();
        let mut lines = report.lines();
        assert_eq!(lines.next(), Some(REPORT_HEADER.trim_end()));
        assert_eq!(
            lines.next(),
            Some("1500\tC\tT\thet\t23\t12\t11\t12.3457\t0.250000\tLowProb")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn cutoff_is_inclusive() {
        assert_eq!(FilterOutcome::classify(0.5, 0.5), FilterOutcome::Pass);
        assert_eq!(FilterOutcome::classify(0.4999, 0.5), FilterOutcome::LowProb);
        assert_eq!(FilterOutcome::Pass.to_string(), "PASS");
    }
}
