//! Candidate selection and probability calibration.
//!
//! The selector scans the counter model block by block and writes fixed-width
//! [`CandidateAttributeRecord`]s to a sequential sink; the calibrator reads
//! back exactly the announced number of records and renders the report.

pub mod calibrator;
pub mod likelihood;
pub mod record;
pub mod report;
pub mod scan;
pub mod scoring;
pub mod selector;

pub use calibrator::{
    CalibrationError, CalibrationSummary, LogisticModel, ProbabilityCalibrator, ProbabilityModel,
};
pub use likelihood::{ErrorClass, LikelihoodCache, MAX_CACHED_COUNT};
pub use record::{CandidateAttributeRecord, RecordError, RECORD_BYTES};
pub use report::{render_report, FilterOutcome, VariantReportEntry, REPORT_HEADER};
pub use scan::{BlockContext, BlockProcessor, ScanError, ScanPlan};
pub use selector::{CandidateSelector, Evaluation, SelectionSummary, SelectorError};
pub use scoring::{Genotype, LikelihoodRatioScorer, SiteScore, SiteScorer};
