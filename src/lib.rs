//! # Snapshot-based SNP calling
//!
//! Finishing stage of a variant-calling pipeline: turns a serialized snapshot
//! of per-position base-observation counters into a calibrated list of
//! candidate single-nucleotide variants.
//!
//! ## Pipeline
//!
//! 1. **Reference index**: packed 2-bit reference with an ambiguity mask
//! 2. **Snapshot**: inline counters plus a partitioned overflow pool
//! 3. **Candidate scan**: blocked, parallel likelihood-ratio scan, optionally
//!    restricted to exome regions
//! 4. **Calibration**: logistic probability per candidate, written as a
//!    tab-separated report
//!
//! ## Usage Example
//!
//! ```ignore
//! use snapcall::{pipeline, CallerConfig, RunOptions};
//!
//! let config = CallerConfig::from_path("snapcall.ini".as_ref())?;
//! let options = RunOptions::new("ref/hg38", "out/sample").with_exome("ref/exome.bin");
//! let summary = pipeline::run(&options, &config)?;
//! println!("{} candidates", summary.selection.emitted);
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod calling;   // Likelihood scan and calibration
pub mod config;    // Companion .ini parameters
pub mod counters;  // Counter model, overflow pool, snapshot format
pub mod exome;     // Exome region table
pub mod pipeline;  // Stage orchestration
pub mod reference; // Packed reference index
pub mod util;      // Binary helpers and path handling

// Re-exports for convenience
pub use calling::{
    CandidateAttributeRecord, CandidateSelector, LikelihoodCache, LikelihoodRatioScorer,
    LogisticModel, ProbabilityCalibrator, SelectionSummary,
};
pub use config::{CallerConfig, ConfigError};
pub use counters::{BaseCounts, CounterModel, CounterModelBuilder, MemoryPool, SnpBundle};
pub use exome::{ExomeRegion, ExomeRegionTable};
pub use pipeline::{FailureClass, PipelineError, RunOptions, RunSummary, Stage};
pub use reference::{BaseCode, PackedReference};
