//! Numeric parameters read from the companion `.ini` file.
//!
//! The file lives next to the executable (`<argv0>.ini`) and uses a flat
//! `Key = value` layout that is also valid TOML:
//!
//! ```text
//! NumOfCpuThreads = 8
//! BalanceSubError = 0.005
//! UnbalanceSubError = 0.02
//! MinCoverage = 10
//! ```

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Upper bound on `NumOfCpuThreads`.
pub const MAX_THREADS: usize = 1024;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file missing or unreadable.
    #[error("failed to read configuration file {}: {source}", .path.display())]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not a well-formed key/value document.
    #[error("failed to parse configuration file {}: {source}", .path.display())]
    Parse {
        /// Path that was being parsed.
        path: PathBuf,
        /// Parser diagnostic.
        #[source]
        source: toml::de::Error,
    },

    /// A key carried a value outside its permitted range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Offending key as spelled in the file.
        key: &'static str,
        /// Human readable constraint that was violated.
        reason: String,
    },
}

/// Parameters shared by every stage of a run.
///
/// Constructed once in `main` and passed by reference into each component.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default, deny_unknown_fields)]
pub struct CallerConfig {
    /// Worker count, at most [`MAX_THREADS`]; also the number of
    /// overflow-pool partitions.
    pub num_of_cpu_threads: usize,
    /// Balanced substitution error rate.
    pub balance_sub_error: f64,
    /// Unbalanced substitution error rate.
    pub unbalance_sub_error: f64,
    /// Minimum total depth before a position is scored.
    pub min_coverage: u32,
    /// Log-likelihood ratio a position must exceed to become a candidate.
    pub significance_threshold: f64,
    /// Calibrated probability at or above which a call is `PASS`.
    pub probability_cutoff: f64,
    /// Reference positions handled per scan block.
    pub scan_block_size: usize,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            num_of_cpu_threads: 4,
            balance_sub_error: 0.005,
            unbalance_sub_error: 0.02,
            min_coverage: 10,
            significance_threshold: 3.0,
            probability_cutoff: 0.5,
            scan_block_size: 1 << 20,
        }
    }
}

impl CallerConfig {
    /// Path of the companion file for a given executable path (`argv[0]`).
    pub fn companion_path(program: impl Into<OsString>) -> PathBuf {
        let mut name = program.into();
        name.push(".ini");
        PathBuf::from(name)
    }

    /// Read, parse and validate the configuration at `path`.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every key against its permitted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_of_cpu_threads == 0 {
            return Err(invalid("NumOfCpuThreads", "must be at least 1"));
        }
        if self.num_of_cpu_threads > MAX_THREADS {
            return Err(invalid(
                "NumOfCpuThreads",
                format!("{} exceeds the limit of {MAX_THREADS}", self.num_of_cpu_threads),
            ));
        }
        check_error_rate("BalanceSubError", self.balance_sub_error)?;
        check_error_rate("UnbalanceSubError", self.unbalance_sub_error)?;
        if !self.significance_threshold.is_finite() {
            return Err(invalid("SignificanceThreshold", "must be finite"));
        }
        if !(0.0..=1.0).contains(&self.probability_cutoff) {
            return Err(invalid("ProbabilityCutoff", "must lie in [0, 1]"));
        }
        if self.scan_block_size == 0 {
            return Err(invalid("ScanBlockSize", "must be at least 1"));
        }
        Ok(())
    }

    /// Override the worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_of_cpu_threads = threads;
        self
    }

    /// Override the minimum coverage.
    pub fn with_min_coverage(mut self, min_coverage: u32) -> Self {
        self.min_coverage = min_coverage;
        self
    }

    /// Override the scan block size.
    pub fn with_scan_block_size(mut self, scan_block_size: usize) -> Self {
        self.scan_block_size = scan_block_size;
        self
    }
}

fn check_error_rate(key: &'static str, rate: f64) -> Result<(), ConfigError> {
    if rate > 0.0 && rate < 0.5 {
        Ok(())
    } else {
        Err(invalid(key, format!("{rate} is not in (0, 0.5)")))
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.into(),
    }
}
