//! Precomputed log-likelihood table used by the candidate scan.

/// Largest count with its own bucket; larger counts share this bucket.
pub const MAX_CACHED_COUNT: usize = 4096;

/// Number of [`ErrorClass`] variants.
pub const ERROR_CLASSES: usize = 4;

const MIN_RATE: f64 = 1e-12;

/// Per-observation probability model a cached entry is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Observation agrees with the hypothesised genotype (`1 - e_balanced`).
    Match = 0,
    /// Background substitution error (`e_balanced`).
    BalancedError = 1,
    /// Reference allele seen under a homozygous-alternate hypothesis (`e_unbalanced`).
    UnbalancedError = 2,
    /// Either allele of a heterozygous site (`0.5`).
    Heterozygous = 3,
}

/// Lookup table of `count · ln(p)` for every count bucket and error class.
///
/// Built once before the scan and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct LikelihoodCache {
    table: Vec<f64>,
}

impl LikelihoodCache {
    /// Fill the whole table for the given substitution error rates.
    ///
    /// Rates are clamped into `(0, 0.5]`; configuration validation rejects
    /// values outside `(0, 0.5)` before this point.
    pub fn prefill(balanced_error: f64, unbalanced_error: f64) -> Self {
        let balanced_error = balanced_error.clamp(MIN_RATE, 0.5);
        let unbalanced_error = unbalanced_error.clamp(MIN_RATE, 0.5);
        let log_probabilities = [
            (1.0 - balanced_error).ln(),
            balanced_error.ln(),
            unbalanced_error.ln(),
            0.5f64.ln(),
        ];

        let mut table = Vec::with_capacity((MAX_CACHED_COUNT + 1) * ERROR_CLASSES);
        for count in 0..=MAX_CACHED_COUNT {
            table.extend(log_probabilities.iter().map(|&ln_p| count as f64 * ln_p));
        }

        Self { table }
    }

    /// `count · ln(p(class))`; counts above [`MAX_CACHED_COUNT`] saturate.
    #[inline]
    pub fn lookup(&self, count: u32, class: ErrorClass) -> f64 {
        let bucket = (count as usize).min(MAX_CACHED_COUNT);
        self.table[bucket * ERROR_CLASSES + class as usize]
    }
}
