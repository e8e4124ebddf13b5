use crate::counters::BaseCounts;
use crate::reference::{BaseCode, CANONICAL_BASES};

use super::likelihood::{ErrorClass, LikelihoodCache};

/// Genotype favoured by the variant hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Genotype {
    /// Both alleles carry the alternate base.
    Homozygous = 0,
    /// One reference and one alternate allele.
    Heterozygous = 1,
}

impl Genotype {
    /// Decode the wire representation.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Genotype::Homozygous),
            1 => Some(Genotype::Heterozygous),
            _ => None,
        }
    }

    /// Short label used in the report.
    pub fn label(self) -> &'static str {
        match self {
            Genotype::Homozygous => "hom",
            Genotype::Heterozygous => "het",
        }
    }
}

/// Result of scoring one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteScore {
    /// Alternate base proposed by the scorer.
    pub alternate: BaseCode,
    /// Better-supported variant genotype.
    pub genotype: Genotype,
    /// Log-likelihood ratio of the variant over the reference hypothesis.
    pub statistic: f64,
}

/// Scoring primitive called once per eligible position.
pub trait SiteScorer {
    /// Score the counts at a position whose reference base is `reference`.
    ///
    /// Returns `None` when there is no alternate evidence to score.
    fn score(&self, counts: &BaseCounts, reference: BaseCode) -> Option<SiteScore>;
}

/// Likelihood-ratio scorer backed by a [`LikelihoodCache`].
///
/// Compares a homozygous-reference hypothesis against the better of a
/// homozygous-alternate and a heterozygous hypothesis. Only the most frequent
/// non-reference base is considered as the alternate allele.
#[derive(Debug, Clone, Copy)]
pub struct LikelihoodRatioScorer<'a> {
    cache: &'a LikelihoodCache,
}

impl<'a> LikelihoodRatioScorer<'a> {
    /// Wrap a prefilled cache.
    pub fn new(cache: &'a LikelihoodCache) -> Self {
        Self { cache }
    }
}

impl SiteScorer for LikelihoodRatioScorer<'_> {
    fn score(&self, counts: &BaseCounts, reference: BaseCode) -> Option<SiteScore> {
        if !reference.is_canonical() {
            return None;
        }

        let mut alternate = None;
        let mut alt_count = 0u32;
        for base in CANONICAL_BASES {
            if base == reference {
                continue;
            }
            let count = counts.count(base);
            if count > alt_count {
                alt_count = count;
                alternate = Some(base);
            }
        }
        let alternate = alternate?;

        let ref_count = counts.count(reference);
        let rest: u32 = counts
            .counts()
            .iter()
            .enumerate()
            .filter(|&(idx, _)| idx != reference.index() && idx != alternate.index())
            .map(|(_, &count)| count)
            .sum();

        let cache = self.cache;
        let background = cache.lookup(rest, ErrorClass::BalancedError);
        let ll_reference = cache.lookup(ref_count, ErrorClass::Match)
            + cache.lookup(alt_count, ErrorClass::BalancedError)
            + background;
        let ll_homozygous = cache.lookup(alt_count, ErrorClass::Match)
            + cache.lookup(ref_count, ErrorClass::UnbalancedError)
            + background;
        let ll_heterozygous =
            cache.lookup(ref_count.saturating_add(alt_count), ErrorClass::Heterozygous) + background;

        let (genotype, ll_variant) = if ll_homozygous >= ll_heterozygous {
            (Genotype::Homozygous, ll_homozygous)
        } else {
            (Genotype::Heterozygous, ll_heterozygous)
        };

        Some(SiteScore {
            alternate,
            genotype,
            statistic: ll_variant - ll_reference,
        })
    }
}
