#[path = "common/mod.rs"]
mod common;
use common::assert_snapshot;
use snapcall::calling::{render_report, FilterOutcome, Genotype, VariantReportEntry};
use snapcall::BaseCode;

#[test]
fn render_report_matches_golden() {
    let entries = vec![
        VariantReportEntry {
            position: 7,
            reference: BaseCode::G,
            alternate: BaseCode::A,
            genotype: Genotype::Homozygous,
            depth: 12,
            ref_count: 0,
            alt_count: 11,
            statistic: 4.25,
            probability: 0.3,
            filter: FilterOutcome::classify(0.3, 0.5),
        },
        VariantReportEntry {
            position: 40,
            reference: BaseCode::A,
            alternate: BaseCode::G,
            genotype: Genotype::Homozygous,
            depth: 300,
            ref_count: 2,
            alt_count: 298,
            statistic: 1520.5,
            probability: 0.999999999,
            filter: FilterOutcome::classify(0.999999999, 0.5),
        },
        VariantReportEntry {
            position: 1499,
            reference: BaseCode::C,
            alternate: BaseCode::T,
            genotype: Genotype::Heterozygous,
            depth: 23,
            ref_count: 12,
            alt_count: 11,
            statistic: 12.345678,
            probability: 0.912345678,
            filter: FilterOutcome::classify(0.912345678, 0.5),
        },
    ];

    let actual = render_report(&entries).expect("report rendering should succeed");
    assert_snapshot("reports/simple.txt", &actual);
}
