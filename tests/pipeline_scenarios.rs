#[path = "common/mod.rs"]
mod common;

use std::collections::BTreeSet;
use std::fs;

use common::{reported_positions, scenario_counters, scenario_reference, test_config, Workspace};
use snapcall::calling::{
    CalibrationError, CandidateSelector, LikelihoodCache, LikelihoodRatioScorer, LogisticModel,
    ProbabilityCalibrator, RECORD_BYTES,
};
use snapcall::counters::snapshot;
use snapcall::pipeline::{self, FailureClass, Stage};
use snapcall::{BaseCounts, CounterModelBuilder};

#[test]
fn deep_candidate_is_called_and_shallow_site_is_not() {
    let workspace = Workspace::scenario();
    let summary = pipeline::run(&workspace.options, &test_config()).expect("run succeeds");

    assert_eq!(summary.genome_length, common::GENOME_LENGTH);
    assert_eq!(summary.selection.emitted, 3);
    assert_eq!(summary.selection.below_coverage, common::GENOME_LENGTH as u64 - 2 - 4);

    let report = workspace.report();
    assert_eq!(reported_positions(&report), vec![501, 1501, 3001]);
    assert!(!report.contains("\n2501\t"));

    let row = report
        .lines()
        .find(|line| line.starts_with("1501\t"))
        .expect("row for position 1500");
    assert!(row.starts_with("1501\tC\tA\thom\t41\t1\t40\t"));
    assert!(row.ends_with("\tPASS"));

    let het = report
        .lines()
        .find(|line| line.starts_with("3001\t"))
        .expect("row for the overflow position");
    assert!(het.starts_with("3001\tT\tC\thet\t300\t150\t150\t"));
}

#[test]
fn exome_filter_keeps_only_positions_inside_regions() {
    let workspace = Workspace::scenario().with_exome(&[(1000, 2000)]);
    let summary = pipeline::run(&workspace.options, &test_config()).expect("run succeeds");

    assert_eq!(summary.exome_regions, Some(1));
    assert_eq!(reported_positions(&workspace.report()), vec![1501]);
}

#[test]
fn unfiltered_run_is_a_superset_of_filtered_run() {
    let unfiltered = Workspace::scenario();
    pipeline::run(&unfiltered.options, &test_config()).unwrap();
    let all: BTreeSet<_> = reported_positions(&unfiltered.report()).into_iter().collect();

    for regions in [
        vec![(1000, 2000)],
        vec![(0, 600), (2900, 3100)],
        vec![(3000, 3001)],
        vec![(10, 20)],
    ] {
        let filtered = Workspace::scenario().with_exome(&regions);
        pipeline::run(&filtered.options, &test_config()).unwrap();
        let kept: BTreeSet<_> = reported_positions(&filtered.report()).into_iter().collect();
        assert!(kept.is_subset(&all), "{regions:?} produced {kept:?}");
        for position in &kept {
            let zero_based = (*position - 1) as u32;
            assert!(regions
                .iter()
                .any(|&(start, end)| (start..end).contains(&zero_based)));
        }
    }
}

#[test]
fn emitted_count_matches_calibrated_rows() {
    let workspace = Workspace::scenario();
    let summary = pipeline::run(&workspace.options, &test_config()).unwrap();
    assert_eq!(summary.selection.emitted, summary.calibration.records);
    assert_eq!(
        summary.calibration.passed + summary.calibration.low_probability,
        summary.calibration.records
    );
    assert_eq!(summary.calibration.trailing_bytes, 0);
}

#[test]
fn calibration_fails_fast_on_a_short_stream() {
    let reference = scenario_reference();
    let counters = scenario_counters();
    let cache = LikelihoodCache::prefill(0.005, 0.02);
    let config = test_config();
    let selector = CandidateSelector::new(
        &counters,
        &reference,
        None,
        LikelihoodRatioScorer::new(&cache),
        &config,
    )
    .unwrap();

    let mut stream = Vec::new();
    let selection = selector.select(&mut stream).unwrap();
    assert_eq!(stream.len() as u64, selection.emitted * RECORD_BYTES as u64);
    stream.truncate(stream.len() - 10);

    let calibrator = ProbabilityCalibrator::new(LogisticModel::default(), 0.5);
    let result = calibrator.calibrate(
        &mut stream.as_slice(),
        &mut Vec::new(),
        selection.emitted,
        false,
    );
    assert!(matches!(
        result,
        Err(CalibrationError::Truncated { expected: 3, read: 2 })
    ));
}

#[test]
fn intermediate_file_is_removed_after_success() {
    let workspace = Workspace::scenario();
    pipeline::run(&workspace.options, &test_config()).unwrap();
    assert!(workspace.options.report_path().exists());
    assert!(!workspace.options.intermediate_path().exists());
}

#[test]
fn failed_run_leaves_no_report() {
    let workspace = Workspace::scenario();
    let bytes = fs::read(workspace.options.snapshot_path()).unwrap();
    fs::write(workspace.options.snapshot_path(), &bytes[..bytes.len() / 2]).unwrap();

    let err = pipeline::run(&workspace.options, &test_config()).unwrap_err();
    assert_eq!(err.stage(), Stage::SnapshotLoad);
    assert_eq!(err.class(), FailureClass::Format);
    assert!(!workspace.options.report_path().exists());
    assert!(!workspace.options.intermediate_path().exists());
}

#[test]
fn snapshot_for_another_reference_is_rejected() {
    let workspace = Workspace::scenario();
    let mut builder = CounterModelBuilder::new(100, 1).unwrap();
    builder
        .record(10, BaseCounts::from_counts([40, 1, 0, 0, 0]), 0)
        .unwrap();
    snapshot::save(&builder.build(), &workspace.options.snapshot_path()).unwrap();

    let err = pipeline::run(&workspace.options, &test_config()).unwrap_err();
    assert_eq!(err.stage(), Stage::SnapshotLoad);
    assert!(err.to_string().contains("covers 100 positions"));
}

#[test]
fn missing_inputs_are_io_failures() {
    let workspace = Workspace::scenario();
    fs::remove_file(workspace.options.reference_path()).unwrap();
    let err = pipeline::run(&workspace.options, &test_config()).unwrap_err();
    assert_eq!(err.stage(), Stage::IndexLoad);
    assert_eq!(err.class(), FailureClass::Io);

    let workspace = Workspace::scenario();
    let options = workspace
        .options
        .clone()
        .with_exome(workspace.dir.path().join("absent.bin"));
    let err = pipeline::run(&options, &test_config()).unwrap_err();
    assert_eq!(err.stage(), Stage::ExomeLoad);
    assert_eq!(err.class(), FailureClass::Io);
}

#[cfg(unix)]
#[test]
fn report_is_readable_by_group_and_others() {
    use std::os::unix::fs::PermissionsExt;

    let workspace = Workspace::scenario();
    pipeline::run(&workspace.options, &test_config()).unwrap();
    let mode = fs::metadata(workspace.options.report_path())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, pipeline::REPORT_MODE);
}
