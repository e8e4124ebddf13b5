#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use snapcall::counters::snapshot;
use snapcall::pipeline::RunOptions;
use snapcall::{
    BaseCounts, CallerConfig, CounterModel, CounterModelBuilder, ExomeRegion, ExomeRegionTable,
    PackedReference,
};
use tempfile::TempDir;

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("SNAPCALL_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set SNAPCALL_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

pub const GENOME_LENGTH: usize = 4096;

/// Reference and counters shared by the pipeline scenarios.
///
/// - 500 and 1500: reference `C`, reads `{A:40, C:1}` (strong homozygous call)
/// - 2500: reference `G`, depth 3 (below the default coverage)
/// - 3000: reference `T`, `{C:150, T:150}` stored in the overflow pool
/// - 3500: reference `A`, `{A:40, C:1}` (reference-like, not significant)
/// - 3600: reference `G`, strong evidence but marked invalid
/// - 3700: ambiguous reference base with strong evidence
pub fn scenario_reference() -> PackedReference {
    let mut sequence = vec![b'A'; GENOME_LENGTH];
    sequence[500] = b'C';
    sequence[1500] = b'C';
    sequence[2500] = b'G';
    sequence[3000] = b'T';
    sequence[3600] = b'G';
    sequence[3700] = b'N';
    PackedReference::compress(&sequence).expect("valid reference")
}

pub fn scenario_counters() -> CounterModel {
    let mut builder = CounterModelBuilder::new(GENOME_LENGTH, 2).expect("builder");
    builder
        .record(500, BaseCounts::from_counts([40, 1, 0, 0, 0]), 0)
        .unwrap()
        .record(1500, BaseCounts::from_counts([40, 1, 0, 0, 0]), 1)
        .unwrap()
        .record(2500, BaseCounts::from_counts([2, 0, 1, 0, 0]), 0)
        .unwrap()
        .record(3000, BaseCounts::from_counts([0, 150, 0, 150, 0]), 1)
        .unwrap()
        .record(3500, BaseCounts::from_counts([40, 1, 0, 0, 0]), 0)
        .unwrap()
        .record(3600, BaseCounts::from_counts([30, 0, 0, 0, 0]), 0)
        .unwrap()
        .record(3700, BaseCounts::from_counts([0, 0, 25, 0, 0]), 1)
        .unwrap()
        .mark_invalid(3600)
        .unwrap();
    builder.build()
}

pub fn test_config() -> CallerConfig {
    CallerConfig::default()
        .with_threads(2)
        .with_scan_block_size(256)
}

/// Temporary directory holding one complete set of run inputs.
pub struct Workspace {
    pub dir: TempDir,
    pub options: RunOptions,
}

impl Workspace {
    pub fn new(reference: &PackedReference, counters: &CounterModel) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let options = RunOptions::new(dir.path().join("ref"), dir.path().join("sample"));
        reference
            .save(&options.reference_path())
            .expect("write reference");
        snapshot::save(counters, &options.snapshot_path()).expect("write snapshot");
        Self { dir, options }
    }

    pub fn scenario() -> Self {
        Self::new(&scenario_reference(), &scenario_counters())
    }

    pub fn with_exome(mut self, regions: &[(u32, u32)]) -> Self {
        let path = self.dir.path().join("exome.bin");
        let table = ExomeRegionTable::from_regions(
            regions
                .iter()
                .map(|&(start, end)| ExomeRegion::new(start, end))
                .collect(),
        )
        .expect("valid regions");
        table.save(&path).expect("write exome table");
        self.options = self.options.with_exome(path);
        self
    }

    pub fn report(&self) -> String {
        fs::read_to_string(self.options.report_path()).expect("report written")
    }
}

/// One-based positions listed in a report.
pub fn reported_positions(report: &str) -> Vec<u64> {
    report
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| {
            line.split('\t')
                .next()
                .and_then(|field| field.parse().ok())
                .expect("numeric position column")
        })
        .collect()
}
