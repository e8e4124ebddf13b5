//! End-to-end run: reference index, exome table, snapshot, scan, calibration.
//!
//! Every stage prints a progress banner and its elapsed time on stdout.
//! Failures carry the stage and the file involved so they can be diagnosed
//! from the message alone.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::calling::{
    CalibrationError, CalibrationSummary, CandidateSelector, LikelihoodCache,
    LikelihoodRatioScorer, LogisticModel, ProbabilityCalibrator, SelectionSummary, SelectorError,
};
use crate::config::{CallerConfig, ConfigError};
use crate::counters::{snapshot, SnapshotError, SnpBundle};
use crate::exome::{ExomeError, ExomeRegionTable};
use crate::reference::{PackedReference, ReferenceError, PAC_SUFFIX};
use crate::util::prefixed_path;

/// Suffix of the snapshot written by the upstream alignment stage.
pub const SNAPSHOT_SUFFIX: &str = ".snapshot";
/// Suffix of the intermediate candidate stream.
pub const INTERMEDIATE_SUFFIX: &str = ".tmpresult";
/// Suffix of the final report.
pub const REPORT_SUFFIX: &str = ".txt";
/// Unix mode bits of the final report.
pub const REPORT_MODE: u32 = 0o644;

/// Inputs of one run, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Prefix of the reference index (`<prefix>.pac`).
    pub index_prefix: PathBuf,
    /// Prefix of the snapshot, intermediate stream and report.
    pub output_prefix: PathBuf,
    /// Optional binary exome region index.
    pub exome_path: Option<PathBuf>,
    /// Per-record calibration diagnostics.
    pub verbose: bool,
}

impl RunOptions {
    /// Options without exome filtering or verbose output.
    pub fn new(index_prefix: impl Into<PathBuf>, output_prefix: impl Into<PathBuf>) -> Self {
        Self {
            index_prefix: index_prefix.into(),
            output_prefix: output_prefix.into(),
            exome_path: None,
            verbose: false,
        }
    }

    /// Restrict the scan to the regions in `path`.
    pub fn with_exome(mut self, path: impl Into<PathBuf>) -> Self {
        self.exome_path = Some(path.into());
        self
    }

    /// Toggle verbose calibration output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// `<index_prefix>.pac`
    pub fn reference_path(&self) -> PathBuf {
        prefixed_path(&self.index_prefix, PAC_SUFFIX)
    }

    /// `<output_prefix>.snapshot`
    pub fn snapshot_path(&self) -> PathBuf {
        prefixed_path(&self.output_prefix, SNAPSHOT_SUFFIX)
    }

    /// `<output_prefix>.tmpresult`
    pub fn intermediate_path(&self) -> PathBuf {
        prefixed_path(&self.output_prefix, INTERMEDIATE_SUFFIX)
    }

    /// `<output_prefix>.txt`
    pub fn report_path(&self) -> PathBuf {
        prefixed_path(&self.output_prefix, REPORT_SUFFIX)
    }
}

/// Pipeline stage in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the companion configuration.
    Config,
    /// Loading the reference index.
    IndexLoad,
    /// Loading the exome region table.
    ExomeLoad,
    /// Reading the counter snapshot.
    SnapshotLoad,
    /// Scanning for candidates.
    Selection,
    /// Calibrating candidates and writing the report.
    Calibration,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Config => "configuration",
            Stage::IndexLoad => "reference index load",
            Stage::ExomeLoad => "exome region load",
            Stage::SnapshotLoad => "snapshot load",
            Stage::Selection => "candidate selection",
            Stage::Calibration => "calibration",
        })
    }
}

/// Coarse failure taxonomy; every class ends the process with status 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Bad or missing command-line arguments.
    Usage,
    /// Configuration missing, unparseable, or out of range.
    Config,
    /// File missing, unreadable, or unwritable.
    Io,
    /// Truncated or inconsistent binary input.
    Format,
}

/// Errors surfaced by [`run`], tagged with their stage and file.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration could not be loaded.
    #[error("{stage}: {0}", stage = Stage::Config)]
    Config(#[from] ConfigError),

    /// Reference index could not be loaded.
    #[error("{stage} ({}): {source}", .path.display(), stage = Stage::IndexLoad)]
    Reference {
        /// Index file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: ReferenceError,
    },

    /// Exome region table could not be loaded.
    #[error("{stage} ({}): {source}", .path.display(), stage = Stage::ExomeLoad)]
    Exome {
        /// Region file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: ExomeError,
    },

    /// Snapshot could not be loaded.
    #[error("{stage} ({}): {source}", .path.display(), stage = Stage::SnapshotLoad)]
    Snapshot {
        /// Snapshot file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: SnapshotError,
    },

    /// Candidate scan failed.
    #[error("{stage} ({}): {source}", .path.display(), stage = Stage::Selection)]
    Selection {
        /// Intermediate stream being written.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: SelectorError,
    },

    /// Calibration failed.
    #[error("{stage} ({}): {source}", .path.display(), stage = Stage::Calibration)]
    Calibration {
        /// Intermediate stream being read.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: CalibrationError,
    },

    /// File handling around a stage failed.
    #[error("{stage} ({}): {source}", .path.display())]
    Io {
        /// Stage that owned the file.
        stage: Stage,
        /// File involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    /// Stage in which the error occurred.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config(_) => Stage::Config,
            PipelineError::Reference { .. } => Stage::IndexLoad,
            PipelineError::Exome { .. } => Stage::ExomeLoad,
            PipelineError::Snapshot { .. } => Stage::SnapshotLoad,
            PipelineError::Selection { .. } => Stage::Selection,
            PipelineError::Calibration { .. } => Stage::Calibration,
            PipelineError::Io { stage, .. } => *stage,
        }
    }

    /// Failure class of the error.
    pub fn class(&self) -> FailureClass {
        match self {
            PipelineError::Config(_) => FailureClass::Config,
            PipelineError::Reference { source, .. } => match source {
                ReferenceError::Io { .. } => FailureClass::Io,
                _ => FailureClass::Format,
            },
            PipelineError::Exome { source, .. } => match source {
                ExomeError::Io { .. } => FailureClass::Io,
                _ => FailureClass::Format,
            },
            PipelineError::Snapshot { source, .. } => match source {
                SnapshotError::Io { .. } => FailureClass::Io,
                _ => FailureClass::Format,
            },
            PipelineError::Selection { source, .. } => match source {
                SelectorError::Plan(_) => FailureClass::Config,
                SelectorError::LengthMismatch { .. } => FailureClass::Format,
                SelectorError::Workers(_) | SelectorError::Sink(_) => FailureClass::Io,
            },
            PipelineError::Calibration { source, .. } => match source {
                CalibrationError::Report(_) => FailureClass::Io,
                _ => FailureClass::Format,
            },
            PipelineError::Io { .. } => FailureClass::Io,
        }
    }
}

/// Counts and paths reported after a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Reference length.
    pub genome_length: usize,
    /// Exome intervals after normalisation, if filtering was enabled.
    pub exome_regions: Option<usize>,
    /// Scan tallies.
    pub selection: SelectionSummary,
    /// Calibration tallies.
    pub calibration: CalibrationSummary,
    /// Final report location.
    pub report_path: PathBuf,
}

/// Intermediate candidate stream, removed when the guard is dropped.
#[derive(Debug)]
pub struct IntermediateFile {
    path: PathBuf,
    armed: bool,
}

impl IntermediateFile {
    /// Create (or truncate) the file at `path` and take ownership of its removal.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<(Self, File)> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok((Self { path, armed: true }, file))
    }

    /// Location of the stream.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reopen the stream for reading.
    pub fn open(&self) -> io::Result<File> {
        File::open(&self.path)
    }

    /// Delete the file now, reporting failure.
    pub fn remove(mut self) -> io::Result<()> {
        self.armed = false;
        fs::remove_file(&self.path)
    }
}

impl Drop for IntermediateFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), %err, "intermediate file not removed");
            }
        }
    }
}

/// Read and validate the companion configuration at `path`.
pub fn load_config(path: &Path) -> Result<CallerConfig, PipelineError> {
    Ok(CallerConfig::from_path(path)?)
}

/// Execute every stage and write `<output_prefix>.txt`.
///
/// The report appears only if every stage succeeds; the intermediate stream
/// is removed on every exit path.
pub fn run(options: &RunOptions, config: &CallerConfig) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let run_started = Instant::now();

    println!("Loading reference index...");
    let started = Instant::now();
    let reference_path = options.reference_path();
    let reference =
        PackedReference::load(&reference_path).map_err(|source| PipelineError::Reference {
            path: reference_path.clone(),
            source,
        })?;
    println!("Done in {:9.4} seconds", started.elapsed().as_secs_f64());
    println!("Reference sequence length: {}\n", reference.len());

    let exome = match &options.exome_path {
        Some(path) => {
            let started = Instant::now();
            let table = ExomeRegionTable::load(path).map_err(|source| PipelineError::Exome {
                path: path.clone(),
                source,
            })?;
            println!("{} Exome Regions loaded", table.len());
            debug!(covered = table.covered_bases(), "exome positions eligible for calling");
            println!("Elapsed time : {:9.4} seconds\n", started.elapsed().as_secs_f64());
            Some(table)
        }
        None => None,
    };

    println!("Reading snapshot...");
    let started = Instant::now();
    let snapshot_path = options.snapshot_path();
    let bundle: SnpBundle = snapshot::load(&snapshot_path, reference.len()).map_err(|source| {
        PipelineError::Snapshot {
            path: snapshot_path.clone(),
            source,
        }
    })?;
    println!("Read snapshot in {:9.4} seconds\n", started.elapsed().as_secs_f64());

    println!("Handling SNP Counter Result");
    let started = Instant::now();
    let cache = LikelihoodCache::prefill(config.balance_sub_error, config.unbalance_sub_error);
    let intermediate_path = options.intermediate_path();
    let selection_error = |source| PipelineError::Selection {
        path: intermediate_path.clone(),
        source,
    };
    let selector = CandidateSelector::new(
        &bundle,
        &reference,
        exome.as_ref(),
        LikelihoodRatioScorer::new(&cache),
        config,
    )
    .map_err(selection_error)?;

    let (intermediate, file) =
        IntermediateFile::create(&intermediate_path).map_err(|source| PipelineError::Io {
            stage: Stage::Selection,
            path: intermediate_path.clone(),
            source,
        })?;
    let mut sink = BufWriter::new(file);
    let selection = selector.select(&mut sink).map_err(selection_error)?;
    drop(sink);
    println!("Elapsed time : {:9.4} seconds\n", started.elapsed().as_secs_f64());

    let report_path = options.report_path();
    println!("Writing variants to {}", report_path.display());
    let started = Instant::now();
    let calibration = calibrate_into(
        options,
        config,
        &intermediate,
        &report_path,
        selection.emitted,
    )?;
    println!("Elapsed time : {:9.4} seconds\n", started.elapsed().as_secs_f64());

    intermediate
        .remove()
        .map_err(|source| PipelineError::Io {
            stage: Stage::Calibration,
            path: intermediate_path.clone(),
            source,
        })?;
    drop(bundle);

    info!(
        emitted = selection.emitted,
        passed = calibration.passed,
        report = %report_path.display(),
        "run finished"
    );
    println!(
        "Total Running Time: {:9.4} seconds\n",
        run_started.elapsed().as_secs_f64()
    );

    Ok(RunSummary {
        genome_length: reference.len(),
        exome_regions: exome.as_ref().map(ExomeRegionTable::len),
        selection,
        calibration,
        report_path,
    })
}

fn calibrate_into(
    options: &RunOptions,
    config: &CallerConfig,
    intermediate: &IntermediateFile,
    report_path: &Path,
    expected: u64,
) -> Result<CalibrationSummary, PipelineError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PipelineError::Io {
            stage: Stage::Calibration,
            path,
            source,
        }
    };

    let mut input = BufReader::new(intermediate.open().map_err(io_error(intermediate.path()))?);
    let report_dir = match report_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(report_dir).map_err(io_error(report_dir))?;

    let calibrator = ProbabilityCalibrator::new(LogisticModel::default(), config.probability_cutoff);
    let summary = {
        let mut output = BufWriter::new(staged.as_file_mut());
        let summary = calibrator
            .calibrate(&mut input, &mut output, expected, options.verbose)
            .map_err(|source| PipelineError::Calibration {
                path: intermediate.path().to_path_buf(),
                source,
            })?;
        output.flush().map_err(io_error(report_path))?;
        summary
    };

    report_permissions(staged.as_file()).map_err(io_error(report_path))?;
    staged
        .persist(report_path)
        .map_err(|err| io_error(report_path)(err.error))?;
    Ok(summary)
}

/// Staged files are created owner-only; the report is shared like any
/// file opened for writing.
#[cfg(unix)]
fn report_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(REPORT_MODE))
}

#[cfg(not(unix))]
fn report_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_follow_prefixes() {
        let options = RunOptions::new("idx/hg", "out/sample").with_exome("exome.bin");
        assert_eq!(options.reference_path(), PathBuf::from("idx/hg.pac"));
        assert_eq!(options.snapshot_path(), PathBuf::from("out/sample.snapshot"));
        assert_eq!(options.intermediate_path(), PathBuf::from("out/sample.tmpresult"));
        assert_eq!(options.report_path(), PathBuf::from("out/sample.txt"));
        assert_eq!(options.exome_path, Some(PathBuf::from("exome.bin")));
    }

    #[test]
    fn intermediate_guard_removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.tmpresult");
        {
            let (guard, mut file) = IntermediateFile::create(&path).unwrap();
            file.write_all(b"partial").unwrap();
            assert!(guard.path().exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn intermediate_guard_removes_file_when_unwinding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.tmpresult");
        let result = std::panic::catch_unwind(|| {
            let (_guard, mut file) = IntermediateFile::create(&path).unwrap();
            file.write_all(b"partial").unwrap();
            panic!("selection aborted");
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn errors_name_stage_and_file() {
        let err = PipelineError::Snapshot {
            path: PathBuf::from("out/sample.snapshot"),
            source: SnapshotError::Truncated {
                path: PathBuf::from("out/sample.snapshot"),
            },
        };
        assert_eq!(err.stage(), Stage::SnapshotLoad);
        assert_eq!(err.class(), FailureClass::Format);
        let message = err.to_string();
        assert!(message.starts_with("snapshot load (out/sample.snapshot)"));
    }

    #[test]
    fn invalid_config_fails_before_any_stage() {
        let config = CallerConfig::default().with_threads(0);
        let err = run(&RunOptions::new("missing", "missing"), &config).unwrap_err();
        assert_eq!(err.stage(), Stage::Config);
        assert_eq!(err.class(), FailureClass::Config);
    }
}
