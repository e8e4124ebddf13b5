use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use snapcall::util::dir_of_prefix_exists;
use snapcall::{pipeline, CallerConfig, PipelineError, RunOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "snapcall",
    about = "Call SNP candidates from a counter snapshot and calibrate their probabilities",
    disable_version_flag = true
)]
struct Cli {
    /// Reference index prefix (`<prefix>.pac`).
    #[arg(short = 'i', value_name = "indexPrefix")]
    index_prefix: PathBuf,
    /// Output prefix; reads `<prefix>.snapshot`, writes `<prefix>.txt`.
    #[arg(short = 'o', value_name = "outputPrefix")]
    output_prefix: PathBuf,
    /// Binary exome region index; restricts calling to its intervals.
    #[arg(short = 'e', value_name = "exomeRegionFile")]
    exome: Option<PathBuf>,
    /// Verbose calibration diagnostics.
    #[arg(short = 'v', action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> ExitCode {
    install_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage problems exit with 1; only help output counts as success.
            let status = match err.kind() {
                ErrorKind::DisplayHelp => 0,
                _ => 1,
            };
            let _ = err.print();
            return ExitCode::from(status);
        }
    };

    for prefix in [&cli.index_prefix, &cli.output_prefix] {
        if !dir_of_prefix_exists(prefix) {
            eprintln!(
                "error: directory of prefix '{}' does not exist\n\n{}",
                prefix.display(),
                Cli::command().render_usage()
            );
            return ExitCode::from(1);
        }
    }

    init_tracing(cli.verbose);

    // Unwinding out of `run` drops the intermediate and staged report files.
    match panic::catch_unwind(AssertUnwindSafe(|| run(cli))) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            if let Some(failure) = err.downcast_ref::<PipelineError>() {
                tracing::debug!(stage = %failure.stage(), class = ?failure.class(), "run failed");
            }
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
        Err(_) => ExitCode::from(1),
    }
}

fn run(cli: Cli) -> Result<()> {
    let program = std::env::args_os()
        .next()
        .unwrap_or_else(|| "snapcall".into());
    let config_path = CallerConfig::companion_path(program);
    let config = pipeline::load_config(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let mut options =
        RunOptions::new(cli.index_prefix, cli.output_prefix).with_verbose(cli.verbose);
    if let Some(exome) = cli.exome {
        options = options.with_exome(exome);
    }

    let summary = pipeline::run(&options, &config).context("variant calling failed")?;
    tracing::debug!(
        emitted = summary.selection.emitted,
        passed = summary.calibration.passed,
        "report written"
    );
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("snapcall=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Last-resort handler: report the panic with a backtrace. `main` turns the
/// unwound panic into exit status 1.
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        eprintln!("fatal error: {info}");
        eprintln!("stack backtrace:\n{backtrace}");
    }));
}
