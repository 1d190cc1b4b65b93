use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    coverage::{
        Collector, CoverageConfig, CoverageSession, EXCLUDE_UNTIL_PLUGIN, HTML_REPORT_DIR,
    },
    harness::{ProcessEngine, RunResult, TestEngine, Verbosity, DEFAULT_PATTERN},
    workdir::{self, Relocation},
};

/// Library whose sources are measured unless `--source` says otherwise.
pub const DEFAULT_SOURCE: &str = "libcellml";

/// Boundary in front of the generated binding wrappers.
pub const DEFAULT_MARKER: &str = "# libCellML generated wrapper code starts here.";

/// Root of the per-configuration directories, fixed when the runner is built.
pub fn build_time_working_root() -> PathBuf {
    PathBuf::from(option_env!("COVERAGE_WORKING_DIRECTORY").unwrap_or("."))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "coverage_runner",
    author,
    version,
    about = "Run the test suite under coverage and report on the library under test",
    long_about = None
)]
pub struct Args {
    /// Build configuration whose output directory the tests run in
    pub configuration: Option<String>,

    /// "html" writes coverage_html_report/; anything else prints a summary
    pub report_mode: Option<String>,

    /// Directory holding one subdirectory per build configuration
    #[arg(long, env = "COVERAGE_WORKING_ROOT", value_name = "PATH")]
    pub working_root: Option<PathBuf>,

    /// Module to measure (repeatable)
    #[arg(long = "source", value_name = "MODULE", default_value = DEFAULT_SOURCE)]
    pub sources: Vec<String>,

    /// Lines from the one containing this text onwards are not measured
    #[arg(long, default_value = DEFAULT_MARKER)]
    pub marker: String,

    /// Where to look for tests (defaults to the directory the runner starts in)
    #[arg(long, value_name = "PATH")]
    pub tests_dir: Option<PathBuf>,

    /// File name pattern identifying test executables
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Extra instrumented object (e.g. the shared library under test)
    #[arg(long = "object", value_name = "PATH")]
    pub objects: Vec<PathBuf>,

    /// Print one line per test
    #[arg(short, long)]
    pub verbose: bool,

    /// Print only the test summary
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Exit with status 1 when any test fails or errors
    #[arg(long)]
    pub fail_on_test_failure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Html,
    Text,
}

impl ReportMode {
    /// Exactly `"html"` selects HTML; every other value is textual.
    pub fn from_arg(value: &str) -> Self {
        if value == "html" {
            ReportMode::Html
        } else {
            ReportMode::Text
        }
    }
}

/// Whether test outcomes feed into the exit status. By default they do not:
/// the run succeeds whenever tests and coverage ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    #[default]
    IgnoreTestFailures,
    FailOnTestFailure,
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub configuration: String,
    pub report_mode: ReportMode,
    pub working_root: PathBuf,
    pub sources: Vec<String>,
    pub marker: String,
    pub tests_dir: Option<PathBuf>,
    pub pattern: String,
    pub objects: Vec<PathBuf>,
    pub verbosity: Verbosity,
    pub exit_policy: ExitPolicy,
}

impl From<Args> for HarnessConfig {
    fn from(value: Args) -> Self {
        let report_mode = value.report_mode.unwrap_or_default();
        Self {
            configuration: value.configuration.unwrap_or_default(),
            report_mode: ReportMode::from_arg(&report_mode),
            working_root: value.working_root.unwrap_or_else(build_time_working_root),
            sources: value.sources,
            marker: value.marker,
            tests_dir: value.tests_dir,
            pattern: value.pattern,
            objects: value.objects,
            verbosity: Verbosity::from_flags(value.verbose, value.quiet),
            exit_policy: if value.fail_on_test_failure {
                ExitPolicy::FailOnTestFailure
            } else {
                ExitPolicy::IgnoreTestFailures
            },
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub relocation: Relocation,
    pub run: RunResult,
    pub data_file: PathBuf,
    pub coverage_percent: f64,
    pub html_report: Option<PathBuf>,
}

impl RunSummary {
    pub fn exit_code(&self, policy: ExitPolicy) -> i32 {
        match policy {
            ExitPolicy::FailOnTestFailure if !self.run.was_successful() => 1,
            _ => 0,
        }
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Run the whole pipeline with the process test engine and LLVM coverage,
/// printing the text report (if any) to stdout.
pub fn run(config: &HarnessConfig) -> Result<RunSummary> {
    let engine = ProcessEngine::new(config.pattern.clone());
    let mut session = CoverageSession::new(CoverageConfig::new(config.sources.clone()));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_with(config, &engine, &mut session, &mut out)
}

fn absolute(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Configure → relocate → start → discover and run → stop and save → report.
pub fn run_with<E, C>(
    config: &HarnessConfig,
    engine: &E,
    session: &mut CoverageSession<C>,
    out: &mut dyn Write,
) -> Result<RunSummary>
where
    E: TestEngine,
    C: Collector,
{
    session.set_option("run:plugins", vec![EXCLUDE_UNTIL_PLUGIN])?;
    session.set_option(
        &format!("{EXCLUDE_UNTIL_PLUGIN}:marker"),
        config.marker.as_str(),
    )?;

    // Paths given on the command line are relative to where we started.
    let launch_dir = env::current_dir().context("failed to read the current directory")?;
    let tests_dir = config
        .tests_dir
        .as_deref()
        .map_or_else(|| launch_dir.clone(), |dir| absolute(dir, &launch_dir));
    let objects: Vec<PathBuf> = config
        .objects
        .iter()
        .map(|object| absolute(object, &launch_dir))
        .collect();

    let relocation = workdir::relocate(&config.working_root, &config.configuration)
        .context("failed to enter the configuration directory")?;

    session.start().context("failed to start coverage")?;

    let suite = engine
        .discover(&tests_dir)
        .with_context(|| format!("test discovery failed under {}", tests_dir.display()))?;
    info!(tests = suite.len(), root = %tests_dir.display(), "Discovered tests");
    session.add_objects(suite.executables().map(Path::to_path_buf));
    session.add_objects(objects);

    let run = engine.run(&suite, config.verbosity);

    session.stop().context("failed to stop coverage")?;
    let data_file = session.save().context("failed to save coverage data")?;

    let (coverage_percent, html_report) = match config.report_mode {
        ReportMode::Html => {
            let directory = PathBuf::from(HTML_REPORT_DIR);
            let percent = session
                .html_report(&directory)
                .context("failed to write the HTML report")?;
            (percent, Some(relocation.current.join(directory)))
        }
        ReportMode::Text => {
            let percent = session
                .report(out)
                .context("failed to write the coverage report")?;
            (percent, None)
        }
    };

    Ok(RunSummary {
        relocation,
        run,
        data_file,
        coverage_percent,
        html_report,
    })
}
