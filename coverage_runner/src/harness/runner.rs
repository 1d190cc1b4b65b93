use std::{
    io::{self, Write},
    path::Path,
    process::{Command, Stdio},
    time::Instant,
};

use tracing::{debug, info, warn};

use super::{
    discover, RunResult, Status, TestCase, TestEngine, TestOutcome, TestSuite, Verbosity,
};
use crate::error::DiscoveryResult;

const SEPARATOR_HEAVY: &str =
    "======================================================================";
const SEPARATOR_LIGHT: &str =
    "----------------------------------------------------------------------";

/// Runs each discovered executable as a child process of the harness.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    pattern: String,
}

impl ProcessEngine {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// Same as [`TestEngine::run`], with progress written to `out`.
    pub fn run_with_output(
        &self,
        suite: &TestSuite,
        verbosity: Verbosity,
        out: &mut dyn Write,
    ) -> RunResult {
        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(suite.len());
        // Console failures never change test outcomes; the first one is logged.
        let mut console_error = None;

        for case in suite.cases() {
            note(&mut console_error, write_started(out, verbosity, case));

            let outcome = execute(case);
            debug!(test = %outcome.name, status = ?outcome.status, "Test finished");

            note(&mut console_error, write_finished(out, verbosity, outcome.status));
            outcomes.push(outcome);
        }
        if verbosity == Verbosity::Progress && !suite.is_empty() {
            note(&mut console_error, writeln!(out));
        }

        let result = RunResult {
            outcomes,
            elapsed: started.elapsed(),
        };
        note(&mut console_error, write_summary(&result, out));
        if let Some(err) = console_error {
            warn!(error = %err, "Could not write test progress to the console");
        }

        info!(
            run = result.tests_run(),
            passed = result.passed(),
            failed = result.failed(),
            errored = result.errored(),
            "Test run complete"
        );
        result
    }
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new(super::DEFAULT_PATTERN)
    }
}

impl TestEngine for ProcessEngine {
    fn discover(&self, root: &Path) -> DiscoveryResult<TestSuite> {
        discover(root, &self.pattern)
    }

    fn run(&self, suite: &TestSuite, verbosity: Verbosity) -> RunResult {
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        self.run_with_output(suite, verbosity, &mut handle)
    }
}

fn execute(case: &TestCase) -> TestOutcome {
    let started = Instant::now();
    let output = Command::new(&case.path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let (status, captured) = match output {
        Ok(output) => {
            let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
            captured.push_str(&String::from_utf8_lossy(&output.stderr));
            let status = match output.status.code() {
                Some(0) => Status::Passed,
                Some(_) => Status::Failed,
                // Terminated by a signal.
                None => Status::Errored,
            };
            if status == Status::Errored {
                captured.push_str(&format!("{}\n", output.status));
            }
            (status, captured)
        }
        Err(err) => (
            Status::Errored,
            format!("failed to spawn {}: {}\n", case.path.display(), err),
        ),
    };

    TestOutcome {
        name: case.name.clone(),
        status,
        duration: started.elapsed(),
        output: captured,
    }
}

fn note(first: &mut Option<io::Error>, result: io::Result<()>) {
    if let Err(err) = result {
        first.get_or_insert(err);
    }
}

fn write_started(out: &mut dyn Write, verbosity: Verbosity, case: &TestCase) -> io::Result<()> {
    if verbosity == Verbosity::Verbose {
        write!(out, "{} ... ", case.name)?;
        out.flush()?;
    }
    Ok(())
}

fn write_finished(out: &mut dyn Write, verbosity: Verbosity, status: Status) -> io::Result<()> {
    match verbosity {
        Verbosity::Verbose => writeln!(out, "{}", status.label()),
        Verbosity::Progress => {
            write!(out, "{}", status.progress_char())?;
            out.flush()
        }
        Verbosity::Quiet => Ok(()),
    }
}

fn write_summary(result: &RunResult, out: &mut dyn Write) -> io::Result<()> {
    for outcome in result
        .outcomes
        .iter()
        .filter(|o| o.status != Status::Passed)
    {
        writeln!(out, "{SEPARATOR_HEAVY}")?;
        writeln!(out, "{}: {}", outcome.status.label(), outcome.name)?;
        writeln!(out, "{SEPARATOR_LIGHT}")?;
        write!(out, "{}", outcome.output)?;
        if !outcome.output.ends_with('\n') {
            writeln!(out)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{SEPARATOR_LIGHT}")?;
    let run = result.tests_run();
    writeln!(
        out,
        "Ran {} test{} in {:.3}s",
        run,
        if run == 1 { "" } else { "s" },
        result.elapsed.as_secs_f64()
    )?;
    writeln!(out)?;

    if result.was_successful() {
        writeln!(out, "OK")?;
    } else {
        let mut details = Vec::new();
        if result.failed() > 0 {
            details.push(format!("failures={}", result.failed()));
        }
        if result.errored() > 0 {
            details.push(format!("errors={}", result.errored()));
        }
        writeln!(out, "FAILED ({})", details.join(", "))?;
    }
    out.flush()
}
