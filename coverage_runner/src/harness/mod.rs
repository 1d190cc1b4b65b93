//! Test discovery and execution.
//!
//! A test case is an executable whose file name follows the project's test
//! naming convention (`test_*` by default). Each case runs as its own child
//! process, so instrumented binaries emit raw profiles for the coverage
//! session that wraps the run.

mod discovery;
mod runner;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::DiscoveryResult;

pub use discovery::{discover, DEFAULT_PATTERN};
pub use runner::ProcessEngine;

/// How much the harness prints while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Summary only.
    Quiet,
    /// One progress character per case.
    #[default]
    Progress,
    /// One line per case.
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => Verbosity::Verbose,
            (false, true) => Verbosity::Quiet,
            (false, false) => Verbosity::Progress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Path relative to the discovery root, used for display and ordering.
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSuite {
    cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(mut cases: Vec<TestCase>) -> Self {
        cases.sort_by(|a, b| a.name.cmp(&b.name));
        Self { cases }
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn executables(&self) -> impl Iterator<Item = &Path> {
        self.cases.iter().map(|case| case.path.as_path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Passed,
    Failed,
    Errored,
}

impl Status {
    pub fn progress_char(self) -> char {
        match self {
            Status::Passed => '.',
            Status::Failed => 'F',
            Status::Errored => 'E',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Passed => "ok",
            Status::Failed => "FAIL",
            Status::Errored => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub name: String,
    pub status: Status,
    pub duration: Duration,
    /// Captured stdout/stderr, or the spawn error for errored cases.
    pub output: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub outcomes: Vec<TestOutcome>,
    pub elapsed: Duration,
}

impl RunResult {
    fn count(&self, status: Status) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn tests_run(&self) -> usize {
        self.outcomes.len()
    }

    pub fn passed(&self) -> usize {
        self.count(Status::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(Status::Failed)
    }

    pub fn errored(&self) -> usize {
        self.count(Status::Errored)
    }

    pub fn was_successful(&self) -> bool {
        self.failed() == 0 && self.errored() == 0
    }
}

/// Discovery/execution collaborator driven by the harness.
pub trait TestEngine {
    fn discover(&self, root: &Path) -> DiscoveryResult<TestSuite>;

    /// Runs every case to completion; individual failures never abort the batch.
    fn run(&self, suite: &TestSuite, verbosity: Verbosity) -> RunResult;
}
