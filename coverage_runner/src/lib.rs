//! # Coverage Runner
//!
//! Runs a project's test executables under LLVM source-based coverage,
//! scoped to the library under test, and reports the result.
//!
//! ## Usage
//!
//! ```bash
//! # Text summary, tests run from <working-root>/
//! coverage_runner
//!
//! # HTML report, tests run from <working-root>/debug
//! coverage_runner debug html
//! ```
//!
//! Everything from the line carrying the exclusion marker to the end of a
//! file (generated binding wrappers) is left out of the numbers.

pub mod app;
pub mod coverage;
pub mod error;
pub mod harness;
pub mod workdir;

pub use app::{Args, ExitPolicy, HarnessConfig, ReportMode, RunSummary};
pub use error::{CoverageError, DiscoveryError, WorkdirError};
