//! Coverage measurement around a test run.

mod config;
mod data;
mod exclusion;
mod html;
mod llvm;
mod report;
mod session;

pub use config::{
    CoverageConfig, CoverageOption, OptionValue, PluginKind, DEFAULT_DATA_FILE,
    EXCLUDE_UNTIL_PLUGIN,
};
pub use data::{parse_lcov, CoverageData, FileCoverage, LineHits, SourceFilter, Totals};
pub use exclusion::{ExcludeUntilMarker, ExclusionRule};
pub use llvm::{LlvmCollector, LlvmToolchain, ToolchainSource, PROFILE_FILE_ENV};
pub use report::display_percent;
pub use session::{Collector, CoverageSession, SessionState};

/// Directory the HTML report is rendered into, relative to the cwd.
pub const HTML_REPORT_DIR: &str = "coverage_html_report";

/// Scratch directory for raw LLVM profiles, relative to the cwd.
pub const PROFRAW_DIR: &str = ".coverage_profraw";
