//! LLVM source-based coverage backend.
//!
//! Instrumented binaries (built with `-C instrument-coverage` or
//! `-fprofile-instr-generate -fcoverage-mapping`) write `.profraw` files to
//! wherever `LLVM_PROFILE_FILE` points. Collection then works in two steps:
//! - `llvm-profdata merge -sparse` folds the raw profiles into one `.profdata`
//! - `llvm-cov export -format=lcov` maps it back onto source lines
//!
//! ## Tool Discovery
//!
//! `LLVM_PROFDATA`/`LLVM_COV` override everything. Otherwise the tools are
//! looked up on `PATH`, then in Homebrew's LLVM prefixes, then in the active
//! rustup toolchain (`rustup component add llvm-tools-preview`).

use std::{
    env,
    ffi::OsString,
    fmt, fs,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{
    data::{parse_lcov, LineHits},
    session::Collector,
    PROFRAW_DIR,
};
use crate::error::{CoverageError, CoverageResult};

pub const PROFILE_FILE_ENV: &str = "LLVM_PROFILE_FILE";
const PROFRAW_TEMPLATE: &str = "prof-%p-%m.profraw";
const MERGED_PROFDATA: &str = "merged.profdata";

/// The pair of LLVM tools needed to turn raw profiles into line data.
#[derive(Debug, Clone)]
pub struct LlvmToolchain {
    pub profdata: PathBuf,
    pub cov: PathBuf,
    pub source: ToolchainSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainSource {
    Environment, // LLVM_PROFDATA / LLVM_COV
    System,      // Found on PATH
    Homebrew,    // Homebrew-installed LLVM
    Rustup,      // Rust's bundled LLVM tools
}

impl fmt::Display for ToolchainSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => write!(f, "LLVM_PROFDATA/LLVM_COV"),
            Self::System => write!(f, "System LLVM"),
            Self::Homebrew => write!(f, "Homebrew LLVM"),
            Self::Rustup => write!(f, "Rust toolchain (rustup)"),
        }
    }
}

impl LlvmToolchain {
    pub fn detect() -> CoverageResult<Self> {
        let toolchain = detect_from_environment()
            .or_else(detect_system_toolchain)
            .or_else(detect_homebrew_toolchain)
            .or_else(detect_rustup_toolchain)
            .ok_or_else(|| {
                CoverageError::Toolchain(
                    "llvm-profdata/llvm-cov not found. Install LLVM or run: \
                     rustup component add llvm-tools-preview"
                        .to_string(),
                )
            })?;
        info!(
            source = %toolchain.source,
            profdata = %toolchain.profdata.display(),
            cov = %toolchain.cov.display(),
            "Detected LLVM toolchain"
        );
        Ok(toolchain)
    }

    pub fn merge_profdata(&self, profraw_files: &[PathBuf], output: &Path) -> CoverageResult<()> {
        let mut cmd = Command::new(&self.profdata);
        cmd.arg("merge").arg("-sparse").args(profraw_files);
        cmd.arg("-o").arg(output);

        let result = cmd
            .output()
            .map_err(|err| CoverageError::io(&self.profdata, err))?;
        if !result.status.success() {
            return Err(CoverageError::tool("llvm-profdata merge", &result.stderr));
        }
        Ok(())
    }

    /// LCOV text for `objects`. The first object is positional; `llvm-cov`
    /// takes every further one through `-object`.
    pub fn export_lcov(&self, objects: &[PathBuf], profdata: &Path) -> CoverageResult<String> {
        let (first, rest) = objects.split_first().ok_or_else(|| {
            CoverageError::Toolchain("no objects to export coverage for".to_string())
        })?;

        let mut cmd = Command::new(&self.cov);
        cmd.arg("export")
            .arg("-format=lcov")
            .arg(format!("-instr-profile={}", profdata.display()))
            .arg(first);
        for object in rest {
            cmd.arg("-object").arg(object);
        }

        let result = cmd
            .output()
            .map_err(|err| CoverageError::io(&self.cov, err))?;
        if !result.status.success() {
            return Err(CoverageError::tool("llvm-cov export", &result.stderr));
        }
        Ok(String::from_utf8_lossy(&result.stdout).into_owned())
    }
}

fn pair_in(dir: &Path) -> Option<(PathBuf, PathBuf)> {
    let profdata = dir.join("llvm-profdata");
    let cov = dir.join("llvm-cov");
    (profdata.exists() && cov.exists()).then_some((profdata, cov))
}

fn detect_from_environment() -> Option<LlvmToolchain> {
    let profdata = env::var_os("LLVM_PROFDATA")?;
    let cov = env::var_os("LLVM_COV")?;
    Some(LlvmToolchain {
        profdata: PathBuf::from(profdata),
        cov: PathBuf::from(cov),
        source: ToolchainSource::Environment,
    })
}

fn detect_system_toolchain() -> Option<LlvmToolchain> {
    let profdata = which::which("llvm-profdata").ok()?;
    let cov = which::which("llvm-cov").ok()?;
    Some(LlvmToolchain {
        profdata,
        cov,
        source: ToolchainSource::System,
    })
}

fn detect_homebrew_toolchain() -> Option<LlvmToolchain> {
    let homebrew_paths = [
        "/opt/homebrew/opt/llvm/bin", // ARM64 Macs
        "/usr/local/opt/llvm/bin",    // Intel Macs
    ];
    homebrew_paths.iter().find_map(|base| {
        pair_in(Path::new(base)).map(|(profdata, cov)| LlvmToolchain {
            profdata,
            cov,
            source: ToolchainSource::Homebrew,
        })
    })
}

fn detect_rustup_toolchain() -> Option<LlvmToolchain> {
    let rustup_home = env::var_os("RUSTUP_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".rustup")))?;

    let output = Command::new("rustup")
        .args(["show", "active-toolchain"])
        .output()
        .ok()?;
    let active = String::from_utf8_lossy(&output.stdout);
    let toolchain_name = active.split_whitespace().next()?.to_string();

    let toolchain_dir = rustup_home.join("toolchains").join(&toolchain_name);
    let pattern = format!("{}/lib/rustlib/*/bin", toolchain_dir.display());
    glob::glob(&pattern).ok()?.flatten().find_map(|dir| {
        pair_in(&dir).map(|(profdata, cov)| LlvmToolchain {
            profdata,
            cov,
            source: ToolchainSource::Rustup,
        })
    })
}

fn find_profraw_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "profraw"))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Collects coverage from every instrumented process started while active.
#[derive(Debug, Default)]
pub struct LlvmCollector {
    profile_dir: Option<PathBuf>,
    previous_profile_file: Option<OsString>,
}

impl LlvmCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn restore_profile_env(&mut self) {
        match self.previous_profile_file.take() {
            Some(previous) => env::set_var(PROFILE_FILE_ENV, previous),
            None => env::remove_var(PROFILE_FILE_ENV),
        }
    }
}

impl Collector for LlvmCollector {
    fn begin(&mut self, data_dir: &Path) -> CoverageResult<()> {
        let profile_dir = data_dir.join(PROFRAW_DIR);
        if profile_dir.exists() {
            fs::remove_dir_all(&profile_dir).map_err(|err| CoverageError::io(&profile_dir, err))?;
        }
        fs::create_dir_all(&profile_dir).map_err(|err| CoverageError::io(&profile_dir, err))?;

        self.previous_profile_file = env::var_os(PROFILE_FILE_ENV);
        let template = profile_dir.join(PROFRAW_TEMPLATE);
        env::set_var(PROFILE_FILE_ENV, &template);
        debug!(profile_file = %template.display(), "Exported LLVM_PROFILE_FILE");

        self.profile_dir = Some(profile_dir);
        Ok(())
    }

    fn end(&mut self, objects: &[PathBuf]) -> CoverageResult<Vec<LineHits>> {
        let profile_dir = self.profile_dir.take().ok_or(CoverageError::InvalidState {
            expected: "started",
            actual: "not started",
        })?;
        self.restore_profile_env();

        let profraw_files = find_profraw_files(&profile_dir);
        if profraw_files.is_empty() {
            warn!(
                dir = %profile_dir.display(),
                "No raw profiles written; were the tests built with coverage instrumentation?"
            );
            return Ok(Vec::new());
        }
        if objects.is_empty() {
            warn!("Raw profiles found but no objects to map them onto");
            return Ok(Vec::new());
        }
        info!(profiles = profraw_files.len(), objects = objects.len(), "Merging raw profiles");

        let toolchain = LlvmToolchain::detect()?;
        let profdata = profile_dir.join(MERGED_PROFDATA);
        toolchain.merge_profdata(&profraw_files, &profdata)?;
        let lcov = toolchain.export_lcov(objects, &profdata)?;
        parse_lcov(&lcov)
    }
}
