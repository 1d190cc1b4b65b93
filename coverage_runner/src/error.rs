use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Failure to move into the configuration-specific working directory.
#[derive(Debug, Error)]
pub enum WorkdirError {
    #[error("working directory not found: {0}")]
    NotFound(PathBuf),
    #[error("working directory is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WorkdirError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure to assemble the test suite. Aborts the run before any test executes.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery root not found: {0}")]
    RootNotFound(PathBuf),
    #[error("invalid test pattern '{pattern}': {details}")]
    Pattern { pattern: String, details: String },
    #[error("test file is not executable: {0}")]
    NotExecutable(PathBuf),
    #[error("failed to walk {path:?}: {details}")]
    Walk { path: PathBuf, details: String },
}

impl DiscoveryError {
    pub fn pattern(pattern: impl Into<String>, details: impl fmt::Display) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            details: details.to_string(),
        }
    }
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("unknown coverage option: {0}")]
    UnknownOption(String),
    #[error("unknown coverage plugin: {0}")]
    UnknownPlugin(String),
    #[error("invalid value for {key}: {details}")]
    InvalidValue { key: String, details: String },
    #[error("coverage session is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("coverage toolchain unavailable: {0}")]
    Toolchain(String),
    #[error("{tool} failed: {stderr}")]
    Tool { tool: String, stderr: String },
    #[error("malformed coverage data: {0}")]
    Data(String),
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type CoverageResult<T> = Result<T, CoverageError>;

impl CoverageError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_value(key: impl Into<String>, details: impl fmt::Display) -> Self {
        Self::InvalidValue {
            key: key.into(),
            details: details.to_string(),
        }
    }

    pub fn tool(tool: impl Into<String>, stderr: &[u8]) -> Self {
        Self::Tool {
            tool: tool.into(),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }

    pub fn data(details: impl fmt::Display) -> Self {
        Self::Data(details.to_string())
    }
}

impl From<serde_json::Error> for CoverageError {
    fn from(err: serde_json::Error) -> Self {
        CoverageError::Data(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn coverage_error__io_constructor__then_preserves_path_and_source() {
        let err = CoverageError::io(
            "/tmp/.coverage",
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        );

        let message = err.to_string();
        match &err {
            CoverageError::Io { path, source } => {
                assert!(path.display().to_string().ends_with(".coverage"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(message.contains(".coverage"));
        assert!(message.contains("read-only"));
    }

    #[test]
    fn coverage_error__tool_constructor__then_trims_stderr() {
        let err = CoverageError::tool("llvm-cov export", b"  no profile data\n");
        assert_eq!(err.to_string(), "llvm-cov export failed: no profile data");
    }

    #[test]
    fn coverage_error__from_serde_json_error__then_wraps_as_data() {
        let source = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err = CoverageError::from(source);
        assert!(matches!(err, CoverageError::Data(_)));
        assert!(err.to_string().contains("malformed coverage data"));
    }

    #[test]
    fn coverage_error__invalid_state__then_names_both_states() {
        let err = CoverageError::InvalidState {
            expected: "stopped",
            actual: "started",
        };
        assert_eq!(
            err.to_string(),
            "coverage session is started, expected stopped"
        );
    }

    #[test]
    fn discovery_error__pattern_constructor__then_formats_message() {
        let err = DiscoveryError::pattern("test_[", "invalid range");
        assert!(err.to_string().contains("test_["));
        assert!(err.to_string().contains("invalid range"));
    }

    #[test]
    fn workdir_error__not_found__then_names_path() {
        let err = WorkdirError::NotFound(PathBuf::from("/build/debug"));
        assert!(err.to_string().contains("/build/debug"));
    }
}
