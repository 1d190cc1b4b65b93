use std::{fs, path::Path};

use glob::Pattern;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::{TestCase, TestSuite};
use crate::{
    coverage::{HTML_REPORT_DIR, PROFRAW_DIR},
    error::{DiscoveryError, DiscoveryResult},
};

/// Default naming convention for test executables.
pub const DEFAULT_PATTERN: &str = "test_*";

/// Build-system and tool output directories never hold runnable tests.
const SKIPPED_DIRS: &[&str] = &[
    "target",
    ".git",
    "CMakeFiles",
    PROFRAW_DIR,
    HTML_REPORT_DIR,
];

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| SKIPPED_DIRS.contains(&name))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}

/// Collect every regular file under `root` whose name matches `pattern`.
///
/// Under the default convention a non-executable match with an extension
/// (`test_model.cpp`, `test_model.cpp.o`) is a source or build artefact and
/// is skipped. Any other non-executable match is a test that cannot be run
/// and fails discovery outright, as does any directory the walk cannot read.
pub fn discover(root: &Path, pattern: &str) -> DiscoveryResult<TestSuite> {
    if !root.is_dir() {
        return Err(DiscoveryError::RootNotFound(root.to_path_buf()));
    }
    let matcher = Pattern::new(pattern).map_err(|err| DiscoveryError::pattern(pattern, err))?;
    let explicit_pattern = pattern != DEFAULT_PATTERN;

    let mut cases = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
    {
        let entry = entry.map_err(|err| DiscoveryError::Walk {
            path: err.path().unwrap_or(root).to_path_buf(),
            details: err.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .map_or(false, |name| matcher.matches(name));
        if !matches {
            continue;
        }

        let path = entry.path();
        let metadata = entry.metadata().map_err(|err| DiscoveryError::Walk {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
        if !is_executable(&metadata) {
            if explicit_pattern || path.extension().is_none() {
                return Err(DiscoveryError::NotExecutable(path.to_path_buf()));
            }
            debug!(file = %path.display(), "Skipping non-executable artefact");
            continue;
        }

        let name = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        debug!(test = %name, "Discovered test");
        cases.push(TestCase {
            name,
            path: path.to_path_buf(),
        });
    }

    Ok(TestSuite::new(cases))
}

#[cfg(all(test, unix))]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_script(path: &Path, mode: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    fn names(suite: &TestSuite) -> Vec<&str> {
        suite.cases().iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn discover__nested_executables__then_sorted_relative_names() {
        let root = tempdir().unwrap();
        write_script(&root.path().join("test_units"), 0o755);
        write_script(&root.path().join("bindings/test_model"), 0o755);
        write_script(&root.path().join("bindings/test_component"), 0o755);
        write_script(&root.path().join("helper"), 0o755);

        let suite = discover(root.path(), DEFAULT_PATTERN).unwrap();

        assert_eq!(
            names(&suite),
            ["bindings/test_component", "bindings/test_model", "test_units"]
        );
    }

    #[test]
    fn discover__skipped_directories__then_ignored() {
        let root = tempdir().unwrap();
        write_script(&root.path().join("target/debug/test_stale"), 0o755);
        write_script(&root.path().join(HTML_REPORT_DIR).join("test_x"), 0o644);
        write_script(&root.path().join("test_live"), 0o755);

        let suite = discover(root.path(), DEFAULT_PATTERN).unwrap();

        assert_eq!(names(&suite), ["test_live"]);
    }

    #[test]
    fn discover__matching_file_not_executable__then_error() {
        let root = tempdir().unwrap();
        write_script(&root.path().join("test_broken"), 0o644);

        let err = discover(root.path(), DEFAULT_PATTERN).unwrap_err();

        match err {
            DiscoveryError::NotExecutable(path) => assert!(path.ends_with("test_broken")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn discover__missing_root__then_root_not_found() {
        let err = discover(&PathBuf::from("/nonexistent/tests"), DEFAULT_PATTERN).unwrap_err();
        assert!(matches!(err, DiscoveryError::RootNotFound(_)));
    }

    #[test]
    fn discover__invalid_pattern__then_pattern_error() {
        let root = tempdir().unwrap();
        let err = discover(root.path(), "test_[").unwrap_err();
        assert!(matches!(err, DiscoveryError::Pattern { .. }));
    }

    #[test]
    fn discover__empty_tree__then_empty_suite() {
        let root = tempdir().unwrap();
        assert!(discover(root.path(), DEFAULT_PATTERN).unwrap().is_empty());
    }

    #[test]
    fn discover__cmake_build_tree__then_only_test_executables() {
        let root = tempdir().unwrap();
        write_script(&root.path().join("test_model"), 0o755);
        write_script(
            &root.path().join("CMakeFiles/test_model.dir/test_model.cpp.o"),
            0o644,
        );
        write_script(&root.path().join("CMakeFiles/test_model.dir/link.txt"), 0o644);

        let suite = discover(root.path(), DEFAULT_PATTERN).unwrap();

        assert_eq!(names(&suite), ["test_model"]);
    }

    #[test]
    fn discover__non_executable_file_with_extension__then_skipped() {
        let root = tempdir().unwrap();
        write_script(&root.path().join("src/test_parser.cpp"), 0o644);
        write_script(&root.path().join("bin/test_parser"), 0o755);

        let suite = discover(root.path(), DEFAULT_PATTERN).unwrap();

        assert_eq!(names(&suite), ["bin/test_parser"]);
    }

    #[test]
    fn discover__explicit_pattern_matches_non_executable__then_error() {
        let root = tempdir().unwrap();
        write_script(&root.path().join("check_model.sh"), 0o644);

        let err = discover(root.path(), "check_*.sh").unwrap_err();

        assert!(matches!(err, DiscoveryError::NotExecutable(path) if path.ends_with("check_model.sh")));
    }
}
