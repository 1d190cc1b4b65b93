//! Measured line data and its on-disk form.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Component, Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, CoverageResult};

const DATA_FORMAT_VERSION: u32 = 1;

/// Raw per-line execution counts for one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineHits {
    pub path: PathBuf,
    pub hits: BTreeMap<u32, u64>,
}

/// Parse the `SF`/`DA` records of an LCOV trace. Records for the same file
/// (one per exported object) are merged by summing their counts.
pub fn parse_lcov(content: &str) -> CoverageResult<Vec<LineHits>> {
    let mut files: BTreeMap<PathBuf, BTreeMap<u32, u64>> = BTreeMap::new();
    let mut current: Option<PathBuf> = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(path) = line.strip_prefix("SF:") {
            let path = PathBuf::from(path);
            files.entry(path.clone()).or_default();
            current = Some(path);
        } else if let Some(rest) = line.strip_prefix("DA:") {
            let path = current
                .as_ref()
                .ok_or_else(|| CoverageError::data(format!("DA record outside a file: {line}")))?;
            // DA:<line>,<hits>[,<checksum>]
            let mut parts = rest.split(',');
            let (Some(number), Some(hits)) = (parts.next(), parts.next()) else {
                return Err(CoverageError::data(format!("malformed DA record: {line}")));
            };
            let number: u32 = number
                .trim()
                .parse()
                .map_err(|_| CoverageError::data(format!("bad line number: {line}")))?;
            let hits = parse_hits(hits.trim())
                .ok_or_else(|| CoverageError::data(format!("bad hit count: {line}")))?;
            if let Some(lines) = files.get_mut(path) {
                *lines.entry(number).or_insert(0) += hits;
            }
        } else if line == "end_of_record" {
            current = None;
        }
    }

    Ok(files
        .into_iter()
        .map(|(path, hits)| LineHits { path, hits })
        .collect())
}

/// Hit counts are integers, but merged traces occasionally carry them in
/// scientific notation.
fn parse_hits(raw: &str) -> Option<u64> {
    if let Ok(value) = raw.parse::<u64>() {
        return Some(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(value.trunc() as u64),
        _ => None,
    }
}

/// Selects the files that belong to the measured source targets.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    targets: Vec<PathBuf>,
}

impl SourceFilter {
    pub fn new<S: AsRef<str>>(targets: &[S]) -> Self {
        Self {
            targets: targets
                .iter()
                .map(|t| PathBuf::from(t.as_ref()))
                .collect(),
        }
    }

    /// An absolute target matches by prefix. A relative target matches
    /// wherever its components appear contiguously in the path's directories.
    pub fn matches(&self, path: &Path) -> bool {
        self.targets.iter().any(|target| {
            if target.is_absolute() {
                return path.starts_with(target);
            }
            let wanted: Vec<Component<'_>> = target.components().collect();
            let parts: Vec<Component<'_>> = path.components().collect();
            if wanted.is_empty() || parts.len() <= wanted.len() {
                return false;
            }
            // The final component is the file itself, never the module.
            parts[..parts.len() - 1]
                .windows(wanted.len())
                .any(|window| window == wanted.as_slice())
        })
    }
}

/// Line accounting for one measured file after exclusions are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCoverage {
    pub path: PathBuf,
    /// Executable lines that count toward coverage.
    pub statements: BTreeSet<u32>,
    /// Subset of `statements` that ran at least once.
    pub executed: BTreeSet<u32>,
    /// Executable lines removed by an exclusion rule.
    pub excluded: BTreeSet<u32>,
}

impl FileCoverage {
    /// Lines at or after `exclusion_start` are dropped from accounting even
    /// when they executed.
    pub fn from_hits(hits: &LineHits, exclusion_start: Option<u32>) -> Self {
        let mut coverage = FileCoverage {
            path: hits.path.clone(),
            statements: BTreeSet::new(),
            executed: BTreeSet::new(),
            excluded: BTreeSet::new(),
        };
        for (&line, &count) in &hits.hits {
            if exclusion_start.map_or(false, |start| line >= start) {
                coverage.excluded.insert(line);
                continue;
            }
            coverage.statements.insert(line);
            if count > 0 {
                coverage.executed.insert(line);
            }
        }
        coverage
    }

    pub fn missing(&self) -> BTreeSet<u32> {
        self.statements
            .difference(&self.executed)
            .copied()
            .collect()
    }

    pub fn totals(&self) -> Totals {
        Totals {
            statements: self.statements.len(),
            executed: self.executed.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub statements: usize,
    pub executed: usize,
}

impl Totals {
    pub fn missing(&self) -> usize {
        self.statements - self.executed
    }

    /// 100.0 for a file with no statements, as nothing is left uncovered.
    pub fn percent(&self) -> f64 {
        if self.statements == 0 {
            100.0
        } else {
            self.executed as f64 * 100.0 / self.statements as f64
        }
    }
}

impl std::ops::Add for Totals {
    type Output = Totals;

    fn add(self, rhs: Totals) -> Totals {
        Totals {
            statements: self.statements + rhs.statements,
            executed: self.executed + rhs.executed,
        }
    }
}

/// Everything a session measured, as persisted to the data file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageData {
    pub version: u32,
    pub source: Vec<String>,
    pub files: Vec<FileCoverage>,
}

impl CoverageData {
    pub fn new(source: Vec<String>, mut files: Vec<FileCoverage>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            version: DATA_FORMAT_VERSION,
            source,
            files,
        }
    }

    pub fn totals(&self) -> Totals {
        self.files
            .iter()
            .map(FileCoverage::totals)
            .fold(Totals::default(), |acc, t| acc + t)
    }

    pub fn save(&self, path: &Path) -> CoverageResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|err| CoverageError::io(path, err))
    }

    pub fn load(path: &Path) -> CoverageResult<Self> {
        let content = fs::read_to_string(path).map_err(|err| CoverageError::io(path, err))?;
        let data: CoverageData = serde_json::from_str(&content)?;
        if data.version != DATA_FORMAT_VERSION {
            return Err(CoverageError::data(format!(
                "unsupported data file version {}",
                data.version
            )));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use tempfile::tempdir;

    const TRACE: &str = "\
SF:/src/libcellml/model.cpp
DA:1,4
DA:2,0
DA:3,1.5e1
end_of_record
SF:/src/other/util.cpp
DA:1,1
end_of_record
SF:/src/libcellml/model.cpp
DA:2,2
DA:5,0
end_of_record
";

    fn hits(path: &str, lines: &[(u32, u64)]) -> LineHits {
        LineHits {
            path: PathBuf::from(path),
            hits: lines.iter().copied().collect(),
        }
    }

    #[test]
    fn parse_lcov__duplicate_records__then_counts_summed() {
        let files = parse_lcov(TRACE).unwrap();

        assert_eq!(files.len(), 2);
        let model = &files[0];
        assert_eq!(model.path, PathBuf::from("/src/libcellml/model.cpp"));
        assert_eq!(
            model.hits,
            BTreeMap::from([(1, 4), (2, 2), (3, 15), (5, 0)])
        );
    }

    #[test]
    fn parse_lcov__da_without_file__then_data_error() {
        let err = parse_lcov("DA:1,1\n").unwrap_err();
        assert!(matches!(err, CoverageError::Data(_)));
    }

    #[test]
    fn parse_lcov__bad_count__then_data_error() {
        let err = parse_lcov("SF:/a.c\nDA:1,lots\nend_of_record\n").unwrap_err();
        assert!(err.to_string().contains("bad hit count"));
    }

    #[test]
    fn source_filter__relative_module__then_matches_directory_component() {
        let filter = SourceFilter::new(&["libcellml"]);

        assert!(filter.matches(Path::new("/src/libcellml/model.cpp")));
        assert!(filter.matches(Path::new("libcellml/api/model.h")));
        assert!(!filter.matches(Path::new("/src/other/util.cpp")));
        assert!(!filter.matches(Path::new("/src/libcellml")));
        assert!(!filter.matches(Path::new("/src/libcellml_extra/a.cpp")));
    }

    #[test]
    fn source_filter__nested_and_absolute_targets__then_match() {
        let nested = SourceFilter::new(&["bindings/python"]);
        assert!(nested.matches(Path::new("/b/bindings/python/libcellml/__init__.py")));
        assert!(!nested.matches(Path::new("/b/python/bindings/x.py")));

        let absolute = SourceFilter::new(&["/opt/src"]);
        assert!(absolute.matches(Path::new("/opt/src/a.c")));
        assert!(!absolute.matches(Path::new("/opt/other/a.c")));
    }

    #[test]
    fn file_coverage__exclusion_start__then_lines_from_start_never_covered() {
        let raw = hits("/src/libcellml/wrap.py", &[(3, 1), (9, 0), (10, 7), (12, 1)]);

        let coverage = FileCoverage::from_hits(&raw, Some(10));

        assert_eq!(coverage.statements, BTreeSet::from([3, 9]));
        assert_eq!(coverage.executed, BTreeSet::from([3]));
        assert_eq!(coverage.excluded, BTreeSet::from([10, 12]));
        assert_eq!(coverage.missing(), BTreeSet::from([9]));
        assert_eq!(coverage.totals().percent(), 50.0);
    }

    #[test]
    fn file_coverage__no_exclusion__then_all_lines_counted() {
        let raw = hits("/a.c", &[(1, 1), (2, 0)]);
        let coverage = FileCoverage::from_hits(&raw, None);
        assert_eq!(coverage.statements.len(), 2);
        assert!(coverage.excluded.is_empty());
    }

    #[test]
    fn totals__no_statements__then_fully_covered() {
        assert_eq!(Totals::default().percent(), 100.0);
        let totals = Totals {
            statements: 4,
            executed: 1,
        };
        assert_eq!(totals.missing(), 3);
        assert_eq!(totals.percent(), 25.0);
    }

    #[test]
    fn coverage_data__save_then_load__then_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".coverage");
        let data = CoverageData::new(
            vec!["libcellml".into()],
            vec![
                FileCoverage::from_hits(&hits("/z.c", &[(1, 1)]), None),
                FileCoverage::from_hits(&hits("/a.c", &[(1, 0), (4, 2)]), Some(4)),
            ],
        );

        data.save(&path).unwrap();
        let loaded = CoverageData::load(&path).unwrap();

        assert_eq!(loaded, data);
        assert_eq!(loaded.files[0].path, PathBuf::from("/a.c"));
    }

    #[test]
    fn coverage_data__unknown_version__then_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".coverage");
        fs::write(&path, r#"{"version":99,"source":[],"files":[]}"#).unwrap();

        let err = CoverageData::load(&path).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }
}
