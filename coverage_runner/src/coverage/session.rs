use std::{
    collections::BTreeMap,
    env, fs,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use super::{
    config::{CoverageConfig, OptionValue},
    data::{CoverageData, FileCoverage, LineHits, SourceFilter},
    exclusion::ExclusionRule,
    html, report,
    llvm::LlvmCollector,
};
use crate::error::{CoverageError, CoverageResult};

/// Instrumentation backend behind a [`CoverageSession`].
pub trait Collector {
    /// Start recording. `data_dir` is where scratch data may be kept.
    fn begin(&mut self, data_dir: &Path) -> CoverageResult<()>;

    /// Stop recording and return per-line counts for every file the
    /// instrumented `objects` map onto.
    fn end(&mut self, objects: &[PathBuf]) -> CoverageResult<Vec<LineHits>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Configured,
    Started,
    Stopped,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Configured => "configured",
            SessionState::Started => "started",
            SessionState::Stopped => "stopped",
        }
    }
}

/// A coverage measurement scoped to the configured source targets.
///
/// Lifecycle: configured → started → stopped, then saved and reported.
/// A stopped session may be started again; counts from every start/stop
/// cycle accumulate.
#[derive(Debug)]
pub struct CoverageSession<C: Collector = LlvmCollector> {
    config: CoverageConfig,
    collector: C,
    state: SessionState,
    objects: Vec<PathBuf>,
    hits: BTreeMap<PathBuf, BTreeMap<u32, u64>>,
    data: Option<CoverageData>,
}

impl CoverageSession<LlvmCollector> {
    pub fn new(config: CoverageConfig) -> Self {
        Self::with_collector(config, LlvmCollector::new())
    }
}

impl<C: Collector> CoverageSession<C> {
    pub fn with_collector(config: CoverageConfig, collector: C) -> Self {
        Self {
            config,
            collector,
            state: SessionState::Configured,
            objects: Vec::new(),
            hits: BTreeMap::new(),
            data: None,
        }
    }

    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn expect_state(&self, expected: SessionState) -> CoverageResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoverageError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    /// Options can only change before measurement begins.
    pub fn set_option(&mut self, key: &str, value: impl Into<OptionValue>) -> CoverageResult<()> {
        self.expect_state(SessionState::Configured)?;
        self.config.set_option(key, value)
    }

    /// Register instrumented binaries whose coverage mapping is needed to
    /// attribute counts to source lines.
    pub fn add_objects<I, P>(&mut self, objects: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for object in objects {
            let object = object.into();
            if !self.objects.contains(&object) {
                self.objects.push(object);
            }
        }
    }

    pub fn start(&mut self) -> CoverageResult<()> {
        if self.state == SessionState::Started {
            return Err(CoverageError::InvalidState {
                expected: "configured or stopped",
                actual: self.state.name(),
            });
        }
        // Surface configuration mistakes before anything runs.
        self.config.exclusion_rules()?;

        let data_dir = env::current_dir().map_err(|err| CoverageError::io(".", err))?;
        self.collector.begin(&data_dir)?;
        self.state = SessionState::Started;
        info!(source = ?self.config.source, "Coverage measurement started");
        Ok(())
    }

    pub fn stop(&mut self) -> CoverageResult<()> {
        self.expect_state(SessionState::Started)?;
        let collected = self.collector.end(&self.objects)?;
        self.state = SessionState::Stopped;

        let filter = SourceFilter::new(self.config.source.as_slice());
        for file in collected {
            if !filter.matches(&file.path) {
                debug!(file = %file.path.display(), "Outside measured source, skipping");
                continue;
            }
            let lines = self.hits.entry(file.path).or_default();
            for (line, count) in file.hits {
                *lines.entry(line).or_insert(0) += count;
            }
        }

        let rules = self.config.exclusion_rules()?;
        let files = self
            .hits
            .iter()
            .map(|(path, hits)| {
                let hits = LineHits {
                    path: path.clone(),
                    hits: hits.clone(),
                };
                FileCoverage::from_hits(&hits, exclusion_start(&rules, path))
            })
            .collect();
        let data = CoverageData::new(self.config.source.clone(), files);

        let totals = data.totals();
        info!(
            files = data.files.len(),
            statements = totals.statements,
            executed = totals.executed,
            "Coverage measurement stopped"
        );
        self.data = Some(data);
        Ok(())
    }

    pub fn data(&self) -> CoverageResult<&CoverageData> {
        self.expect_state(SessionState::Stopped)?;
        self.data.as_ref().ok_or(CoverageError::InvalidState {
            expected: "stopped",
            actual: "configured",
        })
    }

    /// Persist the measurement to the configured data file.
    pub fn save(&self) -> CoverageResult<PathBuf> {
        let data = self.data()?;
        let path = self.config.data_file.clone();
        data.save(&path)?;
        info!(path = %path.display(), "Coverage data saved");
        Ok(path)
    }

    /// Print the per-file summary table. Returns the total percentage.
    pub fn report(&self, out: &mut dyn Write) -> CoverageResult<f64> {
        let data = self.data()?;
        report::write_text_report(data, &display_root(), out)
    }

    /// Render the HTML report into `directory`, replacing prior contents.
    /// Returns the total percentage.
    pub fn html_report(&self, directory: &Path) -> CoverageResult<f64> {
        let data = self.data()?;
        html::write_html_report(data, &display_root(), directory)
    }
}

fn display_root() -> PathBuf {
    env::current_dir().unwrap_or_default()
}

/// Earliest boundary any rule reports for the file. Unreadable sources get
/// no exclusion.
fn exclusion_start(rules: &[Box<dyn ExclusionRule>], path: &Path) -> Option<u32> {
    if rules.is_empty() {
        return None;
    }
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "Cannot read source for exclusion rules");
            return None;
        }
    };
    rules
        .iter()
        .filter_map(|rule| rule.exclusion_start(&source))
        .min()
}
