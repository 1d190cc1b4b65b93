//! Declarative coverage configuration.
//!
//! Options arrive as `section:name` keys. Only the keys enumerated by
//! [`CoverageOption`] are recognized; anything else is rejected when it is
//! set rather than silently ignored.

use std::{fmt, path::PathBuf, str::FromStr};

use super::exclusion::{ExcludeUntilMarker, ExclusionRule};
use crate::error::{CoverageError, CoverageResult};

/// Name under which the exclude-until plugin is registered.
pub const EXCLUDE_UNTIL_PLUGIN: &str = "exclude_until_coverage_plugin";

/// Data file written by [`super::CoverageSession::save`], relative to the cwd.
pub const DEFAULT_DATA_FILE: &str = ".coverage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    ExcludeUntil,
}

impl PluginKind {
    pub fn name(self) -> &'static str {
        match self {
            PluginKind::ExcludeUntil => EXCLUDE_UNTIL_PLUGIN,
        }
    }
}

impl FromStr for PluginKind {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            EXCLUDE_UNTIL_PLUGIN => Ok(PluginKind::ExcludeUntil),
            other => Err(CoverageError::UnknownPlugin(other.to_string())),
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Text(String),
    List(Vec<String>),
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(value: Vec<&str>) -> Self {
        OptionValue::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        OptionValue::List(value)
    }
}

/// Every option key the session understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageOption {
    /// `run:plugins`
    Plugins(Vec<PluginKind>),
    /// `run:data_file`
    DataFile(PathBuf),
    /// `<plugin>:marker`
    Marker { plugin: PluginKind, marker: String },
}

impl CoverageOption {
    pub fn parse(key: &str, value: OptionValue) -> CoverageResult<Self> {
        let (section, name) = key
            .split_once(':')
            .ok_or_else(|| CoverageError::UnknownOption(key.to_string()))?;

        match (section, name) {
            ("run", "plugins") => {
                let names = expect_list(key, value)?;
                let plugins = names
                    .iter()
                    .map(|name| name.parse())
                    .collect::<CoverageResult<Vec<PluginKind>>>()?;
                Ok(CoverageOption::Plugins(plugins))
            }
            ("run", "data_file") => {
                let path = expect_text(key, value)?;
                if path.is_empty() {
                    return Err(CoverageError::invalid_value(key, "must not be empty"));
                }
                Ok(CoverageOption::DataFile(PathBuf::from(path)))
            }
            (plugin, "marker") => {
                let plugin = plugin
                    .parse::<PluginKind>()
                    .map_err(|_| CoverageError::UnknownOption(key.to_string()))?;
                let marker = expect_text(key, value)?;
                if marker.is_empty() {
                    return Err(CoverageError::invalid_value(key, "marker must not be empty"));
                }
                Ok(CoverageOption::Marker { plugin, marker })
            }
            _ => Err(CoverageError::UnknownOption(key.to_string())),
        }
    }
}

fn expect_list(key: &str, value: OptionValue) -> CoverageResult<Vec<String>> {
    match value {
        OptionValue::List(items) => Ok(items),
        OptionValue::Text(_) => Err(CoverageError::invalid_value(key, "expected a list")),
    }
}

fn expect_text(key: &str, value: OptionValue) -> CoverageResult<String> {
    match value {
        OptionValue::Text(text) => Ok(text),
        OptionValue::List(_) => Err(CoverageError::invalid_value(key, "expected a string")),
    }
}

/// Resolved configuration of a coverage session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageConfig {
    /// Modules (path components or path prefixes) whose files are measured.
    pub source: Vec<String>,
    pub plugins: Vec<PluginKind>,
    pub exclude_until_marker: Option<String>,
    pub data_file: PathBuf,
}

impl CoverageConfig {
    pub fn new<I, S>(source: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: source.into_iter().map(Into::into).collect(),
            plugins: Vec::new(),
            exclude_until_marker: None,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
        }
    }

    pub fn set_option(&mut self, key: &str, value: impl Into<OptionValue>) -> CoverageResult<()> {
        match CoverageOption::parse(key, value.into())? {
            CoverageOption::Plugins(plugins) => self.plugins = plugins,
            CoverageOption::DataFile(path) => self.data_file = path,
            CoverageOption::Marker {
                plugin: PluginKind::ExcludeUntil,
                marker,
            } => self.exclude_until_marker = Some(marker),
        }
        Ok(())
    }

    /// Instantiate the enabled plugins. An enabled plugin missing its
    /// required option is an error.
    pub fn exclusion_rules(&self) -> CoverageResult<Vec<Box<dyn ExclusionRule>>> {
        let mut rules: Vec<Box<dyn ExclusionRule>> = Vec::new();
        for plugin in &self.plugins {
            match plugin {
                PluginKind::ExcludeUntil => {
                    let marker = self.exclude_until_marker.clone().ok_or_else(|| {
                        CoverageError::invalid_value(
                            format!("{EXCLUDE_UNTIL_PLUGIN}:marker"),
                            "required when the plugin is enabled",
                        )
                    })?;
                    rules.push(Box::new(ExcludeUntilMarker::new(marker)));
                }
            }
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    const MARKER: &str = "# libCellML generated wrapper code starts here.";

    #[test]
    fn coverage_config__plugins_and_marker__then_rule_built() {
        let mut config = CoverageConfig::new(["libcellml"]);
        config
            .set_option("run:plugins", vec![EXCLUDE_UNTIL_PLUGIN])
            .unwrap();
        config
            .set_option("exclude_until_coverage_plugin:marker", MARKER)
            .unwrap();

        assert_eq!(config.plugins, [PluginKind::ExcludeUntil]);
        assert_eq!(config.exclude_until_marker.as_deref(), Some(MARKER));
        let rules = config.exclusion_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name(), EXCLUDE_UNTIL_PLUGIN);
    }

    #[test]
    fn coverage_config__unknown_key__then_rejected() {
        let mut config = CoverageConfig::new(["libcellml"]);
        let err = config.set_option("run:branch", "true").unwrap_err();
        assert!(matches!(err, CoverageError::UnknownOption(ref key) if key == "run:branch"));

        let err = config.set_option("plugins", vec!["x"]).unwrap_err();
        assert!(matches!(err, CoverageError::UnknownOption(_)));
    }

    #[test]
    fn coverage_config__unknown_plugin__then_rejected() {
        let mut config = CoverageConfig::new(["libcellml"]);
        let err = config
            .set_option("run:plugins", vec!["branch_coverage_plugin"])
            .unwrap_err();
        assert!(matches!(err, CoverageError::UnknownPlugin(_)));

        let err = config
            .set_option("branch_coverage_plugin:marker", MARKER)
            .unwrap_err();
        assert!(matches!(err, CoverageError::UnknownOption(_)));
    }

    #[test]
    fn coverage_config__wrong_value_shape__then_invalid_value() {
        let mut config = CoverageConfig::new(["libcellml"]);
        let err = config
            .set_option("run:plugins", EXCLUDE_UNTIL_PLUGIN)
            .unwrap_err();
        assert!(matches!(err, CoverageError::InvalidValue { .. }));

        let err = config
            .set_option("exclude_until_coverage_plugin:marker", vec![MARKER])
            .unwrap_err();
        assert!(matches!(err, CoverageError::InvalidValue { .. }));
    }

    #[test]
    fn coverage_config__enabled_plugin_without_marker__then_rules_fail() {
        let mut config = CoverageConfig::new(["libcellml"]);
        config
            .set_option("run:plugins", vec![EXCLUDE_UNTIL_PLUGIN])
            .unwrap();

        let err = config.exclusion_rules().unwrap_err();
        assert!(err.to_string().contains("exclude_until_coverage_plugin:marker"));
    }

    #[test]
    fn coverage_config__marker_without_plugin__then_no_rules() {
        let mut config = CoverageConfig::new(["libcellml"]);
        config
            .set_option("exclude_until_coverage_plugin:marker", MARKER)
            .unwrap();
        assert!(config.exclusion_rules().unwrap().is_empty());
    }

    #[test]
    fn coverage_config__data_file__then_overrides_default() {
        let mut config = CoverageConfig::new(["libcellml"]);
        assert_eq!(config.data_file, PathBuf::from(DEFAULT_DATA_FILE));
        config.set_option("run:data_file", "coverage.json").unwrap();
        assert_eq!(config.data_file, PathBuf::from("coverage.json"));
    }
}
