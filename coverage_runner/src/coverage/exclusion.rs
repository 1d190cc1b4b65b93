use std::fmt;

use super::config::EXCLUDE_UNTIL_PLUGIN;

/// A rule that removes a trailing region of a source file from accounting.
pub trait ExclusionRule: fmt::Debug {
    fn name(&self) -> &str;

    /// 1-based line where exclusion begins, if the rule applies to `source`.
    /// That line and every line after it are excluded.
    fn exclusion_start(&self, source: &str) -> Option<u32>;
}

/// Excludes everything from the first line containing a marker comment,
/// e.g. the boundary in front of generated binding wrappers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeUntilMarker {
    marker: String,
}

impl ExcludeUntilMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl ExclusionRule for ExcludeUntilMarker {
    fn name(&self) -> &str {
        EXCLUDE_UNTIL_PLUGIN
    }

    fn exclusion_start(&self, source: &str) -> Option<u32> {
        source
            .lines()
            .position(|line| line.contains(&self.marker))
            .map(|index| index as u32 + 1)
    }
}
