//! Phase configuration.
//!
//! The engine only reads from this: which phases are enabled, which should
//! dump their data around invocation, whether to log per-phase timings, and
//! how many worker threads the per-file fan-out may use. Drivers typically
//! deserialize it from a TOML table next to the rest of their settings.

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::{actions::BeforeOrAfter, phase::PhaseName};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PhaseConfig {
    /// Phases skipped entirely: they return their input unchanged and are
    /// not recorded as done.
    pub disabled: FxHashSet<String>,
    /// Phases whose input is dumped before invocation.
    pub dump_before: FxHashSet<String>,
    /// Phases whose output is dumped after invocation.
    pub dump_after: FxHashSet<String>,
    /// Dump around every phase, regardless of the per-phase selections.
    pub dump_all: bool,
    /// Log per-phase wall time at `info` level.
    pub profile: bool,
    /// Worker threads for per-file lowering; 1 selects sequential mode.
    pub file_lowering_threads: usize,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            disabled: FxHashSet::default(),
            dump_before: FxHashSet::default(),
            dump_after: FxHashSet::default(),
            dump_all: false,
            profile: false,
            file_lowering_threads: 1,
        }
    }
}

impl PhaseConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("failed to parse phase configuration")
    }

    pub fn is_enabled(&self, name: &PhaseName) -> bool {
        !self.disabled.contains(name.as_str())
    }

    pub fn should_dump(&self, when: BeforeOrAfter, name: &PhaseName) -> bool {
        if self.dump_all {
            return true;
        }
        match when {
            BeforeOrAfter::Before => self.dump_before.contains(name.as_str()),
            BeforeOrAfter::After => self.dump_after.contains(name.as_str()),
        }
    }

    /// Worker count for per-file lowering, clamped to at least one.
    pub fn worker_threads(&self) -> usize {
        self.file_lowering_threads.max(1)
    }

    /// Disables a phase by name.
    pub fn disable(&mut self, name: &str) {
        self.disabled.insert(name.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_run_everything_sequentially() {
        let config = PhaseConfig::default();
        assert!(config.is_enabled(&PhaseName::new("inline")));
        assert!(!config.should_dump(BeforeOrAfter::After, &PhaseName::new("inline")));
        assert_eq!(config.worker_threads(), 1);
    }

    #[test]
    fn parses_from_toml() {
        let config = PhaseConfig::from_toml_str(
            r#"
            disabled = ["tail-calls"]
            dump-after = ["inline"]
            profile = true
            file-lowering-threads = 4
            "#,
        )
        .unwrap();

        assert!(!config.is_enabled(&PhaseName::new("tail-calls")));
        assert!(config.should_dump(BeforeOrAfter::After, &PhaseName::new("inline")));
        assert!(!config.should_dump(BeforeOrAfter::Before, &PhaseName::new("inline")));
        assert!(config.profile);
        assert_eq!(config.worker_threads(), 4);
    }

    #[test]
    fn dump_all_overrides_selections() {
        let config = PhaseConfig {
            dump_all: true,
            ..PhaseConfig::default()
        };
        assert!(config.should_dump(BeforeOrAfter::Before, &PhaseName::new("anything")));
    }

    #[test]
    fn zero_threads_clamps_to_sequential() {
        let config = PhaseConfig {
            file_lowering_threads: 0,
            ..PhaseConfig::default()
        };
        assert_eq!(config.worker_threads(), 1);
    }
}
