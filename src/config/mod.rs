//! Configuration module
//!
//! Run options for the engine, loaded from YAML/JSON and overridden from the
//! environment.

pub mod env;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How collections share the parallelism budget
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelAlgorithm {
    /// A collection holds a slot for its whole run
    #[default]
    Conservative,
    /// A collection holds a slot only while it is actively executing
    Aggressive,
}

impl FromStr for ParallelAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(ParallelAlgorithm::Conservative),
            "aggressive" => Ok(ParallelAlgorithm::Aggressive),
            other => Err(format!("Unknown parallel algorithm: {other}")),
        }
    }
}

impl fmt::Display for ParallelAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParallelAlgorithm::Conservative => write!(f, "conservative"),
            ParallelAlgorithm::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// Which cases run with respect to their explicit flag
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplicitMode {
    /// Explicit cases are reported as not run
    #[default]
    Off,
    /// Everything runs
    On,
    /// Only explicit cases run
    Only,
}

impl ExplicitMode {
    /// Whether a case with this explicit flag should execute
    pub fn should_run(self, explicit: bool) -> bool {
        match self {
            ExplicitMode::Off => !explicit,
            ExplicitMode::On => true,
            ExplicitMode::Only => explicit,
        }
    }
}

impl FromStr for ExplicitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(ExplicitMode::Off),
            "on" => Ok(ExplicitMode::On),
            "only" => Ok(ExplicitMode::Only),
            other => Err(format!("Unknown explicit mode: {other}")),
        }
    }
}

/// Engine run options
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    /// Deliver messages inline instead of through a background worker
    pub synchronous_message_reporting: bool,

    /// Run every collection sequentially
    pub disable_parallelization: bool,

    /// 0 means the available CPU count; negative means unlimited
    pub max_parallel_threads: i32,

    pub parallel_algorithm: ParallelAlgorithm,

    pub explicit_mode: ExplicitMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            synchronous_message_reporting: false,
            disable_parallelization: false,
            max_parallel_threads: 0,
            parallel_algorithm: ParallelAlgorithm::Conservative,
            explicit_mode: ExplicitMode::Off,
        }
    }
}

impl RunOptions {
    /// Load options from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read options file {}", path.as_ref().display()))?;

        let options: Self = if is_yaml(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML options")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON options")?
        };

        Ok(options)
    }

    /// Save options to a YAML or JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml(path.as_ref()) {
            serde_yaml::to_string(self).context("Failed to serialize options")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize options")?
        };

        std::fs::write(path, content).context("Failed to write options file")?;
        Ok(())
    }

    pub fn with_sync_reporting(mut self, synchronous: bool) -> Self {
        self.synchronous_message_reporting = synchronous;
        self
    }

    pub fn with_parallelization(mut self, enabled: bool) -> Self {
        self.disable_parallelization = !enabled;
        self
    }

    pub fn with_max_threads(mut self, max: i32) -> Self {
        self.max_parallel_threads = max;
        self
    }

    pub fn with_algorithm(mut self, algorithm: ParallelAlgorithm) -> Self {
        self.parallel_algorithm = algorithm;
        self
    }

    pub fn with_explicit_mode(mut self, mode: ExplicitMode) -> Self {
        self.explicit_mode = mode;
        self
    }

    /// Resolved thread budget; `None` means unlimited
    pub fn effective_max_threads(&self) -> Option<usize> {
        match self.max_parallel_threads {
            0 => Some(
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
            ),
            n if n < 0 => None,
            n => Some(n as usize),
        }
    }

    /// Human-readable description reported in the assembly starting message
    pub fn test_environment(&self) -> String {
        if self.disable_parallelization {
            return "non-parallel".to_string();
        }

        match self.effective_max_threads() {
            None => "parallel (unlimited threads)".to_string(),
            Some(threads) => match self.parallel_algorithm {
                ParallelAlgorithm::Conservative => format!("parallel ({threads} threads)"),
                ParallelAlgorithm::Aggressive => format!("parallel ({threads} threads/aggressive)"),
            },
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = RunOptions::default();
        assert!(!options.synchronous_message_reporting);
        assert_eq!(options.parallel_algorithm, ParallelAlgorithm::Conservative);
        assert_eq!(options.explicit_mode, ExplicitMode::Off);
        assert!(options.effective_max_threads().unwrap() >= 1);
    }

    #[test]
    fn test_effective_max_threads() {
        assert_eq!(RunOptions::default().with_max_threads(3).effective_max_threads(), Some(3));
        assert_eq!(RunOptions::default().with_max_threads(-1).effective_max_threads(), None);
    }

    #[test]
    fn test_environment_description() {
        assert_eq!(
            RunOptions::default().with_parallelization(false).test_environment(),
            "non-parallel"
        );
        assert_eq!(
            RunOptions::default().with_max_threads(4).test_environment(),
            "parallel (4 threads)"
        );
        assert_eq!(
            RunOptions::default()
                .with_max_threads(2)
                .with_algorithm(ParallelAlgorithm::Aggressive)
                .test_environment(),
            "parallel (2 threads/aggressive)"
        );
        assert_eq!(
            RunOptions::default().with_max_threads(-1).test_environment(),
            "parallel (unlimited threads)"
        );
    }

    #[test]
    fn test_explicit_mode() {
        assert!(ExplicitMode::Off.should_run(false));
        assert!(!ExplicitMode::Off.should_run(true));
        assert!(ExplicitMode::On.should_run(true));
        assert!(!ExplicitMode::Only.should_run(false));
        assert!(ExplicitMode::Only.should_run(true));
    }

    #[test]
    fn test_camel_case_keys() {
        let json = r#"{"synchronousMessageReporting": true, "maxParallelThreads": -1, "parallelAlgorithm": "aggressive", "explicitMode": "only"}"#;
        let options: RunOptions = serde_json::from_str(json).unwrap();

        assert!(options.synchronous_message_reporting);
        assert!(!options.disable_parallelization);
        assert_eq!(options.max_parallel_threads, -1);
        assert_eq!(options.parallel_algorithm, ParallelAlgorithm::Aggressive);
        assert_eq!(options.explicit_mode, ExplicitMode::Only);
    }

    #[test]
    fn test_save_and_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.yaml");

        let options = RunOptions::default()
            .with_max_threads(8)
            .with_explicit_mode(ExplicitMode::On);
        options.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("maxParallelThreads: 8"));
        assert_eq!(RunOptions::load(&path).unwrap(), options);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(RunOptions::load("/nonexistent/trellis.json").is_err());
    }
}
