//! Environment variable configuration
//!
//! Provides environment variable overrides for run options.

use std::env;

use super::{ExplicitMode, ParallelAlgorithm, RunOptions};

/// Environment variable prefix
const ENV_PREFIX: &str = "TRELLIS";

/// Overrides read from `TRELLIS_*` variables
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// TRELLIS_SYNC
    pub synchronous: Option<bool>,
    /// TRELLIS_DISABLE_PARALLEL
    pub disable_parallel: Option<bool>,
    /// TRELLIS_MAX_THREADS
    pub max_threads: Option<i32>,
    /// TRELLIS_ALGORITHM
    pub algorithm: Option<ParallelAlgorithm>,
    /// TRELLIS_EXPLICIT
    pub explicit: Option<ExplicitMode>,
}

impl EnvOverrides {
    /// Load overrides from environment variables
    pub fn load() -> Self {
        Self {
            synchronous: get_env_bool("SYNC"),
            disable_parallel: get_env_bool("DISABLE_PARALLEL"),
            max_threads: get_env_parse("MAX_THREADS"),
            algorithm: get_env_parse("ALGORITHM"),
            explicit: get_env_parse("EXPLICIT"),
        }
    }

    pub fn has_any(&self) -> bool {
        self.synchronous.is_some()
            || self.disable_parallel.is_some()
            || self.max_threads.is_some()
            || self.algorithm.is_some()
            || self.explicit.is_some()
    }

    /// Apply the overrides that are set on top of `options`
    pub fn apply(&self, mut options: RunOptions) -> RunOptions {
        if let Some(sync) = self.synchronous {
            options.synchronous_message_reporting = sync;
        }
        if let Some(disable) = self.disable_parallel {
            options.disable_parallelization = disable;
        }
        if let Some(max) = self.max_threads {
            options.max_parallel_threads = max;
        }
        if let Some(algorithm) = self.algorithm {
            options.parallel_algorithm = algorithm;
        }
        if let Some(explicit) = self.explicit {
            options.explicit_mode = explicit;
        }
        options
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn synchronous(mut self, sync: bool) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_SYNC"), sync.to_string()));
        self
    }

    pub fn max_threads(mut self, max: i32) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_MAX_THREADS"), max.to_string()));
        self
    }

    pub fn algorithm(mut self, algorithm: &str) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_ALGORITHM"), algorithm.to_string()));
        self
    }

    pub fn explicit(mut self, mode: &str) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_EXPLICIT"), mode.to_string()));
        self
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all TRELLIS environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_SYNC              Synchronous message reporting (true/false)");
    println!("  {ENV_PREFIX}_DISABLE_PARALLEL  Run collections sequentially (true/false)");
    println!("  {ENV_PREFIX}_MAX_THREADS       Parallel budget (0 = CPU count, -1 = unlimited)");
    println!("  {ENV_PREFIX}_ALGORITHM         conservative | aggressive");
    println!("  {ENV_PREFIX}_EXPLICIT          off | on | only");
}
