//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

/// Hierarchical test execution engine demo
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version = "0.1.0")]
#[command(about = "Run a sample test assembly through the trellis engine")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the built-in sample assembly
    Run(RunArgs),

    /// Print the effective run options
    Options(OptionsArgs),
}

/// Options shared by `run` and `options`
#[derive(Parser, Debug, Default)]
pub struct OptionOverrides {
    /// Options file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Report messages synchronously
    #[arg(long)]
    pub sync: bool,

    /// Run collections one at a time
    #[arg(long)]
    pub no_parallel: bool,

    /// Maximum parallel threads (0 = CPU count, negative = unlimited)
    #[arg(short, long, allow_hyphen_values = true)]
    pub max_threads: Option<i32>,

    /// Parallel algorithm (conservative, aggressive)
    #[arg(short, long)]
    pub algorithm: Option<String>,

    /// Explicit test mode (off, on, only)
    #[arg(short, long)]
    pub explicit: Option<String>,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: OptionOverrides,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Arguments for options command
#[derive(Parser, Debug)]
pub struct OptionsArgs {
    #[command(flatten)]
    pub overrides: OptionOverrides,

    /// Output format (yaml, json)
    #[arg(short, long, default_value = "yaml")]
    pub format: String,

    /// Show supported environment variables
    #[arg(long)]
    pub env_help: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parsing() {
        let args = Args::parse_from([
            "trellis",
            "run",
            "--max-threads",
            "2",
            "--algorithm",
            "aggressive",
            "--format",
            "json",
        ]);
        match args.command {
            Command::Run(run_args) => {
                assert_eq!(run_args.overrides.max_threads, Some(2));
                assert_eq!(run_args.overrides.algorithm.as_deref(), Some("aggressive"));
                assert_eq!(run_args.format, "json");
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_negative_max_threads() {
        let args = Args::parse_from(["trellis", "options", "--max-threads", "-1", "--no-parallel"]);
        match args.command {
            Command::Options(options_args) => {
                assert_eq!(options_args.overrides.max_threads, Some(-1));
                assert!(options_args.overrides.no_parallel);
                assert_eq!(options_args.format, "yaml");
            }
            _ => panic!("Expected Options command"),
        }
    }

    #[test]
    fn test_global_verbose() {
        let args = Args::parse_from(["trellis", "run", "-v"]);
        assert!(args.verbose);
    }
}
