//! trellis - hierarchical test execution engine demo
//!
//! Runs a built-in sample assembly through the engine and prints the
//! lifecycle messages it reports.
//!
//! ## Usage
//!
//! ```bash
//! # Run the sample assembly with default options
//! trellis run
//!
//! # Aggressive scheduling on two threads, JSON message stream
//! trellis run --max-threads 2 --algorithm aggressive --format json
//!
//! # Include explicit tests
//! trellis run --explicit on
//!
//! # Show the options a run would use
//! trellis options --config trellis.yaml
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod cli;
mod sample;

use cli::{Args, OptionOverrides, OptionsArgs, RunArgs};
use trellis::config::env::{print_env_help, EnvOverrides};
use trellis::config::{ExplicitMode, ParallelAlgorithm, RunOptions};
use trellis::executor::AssemblyRunner;
use trellis::messages::MessageSink;
use trellis::output::{ConsoleReporter, MessageFormatter, OutputFormat};
use trellis::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(LogLevel::from_verbose(args.verbose));

    match args.command {
        cli::Command::Run(run_args) => {
            let summary = run_sample(run_args, args.verbose).await?;
            if summary.failed > 0 {
                std::process::exit(1);
            }
        }
        cli::Command::Options(options_args) => {
            show_options(options_args)?;
        }
    }

    Ok(())
}

/// Resolve options: file (or defaults), then environment, then flags
fn resolve_options(overrides: &OptionOverrides) -> Result<RunOptions> {
    let mut options = match &overrides.config {
        Some(path) => RunOptions::load(path)?,
        None => RunOptions::default(),
    };

    let env = EnvOverrides::load();
    if env.has_any() {
        info!("Applying TRELLIS_* environment overrides");
        options = env.apply(options);
    }

    if overrides.sync {
        options = options.with_sync_reporting(true);
    }
    if overrides.no_parallel {
        options = options.with_parallelization(false);
    }
    if let Some(max) = overrides.max_threads {
        options = options.with_max_threads(max);
    }
    if let Some(algorithm) = &overrides.algorithm {
        let algorithm: ParallelAlgorithm = algorithm.parse().map_err(|e: String| anyhow!(e))?;
        options = options.with_algorithm(algorithm);
    }
    if let Some(explicit) = &overrides.explicit {
        let mode: ExplicitMode = explicit.parse().map_err(|e: String| anyhow!(e))?;
        options = options.with_explicit_mode(mode);
    }

    Ok(options)
}

async fn run_sample(args: RunArgs, verbose: bool) -> Result<trellis::models::RunSummary> {
    let options = resolve_options(&args.overrides)?;
    let format = OutputFormat::from_str(&args.format)
        .ok_or_else(|| anyhow!("Invalid format: {}. Use: text, json", args.format))?;

    let mut formatter = MessageFormatter::new(format);
    if args.no_color {
        formatter = formatter.no_color();
    }
    if verbose {
        formatter = formatter.verbose();
    }
    let reporter = Arc::new(ConsoleReporter::new(formatter));

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            ctrl_c.cancel();
        }
    });

    let (assembly, cases) = sample::build();
    let runner = AssemblyRunner::new(options).with_cancellation(&token);
    let sinks: Vec<Arc<dyn MessageSink>> = vec![reporter.clone()];
    let summary = runner.run(assembly, cases, sinks).await;

    println!("{}", reporter.formatter().format_summary(&summary));
    Ok(summary)
}

fn show_options(args: OptionsArgs) -> Result<()> {
    if args.env_help {
        print_env_help();
        return Ok(());
    }

    let options = resolve_options(&args.overrides)?;
    let rendered = match args.format.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::to_string(&options).context("Failed to render options as YAML")?,
        "json" => serde_json::to_string_pretty(&options).context("Failed to render options as JSON")?,
        other => return Err(anyhow!("Invalid format: {}. Use: yaml, json", other)),
    };

    println!("{}", rendered.trim_end());
    println!("# test environment: {}", options.test_environment());
    Ok(())
}
