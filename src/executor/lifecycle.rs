//! Level lifecycle
//!
//! Every level of the hierarchy runs the same protocol: Starting, the
//! level-specific body, Finished, then CleanupFailure if anything was captured
//! along the way. `run_level` drives that protocol for any [`LevelRunner`].

use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::context::RunContext;
use crate::error::{CapturedError, ExceptionAggregator};
use crate::messages::{ErrorMessage, LevelKind, Message, UniqueIds};
use crate::models::RunSummary;

/// The unit a hook is being called for
#[derive(Clone, Copy, Debug)]
pub struct Scope<'a> {
    pub level: LevelKind,
    pub unique_id: &'a str,
    pub display_name: &'a str,
}

/// User code invoked at each lifecycle point, after the matching message is published.
///
/// Returning `Ok(false)` stops the run. Errors are captured by the level and
/// reported like any other failure at that point.
pub trait RunnerHooks: Send + Sync {
    fn on_starting(&self, _scope: &Scope<'_>) -> Result<bool, CapturedError> {
        Ok(true)
    }

    fn on_finished(&self, _scope: &Scope<'_>, _summary: &RunSummary) -> Result<bool, CapturedError> {
        Ok(true)
    }

    fn on_cleanup_failure(&self, _scope: &Scope<'_>, _error: &CapturedError) -> Result<bool, CapturedError> {
        Ok(true)
    }
}

/// Hooks that do nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl RunnerHooks for NoHooks {}

/// One level of the runner hierarchy
pub(crate) trait LevelRunner: Send + Sync {
    fn kind(&self) -> LevelKind;
    fn ids(&self) -> &UniqueIds;
    fn unique_id(&self) -> &str;
    fn display_name(&self) -> &str;

    fn starting_message(&self) -> Message;
    fn finished_message(&self, summary: &RunSummary) -> Message;
    fn cleanup_failure_message(&self, error: &CapturedError) -> Message;

    /// Leave errors captured while starting in the aggregator instead of handing
    /// them to `execute`. The test level uses them as its failure.
    fn keeps_startup_errors(&self) -> bool {
        false
    }

    /// Run the level's children (or the test itself)
    fn execute<'a>(&'a self, ctx: &'a RunContext, startup_error: Option<CapturedError>) -> BoxFuture<'a, RunSummary>;
}

pub(crate) async fn run_level<R>(runner: &R, ctx: &RunContext) -> RunSummary
where
    R: LevelRunner + ?Sized,
{
    let scope = Scope {
        level: runner.kind(),
        unique_id: runner.unique_id(),
        display_name: runner.display_name(),
    };
    debug!(level = %scope.level, "Starting {}", scope.display_name);

    let accepted = ctx.aggregator.run(|| {
        let published = ctx.publish(runner.starting_message());
        let accepted = ctx.hooks.on_starting(&scope)?;
        Ok::<_, CapturedError>(published && accepted)
    });
    if accepted == Some(false) {
        ctx.cancel();
    }

    let startup_error = if runner.keeps_startup_errors() {
        None
    } else {
        ctx.aggregator.take()
    };

    let mut summary = RunSummary::default();
    if ctx.is_cancelled() {
        if let Some(error) = startup_error {
            ctx.aggregator.add(error);
        }
    } else {
        let body = async { Ok::<_, CapturedError>(runner.execute(ctx, startup_error).await) };
        summary = ctx.aggregator.run_async(body).await.unwrap_or_default();
    }

    let accepted = ctx.aggregator.run(|| {
        let published = ctx.publish(runner.finished_message(&summary));
        let accepted = ctx.hooks.on_finished(&scope, &summary)?;
        Ok::<_, CapturedError>(published && accepted)
    });
    if accepted == Some(false) {
        ctx.cancel();
    }

    if let Some(error) = ctx.aggregator.take() {
        warn!(level = %scope.level, "Cleanup failure in {}: {}", scope.display_name, error);

        let reporting = ExceptionAggregator::new();
        let accepted = reporting.run(|| {
            let published = ctx.publish(runner.cleanup_failure_message(&error));
            let accepted = ctx.hooks.on_cleanup_failure(&scope, &error)?;
            Ok::<_, CapturedError>(published && accepted)
        });
        if accepted == Some(false) {
            ctx.cancel();
        }

        if let Some(failure) = reporting.take() {
            ctx.publish(Message::Error(ErrorMessage {
                assembly_id: Some(runner.ids().assembly.clone()),
                error: failure.metadata(),
            }));
        }
    }

    debug!(level = %scope.level, "Finished {}: {}", scope.display_name, summary);
    summary
}
