//! Test level runner
//!
//! Decides the outcome of a single test and publishes it between TestStarting
//! and TestFinished.

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;

use super::context::RunContext;
use super::invoker::TestInvoker;
use super::lifecycle::LevelRunner;
use super::test_context::TestOutputHelper;
use crate::error::CapturedError;
use crate::fixtures::FixtureMappingManager;
use crate::messages::{
    CleanupFailure, LevelKind, Message, MessageBus, TestFailed, TestFinished, TestNotRun,
    TestPassed, TestSkipped, TestStarting, UniqueIds,
};
use crate::models::{RunSummary, Test};

pub(crate) struct TestRunner {
    test: Test,
    fixtures: Arc<FixtureMappingManager>,
    output: TestOutputHelper,
    ids: UniqueIds,
}

impl TestRunner {
    pub(crate) fn new(test: Test, fixtures: Arc<FixtureMappingManager>, bus: &Arc<dyn MessageBus>) -> Self {
        let ids = UniqueIds::for_test(&test);
        Self {
            output: TestOutputHelper::new(Arc::clone(bus), ids.clone()),
            test,
            fixtures,
            ids,
        }
    }

    /// Outcome precedence: not run, skipped, failed, passed
    fn outcome(&self, should_run: bool, error: Option<CapturedError>, elapsed: Duration) -> (Message, RunSummary) {
        let ids = self.ids.clone();
        let finish_time = Utc::now();

        if !should_run {
            return (
                Message::TestNotRun(TestNotRun { ids, finish_time }),
                RunSummary::not_run(),
            );
        }

        let skip_reason = self.test.skip_reason.clone().or_else(|| {
            error
                .as_ref()
                .and_then(CapturedError::dynamic_skip_reason)
                .map(str::to_string)
        });
        if let Some(reason) = skip_reason {
            return (
                Message::TestSkipped(TestSkipped {
                    ids,
                    reason,
                    finish_time,
                }),
                RunSummary::skipped(),
            );
        }

        match error {
            Some(error) => (
                Message::TestFailed(TestFailed {
                    ids,
                    execution_time: elapsed,
                    output: self.output.output(),
                    error: error.metadata(),
                    finish_time,
                }),
                RunSummary::failed(),
            ),
            None => (
                Message::TestPassed(TestPassed {
                    ids,
                    execution_time: elapsed,
                    output: self.output.output(),
                    finish_time,
                }),
                RunSummary::passed(),
            ),
        }
    }
}

impl LevelRunner for TestRunner {
    fn kind(&self) -> LevelKind {
        LevelKind::Test
    }

    fn ids(&self) -> &UniqueIds {
        &self.ids
    }

    fn unique_id(&self) -> &str {
        &self.test.unique_id
    }

    fn display_name(&self) -> &str {
        &self.test.display_name
    }

    fn starting_message(&self) -> Message {
        Message::TestStarting(TestStarting {
            ids: self.ids.clone(),
            display_name: self.test.display_name.clone(),
            explicit: self.test.case.explicit,
            timeout: self.test.case.timeout,
            traits: self.test.case.traits.clone(),
            start_time: Utc::now(),
        })
    }

    fn finished_message(&self, summary: &RunSummary) -> Message {
        Message::TestFinished(TestFinished {
            ids: self.ids.clone(),
            execution_time: summary.time,
            output: self.output.output(),
            finish_time: Utc::now(),
        })
    }

    fn cleanup_failure_message(&self, error: &CapturedError) -> Message {
        Message::TestCleanupFailure(CleanupFailure {
            ids: self.ids.clone(),
            error: error.metadata(),
        })
    }

    fn keeps_startup_errors(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, ctx: &'a RunContext, _startup_error: Option<CapturedError>) -> BoxFuture<'a, RunSummary> {
        async move {
            let should_run = ctx.settings.explicit_mode.should_run(self.test.case.explicit);

            let mut elapsed = Duration::ZERO;
            if should_run && self.test.skip_reason.is_none() {
                let invoker = TestInvoker {
                    test: &self.test,
                    fixtures: &self.fixtures,
                    output: &self.output,
                    ids: &self.ids,
                };
                elapsed = invoker.invoke(ctx).await;
            }

            // Errors collected so far are the test's failure, not a cleanup failure.
            let error = ctx.aggregator.take();
            let (message, summary) = self.outcome(should_run, error, elapsed);
            ctx.aggregator.run(|| Ok::<_, CapturedError>(ctx.publish(message)));

            summary.with_time(elapsed)
        }
        .boxed()
    }
}
