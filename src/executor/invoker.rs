//! Test invoker
//!
//! Runs one test: per-test class instance, before hooks, the body (with an
//! optional timeout), after hooks and instance disposal. Every failure lands in
//! the test's aggregator; the invoker only reports elapsed time.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::context::RunContext;
use super::test_context::{TestContext, TestOutputHelper};
use crate::error::{CapturedError, EngineError};
use crate::fixtures::{FixtureInstance, FixtureMappingManager};
use crate::messages::{HookPhase, Message, TestPhase, UniqueIds};
use crate::models::{BeforeAfterHook, Test, TestBody, TestResult};
use crate::utils::Timer;

pub(crate) struct TestInvoker<'a> {
    pub(crate) test: &'a Test,
    pub(crate) fixtures: &'a Arc<FixtureMappingManager>,
    pub(crate) output: &'a TestOutputHelper,
    pub(crate) ids: &'a UniqueIds,
}

impl TestInvoker<'_> {
    /// Invoke the test, returning the time spent.
    ///
    /// Nothing runs (and zero is returned) when the aggregator already holds an
    /// error or the run is cancelled.
    pub(crate) async fn invoke(&self, ctx: &RunContext) -> Duration {
        if ctx.is_cancelled() || ctx.aggregator.has_errors() {
            return Duration::ZERO;
        }

        let timer = Timer::start(self.test.display_name.clone());
        let method = self.test.method();

        if self.test.args.len() != method.parameters.len() {
            ctx.aggregator.add(EngineError::ArgumentCount {
                expected: method.parameters.len(),
                actual: self.test.args.len(),
            });
            return timer.stop();
        }

        if self.test.case.timeout.is_some() && !method.body.supports_timeout() {
            ctx.aggregator.add(EngineError::TimeoutRequiresAsync {
                method: method.qualified_name(),
            });
            return timer.stop();
        }

        let token = ctx.cancellation.child_token();
        let instance = self.create_instance(ctx).await;

        if !ctx.aggregator.has_errors() {
            let test_ctx = TestContext::new(
                self.test.display_name.clone(),
                self.test.unique_id.clone(),
                token.clone(),
                self.output.clone(),
                instance.clone(),
                Arc::clone(self.fixtures),
            );

            let hooks: Vec<&BeforeAfterHook> = self
                .test
                .case
                .class()
                .hooks
                .iter()
                .chain(method.hooks.iter())
                .collect();

            let ran = self.run_before_hooks(ctx, &test_ctx, &hooks);
            if !ctx.aggregator.has_errors() && !ctx.is_cancelled() {
                self.invoke_body(ctx, test_ctx.clone(), token).await;
            }
            self.run_after_hooks(ctx, &test_ctx, &hooks[..ran]);
        }

        if let Some(instance) = instance {
            self.dispose_instance(ctx, instance).await;
        }

        timer.stop()
    }

    fn phase(&self) -> TestPhase {
        TestPhase {
            ids: self.ids.clone(),
        }
    }

    fn hook_phase(&self, hook: &BeforeAfterHook) -> HookPhase {
        HookPhase {
            ids: self.ids.clone(),
            hook_name: hook.name.clone(),
        }
    }

    async fn create_instance(&self, ctx: &RunContext) -> Option<FixtureInstance> {
        let definition = self.test.case.class().constructor.as_ref()?;

        ctx.publish(Message::TestClassConstructionStarting(self.phase()));
        let instance = if ctx.is_cancelled() {
            None
        } else {
            ctx.aggregator
                .run_async(self.fixtures.construct_transient(definition))
                .await
        };
        ctx.publish(Message::TestClassConstructionFinished(self.phase()));

        instance
    }

    async fn dispose_instance(&self, ctx: &RunContext, instance: FixtureInstance) {
        let Some(definition) = self.test.case.class().constructor.as_ref() else {
            return;
        };
        if !definition.has_dispose() {
            return;
        }

        ctx.publish(Message::TestClassDisposeStarting(self.phase()));
        ctx.aggregator
            .run_async(self.fixtures.dispose_transient(definition, instance))
            .await;
        ctx.publish(Message::TestClassDisposeFinished(self.phase()));
    }

    /// Run before hooks in order, stopping at the first failure; returns how many succeeded
    fn run_before_hooks(&self, ctx: &RunContext, test_ctx: &TestContext, hooks: &[&BeforeAfterHook]) -> usize {
        let mut ran = 0;
        for hook in hooks {
            if ctx.is_cancelled() {
                break;
            }

            ctx.publish(Message::BeforeTestStarting(self.hook_phase(hook)));
            let succeeded = ctx.aggregator.run(|| hook.run_before(test_ctx)).is_some();
            ctx.publish(Message::BeforeTestFinished(self.hook_phase(hook)));

            if !succeeded {
                break;
            }
            ran += 1;
        }
        ran
    }

    /// After hooks run in reverse for every before hook that succeeded
    fn run_after_hooks(&self, ctx: &RunContext, test_ctx: &TestContext, hooks: &[&BeforeAfterHook]) {
        for hook in hooks.iter().rev() {
            ctx.publish(Message::AfterTestStarting(self.hook_phase(hook)));
            ctx.aggregator.run(|| hook.run_after(test_ctx));
            ctx.publish(Message::AfterTestFinished(self.hook_phase(hook)));
        }
    }

    async fn invoke_body(&self, ctx: &RunContext, test_ctx: TestContext, token: CancellationToken) {
        let args = self.test.args.clone();
        let timeout = self.test.case.timeout;

        let result = match &self.test.method().body {
            TestBody::Sync(body) => guarded(|| body(&test_ctx, &args)),
            TestBody::Async(body) => match guarded(|| Ok(body(test_ctx, args))) {
                Err(e) => Err(e),
                Ok(fut) => match timeout {
                    None => run_future(fut).await,
                    Some(limit) => run_with_timeout(fut, limit, &token).await,
                },
            },
            TestBody::Detached(body) => match guarded(|| Ok(body(test_ctx, args))) {
                Err(e) => Err(e),
                Ok(handle) => flatten_join(handle.await),
            },
        };

        if let Err(error) = result {
            debug!("{} failed: {}", self.test.display_name, error);
            ctx.aggregator.add(error);
        }
    }
}

fn guarded<T>(f: impl FnOnce() -> Result<T, CapturedError>) -> Result<T, CapturedError> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(CapturedError::from_panic(payload)))
}

async fn run_future(fut: BoxFuture<'static, TestResult>) -> TestResult {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(CapturedError::from_panic(payload)))
}

/// Race the body against `limit`; on expiry the body is abandoned, not awaited
async fn run_with_timeout(fut: BoxFuture<'static, TestResult>, limit: Duration, token: &CancellationToken) -> TestResult {
    let mut handle = tokio::spawn(fut);
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(joined) => flatten_join(joined),
        Err(_) => {
            warn!("Test body timed out after {}ms", limit.as_millis());
            token.cancel();
            Err(EngineError::Timeout(limit).into())
        }
    }
}

fn flatten_join(joined: Result<TestResult, JoinError>) -> TestResult {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(CapturedError::from_panic(e.into_panic())),
        Err(e) => Err(CapturedError::new("trellis::TaskCancelled", e.to_string())),
    }
}
