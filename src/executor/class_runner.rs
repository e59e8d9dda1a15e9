//! Test class runner
//!
//! Owns the class-scoped fixtures: builds them before any test runs and
//! disposes them after the last one.

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

use super::context::RunContext;
use super::lifecycle::{run_level, LevelRunner};
use super::method_runner::TestMethodRunner;
use super::ordering::{group_by, order_cases};
use crate::error::CapturedError;
use crate::fixtures::FixtureMappingManager;
use crate::messages::{CleanupFailure, LevelFinished, LevelKind, LevelStarting, Message, UniqueIds};
use crate::models::{RunSummary, TestCase, TestClass};

pub(crate) struct TestClassRunner {
    class: Arc<TestClass>,
    cases: Vec<Arc<TestCase>>,
    collection_fixtures: Arc<FixtureMappingManager>,
    ids: UniqueIds,
}

impl TestClassRunner {
    pub(crate) fn new(
        class: Arc<TestClass>,
        cases: Vec<Arc<TestCase>>,
        collection_fixtures: Arc<FixtureMappingManager>,
    ) -> Self {
        Self {
            ids: UniqueIds::for_class(&class),
            class,
            cases,
            collection_fixtures,
        }
    }
}

impl LevelRunner for TestClassRunner {
    fn kind(&self) -> LevelKind {
        LevelKind::Class
    }

    fn ids(&self) -> &UniqueIds {
        &self.ids
    }

    fn unique_id(&self) -> &str {
        &self.class.unique_id
    }

    fn display_name(&self) -> &str {
        &self.class.name
    }

    fn starting_message(&self) -> Message {
        Message::TestClassStarting(LevelStarting {
            ids: self.ids.clone(),
            display_name: self.class.name.clone(),
            start_time: Utc::now(),
        })
    }

    fn finished_message(&self, summary: &RunSummary) -> Message {
        Message::TestClassFinished(LevelFinished {
            ids: self.ids.clone(),
            summary: *summary,
            finish_time: Utc::now(),
        })
    }

    fn cleanup_failure_message(&self, error: &CapturedError) -> Message {
        Message::TestClassCleanupFailure(CleanupFailure {
            ids: self.ids.clone(),
            error: error.metadata(),
        })
    }

    fn execute<'a>(&'a self, ctx: &'a RunContext, startup_error: Option<CapturedError>) -> BoxFuture<'a, RunSummary> {
        async move {
            let fixtures = Arc::new(FixtureMappingManager::new(
                "Class",
                self.class.fixtures.clone(),
                Some(Arc::clone(&self.collection_fixtures)),
            ));

            let mut error = startup_error;
            if error.is_none() {
                error = fixtures.initialize().await.err();
            }

            let cases = if error.is_none() {
                order_cases(ctx, self.cases.clone())
            } else {
                self.cases.clone()
            };

            let mut summary = RunSummary::default();
            for (method, cases) in group_by(&cases, |case| &case.method) {
                if ctx.is_cancelled() {
                    break;
                }
                let runner = TestMethodRunner::new(method, cases, Arc::clone(&fixtures));
                summary += run_level(&runner, &ctx.child(error.as_ref())).await;
            }

            if let Err(e) = fixtures.dispose().await {
                ctx.aggregator.add(e);
            }
            summary
        }
        .boxed()
    }
}
