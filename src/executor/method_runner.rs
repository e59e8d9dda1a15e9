//! Test method runner

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

use super::case_runner::TestCaseRunner;
use super::context::RunContext;
use super::lifecycle::{run_level, LevelRunner};
use crate::error::CapturedError;
use crate::fixtures::FixtureMappingManager;
use crate::messages::{CleanupFailure, LevelFinished, LevelKind, LevelStarting, Message, UniqueIds};
use crate::models::{RunSummary, TestCase, TestMethod};

pub(crate) struct TestMethodRunner {
    method: Arc<TestMethod>,
    cases: Vec<Arc<TestCase>>,
    fixtures: Arc<FixtureMappingManager>,
    ids: UniqueIds,
    display_name: String,
}

impl TestMethodRunner {
    pub(crate) fn new(method: Arc<TestMethod>, cases: Vec<Arc<TestCase>>, fixtures: Arc<FixtureMappingManager>) -> Self {
        Self {
            ids: UniqueIds::for_method(&method),
            display_name: method.qualified_name(),
            method,
            cases,
            fixtures,
        }
    }
}

impl LevelRunner for TestMethodRunner {
    fn kind(&self) -> LevelKind {
        LevelKind::Method
    }

    fn ids(&self) -> &UniqueIds {
        &self.ids
    }

    fn unique_id(&self) -> &str {
        &self.method.unique_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn starting_message(&self) -> Message {
        Message::TestMethodStarting(LevelStarting {
            ids: self.ids.clone(),
            display_name: self.method.name.clone(),
            start_time: Utc::now(),
        })
    }

    fn finished_message(&self, summary: &RunSummary) -> Message {
        Message::TestMethodFinished(LevelFinished {
            ids: self.ids.clone(),
            summary: *summary,
            finish_time: Utc::now(),
        })
    }

    fn cleanup_failure_message(&self, error: &CapturedError) -> Message {
        Message::TestMethodCleanupFailure(CleanupFailure {
            ids: self.ids.clone(),
            error: error.metadata(),
        })
    }

    fn execute<'a>(&'a self, ctx: &'a RunContext, startup_error: Option<CapturedError>) -> BoxFuture<'a, RunSummary> {
        async move {
            let mut summary = RunSummary::default();
            for case in &self.cases {
                if ctx.is_cancelled() {
                    break;
                }
                let runner = TestCaseRunner::new(Arc::clone(case), Arc::clone(&self.fixtures));
                summary += run_level(&runner, &ctx.child(startup_error.as_ref())).await;
            }
            summary
        }
        .boxed()
    }
}
