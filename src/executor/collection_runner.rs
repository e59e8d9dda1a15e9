//! Test collection runner

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

use super::class_runner::TestClassRunner;
use super::context::RunContext;
use super::lifecycle::{run_level, LevelRunner};
use super::ordering::group_by;
use crate::error::CapturedError;
use crate::fixtures::FixtureMappingManager;
use crate::messages::{CleanupFailure, LevelFinished, LevelKind, LevelStarting, Message, UniqueIds};
use crate::models::{RunSummary, TestCase, TestCollection};

pub(crate) struct TestCollectionRunner {
    collection: Arc<TestCollection>,
    cases: Vec<Arc<TestCase>>,
    assembly_fixtures: Arc<FixtureMappingManager>,
    ids: UniqueIds,
}

impl TestCollectionRunner {
    pub(crate) fn new(
        collection: Arc<TestCollection>,
        cases: Vec<Arc<TestCase>>,
        assembly_fixtures: Arc<FixtureMappingManager>,
    ) -> Self {
        Self {
            ids: UniqueIds::for_collection(&collection),
            collection,
            cases,
            assembly_fixtures,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.collection.display_name
    }
}

impl LevelRunner for TestCollectionRunner {
    fn kind(&self) -> LevelKind {
        LevelKind::Collection
    }

    fn ids(&self) -> &UniqueIds {
        &self.ids
    }

    fn unique_id(&self) -> &str {
        &self.collection.unique_id
    }

    fn display_name(&self) -> &str {
        &self.collection.display_name
    }

    fn starting_message(&self) -> Message {
        Message::TestCollectionStarting(LevelStarting {
            ids: self.ids.clone(),
            display_name: self.collection.display_name.clone(),
            start_time: Utc::now(),
        })
    }

    fn finished_message(&self, summary: &RunSummary) -> Message {
        Message::TestCollectionFinished(LevelFinished {
            ids: self.ids.clone(),
            summary: *summary,
            finish_time: Utc::now(),
        })
    }

    fn cleanup_failure_message(&self, error: &CapturedError) -> Message {
        Message::TestCollectionCleanupFailure(CleanupFailure {
            ids: self.ids.clone(),
            error: error.metadata(),
        })
    }

    fn execute<'a>(&'a self, ctx: &'a RunContext, startup_error: Option<CapturedError>) -> BoxFuture<'a, RunSummary> {
        async move {
            let fixtures = Arc::new(FixtureMappingManager::new(
                "Collection",
                self.collection.fixtures.clone(),
                Some(Arc::clone(&self.assembly_fixtures)),
            ));

            let mut error = startup_error;
            if error.is_none() {
                error = fixtures.initialize().await.err();
            }

            let mut summary = RunSummary::default();
            for (class, cases) in group_by(&self.cases, |case| case.class()) {
                if ctx.is_cancelled() {
                    break;
                }
                let runner = TestClassRunner::new(class, cases, Arc::clone(&fixtures));
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
