//! Test assembly runner
//!
//! Entry point of a run. Owns the message bus for the run's lifetime, the
//! assembly-scoped fixtures and the collection scheduler.

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::collection_runner::TestCollectionRunner;
use super::context::{CancellationSignal, DiagnosticSink, ExecutionSettings, RunContext};
use super::lifecycle::{run_level, LevelRunner, NoHooks, RunnerHooks};
use super::ordering::{group_by, order_collections, DiscoveryOrder, TestCaseOrderer, TestCollectionOrderer};
use super::parallel::{CollectionJob, CollectionScheduler, SchedulingMode};
use crate::config::RunOptions;
use crate::error::CapturedError;
use crate::fixtures::FixtureMappingManager;
use crate::messages::{
    create_message_bus, AssemblyStarting, CleanupFailure, LevelFinished, LevelKind, Message, MessageSink, UniqueIds,
};
use crate::models::{RunSummary, TestAssembly, TestCase};
use crate::utils::Timer;

/// Runs every case of one assembly and reports through the given sinks
pub struct AssemblyRunner {
    options: RunOptions,
    hooks: Arc<dyn RunnerHooks>,
    case_orderer: Arc<dyn TestCaseOrderer>,
    collection_orderer: Arc<dyn TestCollectionOrderer>,
    external_stop: Option<CancellationToken>,
}

impl AssemblyRunner {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            hooks: Arc::new(NoHooks),
            case_orderer: Arc::new(DiscoveryOrder),
            collection_orderer: Arc::new(DiscoveryOrder),
            external_stop: None,
        }
    }

    pub fn with_hooks(mut self, hooks: impl RunnerHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_case_orderer(mut self, orderer: impl TestCaseOrderer + 'static) -> Self {
        self.case_orderer = Arc::new(orderer);
        self
    }

    pub fn with_collection_orderer(mut self, orderer: impl TestCollectionOrderer + 'static) -> Self {
        self.collection_orderer = Arc::new(orderer);
        self
    }

    /// Stop runs when `token` is cancelled
    pub fn with_cancellation(mut self, token: &CancellationToken) -> Self {
        self.external_stop = Some(token.clone());
        self
    }

    /// Caller token every run is linked to
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.external_stop.as_ref()
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub async fn run(
        &self,
        assembly: Arc<TestAssembly>,
        cases: Vec<Arc<TestCase>>,
        sinks: Vec<Arc<dyn MessageSink>>,
    ) -> RunSummary {
        let bus = create_message_bus(self.options.synchronous_message_reporting, sinks);
        let settings = Arc::new(ExecutionSettings {
            explicit_mode: self.options.explicit_mode,
            case_orderer: Arc::clone(&self.case_orderer),
            collection_orderer: Arc::clone(&self.collection_orderer),
        });
        // One signal per run, linked to the caller's token when given.
        let cancellation = match &self.external_stop {
            Some(token) => CancellationSignal::linked_to(token),
            None => CancellationSignal::new(),
        };
        let ctx = RunContext::new(Arc::clone(&bus), cancellation, Arc::clone(&self.hooks), settings);

        let level = AssemblyLevel {
            ids: UniqueIds::for_assembly(&assembly),
            assembly,
            cases,
            environment: self.options.test_environment(),
            mode: SchedulingMode::from_options(&self.options),
        };

        info!("Running assembly {} ({})", level.assembly.name, level.environment);
        let summary = run_level(&level, &ctx).await;
        bus.shutdown().await;

        info!("Assembly {} finished: {}", level.assembly.name, summary);
        summary
    }
}

struct AssemblyLevel {
    assembly: Arc<TestAssembly>,
    cases: Vec<Arc<TestCase>>,
    ids: UniqueIds,
    environment: String,
    mode: SchedulingMode,
}

impl LevelRunner for AssemblyLevel {
    fn kind(&self) -> LevelKind {
        LevelKind::Assembly
    }

    fn ids(&self) -> &UniqueIds {
        &self.ids
    }

    fn unique_id(&self) -> &str {
        &self.assembly.unique_id
    }

    fn display_name(&self) -> &str {
        &self.assembly.name
    }

    fn starting_message(&self) -> Message {
        Message::TestAssemblyStarting(AssemblyStarting {
            ids: self.ids.clone(),
            assembly_name: self.assembly.name.clone(),
            test_environment: self.environment.clone(),
            start_time: Utc::now(),
        })
    }

    fn finished_message(&self, summary: &RunSummary) -> Message {
        Message::TestAssemblyFinished(LevelFinished {
            ids: self.ids.clone(),
            summary: *summary,
            finish_time: Utc::now(),
        })
    }

    fn cleanup_failure_message(&self, error: &CapturedError) -> Message {
        Message::TestAssemblyCleanupFailure(CleanupFailure {
            ids: self.ids.clone(),
            error: error.metadata(),
        })
    }

    fn execute<'a>(&'a self, ctx: &'a RunContext, startup_error: Option<CapturedError>) -> BoxFuture<'a, RunSummary> {
        async move {
            let timer = Timer::start(&self.assembly.name);
            let diagnostics = Arc::new(DiagnosticSink::new(Arc::clone(&ctx.bus), self.assembly.unique_id.clone()));
            let fixtures = Arc::new(
                FixtureMappingManager::new("Assembly", self.assembly.fixtures.clone(), None)
                    .with_capability(diagnostics),
            );

            let mut error = startup_error;
            if error.is_none() {
                error = fixtures.initialize().await.err();
            }

            let groups = group_by(&self.cases, |case| case.collection());
            let groups = if error.is_none() {
                order_collections(ctx, groups)
            } else {
                groups
            };

            let mut parallel = Vec::new();
            let mut sequential = Vec::new();
            for (collection, cases) in groups {
                let runner = TestCollectionRunner::new(Arc::clone(&collection), cases, Arc::clone(&fixtures));
                let child = ctx.child(error.as_ref());
                let job = CollectionJob::new(runner.name().to_string(), async move {
                    run_level(&runner, &child).await
                });
                if collection.disable_parallelization {
                    sequential.push(job);
                } else {
                    parallel.push(job);
                }
            }

            let scheduler = CollectionScheduler::new(self.mode, ctx.cancellation.clone());
            let mut outcome = scheduler.run(parallel).await;

            if !sequential.is_empty() {
                let trailing = CollectionScheduler::new(SchedulingMode::Sequential, ctx.cancellation.clone());
                let rest = trailing.run(sequential).await;
                outcome.summary += rest.summary;
                outcome.errors.extend(rest.errors);
            }
            for e in outcome.errors {
                ctx.aggregator.add(e);
            }

            if let Err(e) = fixtures.dispose().await {
                ctx.aggregator.add(e);
            }

            let elapsed = timer.stop();
            info!("Scheduled collections with {:?} in {}ms", scheduler.mode(), elapsed.as_millis());
            outcome.summary.with_time(elapsed)
        }
        .boxed()
    }
}
