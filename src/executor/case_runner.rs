//! Test case runner
//!
//! A case with fixed arguments runs one test. A data-driven case enumerates
//! all of its rows up front and runs one test per row, disposing each row's
//! arguments right after its test. Rows that never run are disposed before
//! the case finishes.

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::context::RunContext;
use super::lifecycle::{run_level, LevelRunner};
use super::test_runner::TestRunner;
use crate::error::{CapturedError, EngineError};
use crate::fixtures::FixtureMappingManager;
use crate::messages::{CaseStarting, CleanupFailure, LevelFinished, LevelKind, Message, UniqueIds};
use crate::models::{DataRow, RowSource, RunSummary, Test, TestArgs, TestCase, TestData};
use crate::utils::timer::measure;

pub(crate) struct TestCaseRunner {
    case: Arc<TestCase>,
    fixtures: Arc<FixtureMappingManager>,
    ids: UniqueIds,
}

impl TestCaseRunner {
    pub(crate) fn new(case: Arc<TestCase>, fixtures: Arc<FixtureMappingManager>) -> Self {
        Self {
            ids: UniqueIds::for_case(&case),
            case,
            fixtures,
        }
    }

    async fn run_test(&self, ctx: &RunContext, test: Test, seed: Option<&CapturedError>) -> RunSummary {
        let runner = TestRunner::new(test, Arc::clone(&self.fixtures), &ctx.bus);
        run_level(&runner, &ctx.child(seed)).await
    }

    /// Stand-in test reporting on the case as a whole
    fn whole_case_test(&self, index: i32) -> Test {
        Test::new(&self.case, index, self.case.display_name.clone(), TestArgs::empty())
    }

    /// Enumerate every row; rows produced before a failure are kept for disposal
    fn enumerate(&self, source: &RowSource) -> (Vec<DataRow>, Option<CapturedError>) {
        let mut rows = Vec::new();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            for row in source() {
                rows.push(row?);
            }
            Ok::<(), CapturedError>(())
        }));
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(payload) => Some(CapturedError::from_panic(payload)),
        };
        (rows, error)
    }

    async fn run_rows(&self, ctx: &RunContext, source: &RowSource, startup_error: Option<CapturedError>) -> RunSummary {
        // A skipped case never touches its data.
        if self.case.skip_reason.is_some() {
            return self.run_test(ctx, self.whole_case_test(0), startup_error.as_ref()).await;
        }

        let (rows, enumeration_error) = self.enumerate(source);
        if let Some(cause) = enumeration_error {
            let failure = CapturedError::from(EngineError::DataEnumeration {
                case: self.case.display_name.clone(),
            })
            .with_inner(cause);
            let seed = match startup_error {
                Some(startup) => CapturedError::aggregate(vec![startup, failure]),
                None => failure,
            };
            let mut summary = self.run_test(ctx, self.whole_case_test(-1), Some(&seed)).await;
            summary.time += self.dispose_rows(ctx, &rows).await;
            return summary;
        }
        debug!("{} produced {} data rows", self.case.display_name, rows.len());

        let parameters = &self.case.method.parameters;
        let mut summary = RunSummary::default();
        let mut unrun = Vec::new();
        for (position, row) in rows.into_iter().enumerate() {
            if ctx.is_cancelled() {
                unrun.push(row);
                continue;
            }
            let Some(index) = row_index(position) else {
                if unrun.is_empty() {
                    ctx.aggregator.add(EngineError::TooManyRows {
                        case: self.case.display_name.clone(),
                        first_skipped: position,
                    });
                }
                unrun.push(row);
                continue;
            };

            let display_name = row
                .display_name
                .clone()
                .unwrap_or_else(|| row.args.display_name(&self.case.display_name, parameters));
            let test = Test::new(&self.case, index, display_name, row.args.clone()).with_skip(row.skip.clone());
            summary += self.run_test(ctx, test, startup_error.as_ref()).await;
            summary.time += self.dispose_rows(ctx, std::slice::from_ref(&row)).await;
        }

        if !unrun.is_empty() {
            debug!("Disposing {} data rows of {} that never ran", unrun.len(), self.case.display_name);
            summary.time += self.dispose_rows(ctx, &unrun).await;
        }
        summary
    }

    /// Dispose the rows' arguments into the case aggregator; returns the time spent
    async fn dispose_rows(&self, ctx: &RunContext, rows: &[DataRow]) -> Duration {
        let dispose = async {
            for arg in rows.iter().flat_map(|row| row.args.iter()).filter(|arg| arg.is_disposable()) {
                ctx.aggregator.run_async(arg.dispose()).await;
            }
        };
        let (_, elapsed) = measure("dispose row arguments", dispose).await;
        elapsed
    }
}

/// Test index for the row at `position`, if it fits
fn row_index(position: usize) -> Option<i32> {
    i32::try_from(position).ok()
}

impl LevelRunner for TestCaseRunner {
    fn kind(&self) -> LevelKind {
        LevelKind::Case
    }

    fn ids(&self) -> &UniqueIds {
        &self.ids
    }

    fn unique_id(&self) -> &str {
        &self.case.unique_id
    }

    fn display_name(&self) -> &str {
        &self.case.display_name
    }

    fn starting_message(&self) -> Message {
        Message::TestCaseStarting(CaseStarting {
            ids: self.ids.clone(),
            display_name: self.case.display_name.clone(),
            explicit: self.case.explicit,
            skip_reason: self.case.skip_reason.clone(),
            traits: self.case.traits.clone(),
            start_time: Utc::now(),
        })
    }

    fn finished_message(&self, summary: &RunSummary) -> Message {
        Message::TestCaseFinished(LevelFinished {
            ids: self.ids.clone(),
            summary: *summary,
            finish_time: Utc::now(),
        })
    }

    fn cleanup_failure_message(&self, error: &CapturedError) -> Message {
        Message::TestCaseCleanupFailure(CleanupFailure {
            ids: self.ids.clone(),
            error: error.metadata(),
        })
    }

    fn execute<'a>(&'a self, ctx: &'a RunContext, startup_error: Option<CapturedError>) -> BoxFuture<'a, RunSummary> {
        async move {
            match &self.case.data {
                TestData::Fixed(args) => {
                    let test = Test::new(&self.case, 0, self.case.display_name.clone(), args.clone());
                    self.run_test(ctx, test, startup_error.as_ref()).await
                }
                TestData::Rows(source) => self.run_rows(ctx, source, startup_error).await,
            }
        }
        .boxed()
    }
}
