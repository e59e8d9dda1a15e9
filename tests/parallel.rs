//! Collection scheduling under the two parallel algorithms

mod common;

use std::sync::Arc;

use common::*;
use trellis::config::{ParallelAlgorithm, RunOptions};
use trellis::error::CapturedError;
use trellis::executor::{AssemblyRunner, TestContext};
use trellis::models::{TestAssembly, TestBody, TestCase, TestClass, TestCollection, TestMethod};

/// Two collections whose single test logs around a yield point
fn build(log: &Log, sequential_second: bool) -> (Arc<TestAssembly>, Vec<Arc<TestCase>>) {
    let assembly = Arc::new(TestAssembly::new("parallel"));
    let mut cases = Vec::new();

    for name in ["A", "B"] {
        let mut collection = TestCollection::new(&assembly, name);
        if sequential_second && name == "B" {
            collection = collection.sequential();
        }
        let collection = Arc::new(collection);
        let class = Arc::new(TestClass::new(&collection, "Tests"));

        let log = log.clone();
        let method = Arc::new(TestMethod::new(
            &class,
            "yields",
            TestBody::awaitable(move |_: TestContext, _| {
                let log = log.clone();
                async move {
                    log.push(format!("{name}-pre"));
                    tokio::task::yield_now().await;
                    log.push(format!("{name}-post"));
                    Ok::<(), CapturedError>(())
                }
            }),
        ));
        cases.push(Arc::new(TestCase::new(&method)));
    }

    (assembly, cases)
}

fn options(algorithm: ParallelAlgorithm) -> RunOptions {
    RunOptions::default()
        .with_sync_reporting(true)
        .with_max_threads(1)
        .with_algorithm(algorithm)
}

#[tokio::test]
async fn test_aggressive_interleaves_collections() {
    let log = Log::default();
    let (assembly, cases) = build(&log, false);

    let (summary, _) = run(AssemblyRunner::new(options(ParallelAlgorithm::Aggressive)), &assembly, cases).await;

    assert_eq!(summary.passed_count(), 2);
    assert_eq!(log.entries(), vec!["A-pre", "B-pre", "A-post", "B-post"]);
}

#[tokio::test]
async fn test_conservative_runs_collections_whole() {
    let log = Log::default();
    let (assembly, cases) = build(&log, false);

    let (summary, _) = run(AssemblyRunner::new(options(ParallelAlgorithm::Conservative)), &assembly, cases).await;

    assert_eq!(summary.passed_count(), 2);
    assert_eq!(log.entries(), vec!["A-pre", "A-post", "B-pre", "B-post"]);
}

#[tokio::test]
async fn test_non_parallel_collection_runs_after_the_rest() {
    let log = Log::default();
    let (assembly, cases) = build(&log, true);

    let options = RunOptions::default().with_sync_reporting(true).with_max_threads(-1);
    let (summary, sink) = run(AssemblyRunner::new(options), &assembly, cases).await;

    assert_eq!(summary.total, 2);
    assert_eq!(log.entries(), vec!["A-pre", "A-post", "B-pre", "B-post"]);

    let environment = sink.messages().into_iter().find_map(|m| match m {
        trellis::messages::Message::TestAssemblyStarting(s) => Some(s.test_environment),
        _ => None,
    });
    assert_eq!(environment.as_deref(), Some("parallel (unlimited threads)"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_run_totals_are_complete() {
    let assembly = Arc::new(TestAssembly::new("many"));
    let mut cases = Vec::new();
    for c in 0..6 {
        let collection = Arc::new(TestCollection::new(&assembly, format!("c{c}")));
        let class = Arc::new(TestClass::new(&collection, "Tests"));
        for m in 0..4 {
            let method = Arc::new(TestMethod::new(
                &class,
                format!("m{m}"),
                TestBody::awaitable(|_: TestContext, _| async {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    Ok::<(), CapturedError>(())
                }),
            ));
            cases.push(Arc::new(TestCase::new(&method)));
        }
    }

    let options = RunOptions::default()
        .with_max_threads(3)
        .with_algorithm(ParallelAlgorithm::Aggressive);
    let (summary, sink) = run(AssemblyRunner::new(options), &assembly, cases).await;

    assert_eq!(summary.total, 24);
    assert_eq!(summary.passed_count(), 24);
    assert_eq!(sink.of_kind("TestCollectionFinished").len(), 6);
}
