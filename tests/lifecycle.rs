//! Outcomes, cancellation and roll-up behavior

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use trellis::config::ExplicitMode;
use trellis::error::CapturedError;
use trellis::executor::{AssemblyRunner, TestContext};
use trellis::fixtures::FixtureDefinition;
use trellis::messages::{CollectingSink, LevelKind, Message};
use trellis::models::{BeforeAfterHook, DataRow, RowIter, TestArg, TestBody, TestCase, TestClass, TestCollection, TestMethod};

#[tokio::test]
async fn test_stop_request_prevents_new_siblings() {
    let suite = Suite::new();
    let cases = (0..3)
        .map(|i| Arc::new(TestCase::new(&suite.method(&format!("m{i}"), passing()))))
        .collect();

    let sink = CollectingSink::new().stop_on("TestFinished");
    let caller = tokio_util::sync::CancellationToken::new();
    let runner = AssemblyRunner::new(sync_options()).with_cancellation(&caller);
    let (summary, sink) = run_with_sink(runner, &suite.assembly, cases, sink).await;

    // The run's own stop does not reach the caller's token.
    assert!(!caller.is_cancelled());
    assert_eq!(summary.total, 1);
    assert_eq!(sink.of_kind("TestStarting").len(), 1);

    // Every level that started also finished.
    for (starting, finished) in [
        ("TestAssemblyStarting", "TestAssemblyFinished"),
        ("TestCollectionStarting", "TestCollectionFinished"),
        ("TestClassStarting", "TestClassFinished"),
        ("TestMethodStarting", "TestMethodFinished"),
        ("TestCaseStarting", "TestCaseFinished"),
        ("TestStarting", "TestFinished"),
    ] {
        assert_eq!(sink.of_kind(starting).len(), sink.of_kind(finished).len(), "{starting}");
    }
}

#[tokio::test]
async fn test_hook_returning_false_cancels() {
    let suite = Suite::new();
    let cases = (0..2)
        .map(|i| Arc::new(TestCase::new(&suite.method(&format!("m{i}"), passing()))))
        .collect();
    let hooks = FnHooks(|point: &str, level: LevelKind| Ok(!(point == "finished" && level == LevelKind::Method)));

    let runner = AssemblyRunner::new(sync_options()).with_hooks(hooks);
    let (summary, sink) = run(runner, &suite.assembly, cases).await;

    assert_eq!(summary.total, 1);
    assert_eq!(sink.of_kind("TestMethodStarting").len(), 1);
}

#[tokio::test]
async fn test_external_cancellation_before_run() {
    let suite = Suite::new();
    let case = Arc::new(TestCase::new(&suite.method("never", passing())));
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();

    let runner = AssemblyRunner::new(sync_options()).with_cancellation(&token);
    let (summary, sink) = run(runner, &suite.assembly, vec![case]).await;

    assert_eq!(summary.total, 0);
    assert_eq!(sink.names(), vec!["TestAssemblyStarting", "TestAssemblyFinished"]);
}

#[tokio::test]
async fn test_outcome_kinds() {
    let suite = Suite::new();
    let cases = vec![
        Arc::new(TestCase::new(&suite.method("passes", passing()))),
        Arc::new(TestCase::new(&suite.method(
            "fails",
            TestBody::sync(|_, _| Err(CapturedError::assertion("expected 1, got 2"))),
        ))),
        Arc::new(TestCase::new(&suite.method("skipped", passing())).skip("not today")),
        Arc::new(TestCase::new(&suite.method(
            "dynamic",
            TestBody::sync(|_, _| Err(CapturedError::skip("no network"))),
        ))),
        Arc::new(TestCase::new(&suite.method("manual", passing())).explicit()),
        Arc::new(TestCase::new(&suite.method("panics", TestBody::sync(|_, _| panic!("kaboom"))))),
    ];

    let (summary, sink) = run(AssemblyRunner::new(sync_options()), &suite.assembly, cases).await;

    assert_eq!(
        (summary.total, summary.failed, summary.skipped, summary.not_run),
        (6, 2, 2, 1)
    );
    assert_eq!(summary.passed_count(), 1);

    let reasons: Vec<String> = sink
        .of_kind("TestSkipped")
        .into_iter()
        .filter_map(|m| match m {
            Message::TestSkipped(s) => Some(s.reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec!["not today", "no network"]);

    let failures: Vec<String> = sink
        .of_kind("TestFailed")
        .iter()
        .map(|m| m.error().unwrap().messages[0].clone())
        .collect();
    assert_eq!(failures[0], "expected 1, got 2");
    assert!(failures[1].contains("kaboom"));
}

#[tokio::test]
async fn test_explicit_only_mode() {
    let suite = Suite::new();
    let cases = vec![
        Arc::new(TestCase::new(&suite.method("regular", passing()))),
        Arc::new(TestCase::new(&suite.method("manual", passing())).explicit()),
    ];

    let options = sync_options().with_explicit_mode(ExplicitMode::Only);
    let (summary, _) = run(AssemblyRunner::new(options), &suite.assembly, cases).await;

    assert_eq!((summary.total, summary.not_run, summary.passed_count()), (2, 1, 1));
}

#[tokio::test]
async fn test_timeout_abandons_body() {
    let suite = Suite::new();
    let method = suite.method(
        "hangs",
        TestBody::awaitable(|_: TestContext, _| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), CapturedError>(())
        }),
    );
    let sync_method = suite.method("sync_with_timeout", passing());
    let cases = vec![
        Arc::new(TestCase::new(&method).timeout(Duration::from_millis(20))),
        Arc::new(TestCase::new(&sync_method).timeout(Duration::from_millis(20))),
    ];

    let (summary, sink) = run(AssemblyRunner::new(sync_options()), &suite.assembly, cases).await;

    assert_eq!(summary.failed, 2);
    let failed = sink.of_kind("TestFailed");
    assert!(failed[0].error().unwrap().messages[0].contains("timed out after 20 milliseconds"));
    assert!(failed[1].error().unwrap().messages[0].contains("only supported for async tests"));
}

#[tokio::test]
async fn test_argument_count_mismatch_fails_only_that_test() {
    let suite = Suite::new();
    let method = Arc::new(TestMethod::new(&suite.class, "takes_two", passing()).with_parameters(["a", "b"]));
    let cases = vec![
        Arc::new(TestCase::new(&method).with_args(vec![TestArg::new(1)])),
        Arc::new(TestCase::new(&suite.method("fine", passing()))),
    ];

    let (summary, sink) = run(AssemblyRunner::new(sync_options()), &suite.assembly, cases).await;

    assert_eq!((summary.total, summary.failed), (2, 1));
    let error = sink.of_kind("TestFailed")[0].error().cloned().unwrap();
    assert!(error.messages[0].contains("expected 2"));
}

#[tokio::test]
async fn test_class_instance_and_hooks_are_bracketed() {
    let log = Log::default();
    let suite = Suite::new();
    let (before_log, after_log, body_log) = (log.clone(), log.clone(), log.clone());

    let class = Arc::new(
        TestClass::new(&suite.collection, "WithInstance")
            .with_constructor(
                FixtureDefinition::builder::<String>()
                    .constructor(vec![], |_| Ok("instance".to_string()))
                    .dispose_with(|_| Ok(()))
                    .build(),
            )
            .with_hook(
                BeforeAfterHook::new("outer")
                    .before(move |_| {
                        before_log.push("before outer");
                        Ok(())
                    })
                    .after(move |_| {
                        after_log.push("after outer");
                        Ok(())
                    }),
            ),
    );
    let method = Arc::new(TestMethod::new(
        &class,
        "uses_instance",
        TestBody::sync(move |ctx, _| {
            let instance = ctx.instance::<String>().ok_or_else(|| CapturedError::assertion("no instance"))?;
            body_log.push(format!("body {instance}"));
            Ok(())
        }),
    ));

    let (summary, sink) = run(
        AssemblyRunner::new(sync_options()),
        &suite.assembly,
        vec![Arc::new(TestCase::new(&method))],
    )
    .await;

    assert_eq!(summary.passed_count(), 1);
    assert_eq!(log.entries(), vec!["before outer", "body instance", "after outer"]);
    assert_eq!(
        window(&sink.names(), "TestStarting", "TestFinished"),
        vec![
            "TestStarting",
            "TestClassConstructionStarting",
            "TestClassConstructionFinished",
            "BeforeTestStarting",
            "BeforeTestFinished",
            "AfterTestStarting",
            "AfterTestFinished",
            "TestClassDisposeStarting",
            "TestClassDisposeFinished",
            "TestPassed",
            "TestFinished",
        ]
    );
}

#[tokio::test]
async fn test_failing_before_hook_skips_body_and_later_hooks() {
    let log = Log::default();
    let suite = Suite::new();
    let (first_after, body_log) = (log.clone(), log.clone());

    let method = Arc::new(
        TestMethod::new(
            &suite.class,
            "guarded",
            TestBody::sync(move |_, _| {
                body_log.push("body");
                Ok(())
            }),
        )
        .with_hook(BeforeAfterHook::new("first").before(|_| Ok(())).after(move |_| {
            first_after.push("after first");
            Ok(())
        }))
        .with_hook(BeforeAfterHook::new("second").before(|_| Err(CapturedError::new("HookError", "setup failed")))),
    );

    let (summary, _) = run(
        AssemblyRunner::new(sync_options()),
        &suite.assembly,
        vec![Arc::new(TestCase::new(&method))],
    )
    .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(log.entries(), vec!["after first"]);
}

#[tokio::test]
async fn test_row_enumeration_failure_yields_synthetic_test() {
    let suite = Suite::new();
    let method = Arc::new(TestMethod::new(&suite.class, "rows", passing()).with_parameters(["x"]));
    let case = Arc::new(TestCase::new(&method).with_row_source(|| -> RowIter {
        Box::new(
            vec![
                Ok(DataRow::new(vec![TestArg::new(1)])),
                Err(CapturedError::new("SourceError", "database offline")),
            ]
            .into_iter(),
        )
    }));

    let (summary, sink) = run(AssemblyRunner::new(sync_options()), &suite.assembly, vec![case]).await;

    assert_eq!((summary.total, summary.failed), (1, 1));
    let error = sink.of_kind("TestFailed")[0].error().cloned().unwrap();
    assert_eq!(error.parent_indices, vec![-1, 0]);
    assert_eq!(error.types[1], "SourceError");
}

#[tokio::test]
async fn test_row_arguments_disposed_after_each_test() {
    let log = Log::default();
    let suite = Suite::new();
    let body_log = log.clone();
    let method = Arc::new(
        TestMethod::new(
            &suite.class,
            "uses_resource",
            TestBody::sync(move |_, args| {
                body_log.push(format!("use {}", args.get::<u32>(0).copied().unwrap_or_default()));
                Ok(())
            }),
        )
        .with_parameters(["resource"]),
    );

    let row_log = log.clone();
    let case = Arc::new(TestCase::new(&method).with_data(move || {
        let rows = (1..=2u32)
            .map(|i| {
                let log = row_log.clone();
                DataRow::new(vec![TestArg::new(i).disposable(move |_: &u32| {
                    log.push(format!("dispose {i}"));
                    Ok(())
                })])
            })
            .collect();
        Ok(rows)
    }));

    let (summary, _) = run(AssemblyRunner::new(sync_options()), &suite.assembly, vec![case]).await;

    assert_eq!(summary.total, 2);
    assert_eq!(log.entries(), vec!["use 1", "dispose 1", "use 2", "dispose 2"]);
}

#[tokio::test]
async fn test_finished_totals_equal_sum_of_children() {
    let assembly = Arc::new(trellis::models::TestAssembly::new("rollup"));
    let mut cases = Vec::new();
    for c in 0..2 {
        let collection = Arc::new(TestCollection::new(&assembly, format!("collection{c}")));
        for k in 0..2 {
            let class = Arc::new(TestClass::new(&collection, format!("Class{k}")));
            for m in 0..2 {
                let body = if (c + k + m) % 3 == 0 {
                    TestBody::sync(|_, _| Err(CapturedError::assertion("nope")))
                } else {
                    passing()
                };
                let method = Arc::new(TestMethod::new(&class, format!("m{m}"), body));
                cases.push(Arc::new(TestCase::new(&method)));
            }
        }
    }

    let (summary, sink) = run(AssemblyRunner::new(Default::default()), &assembly, cases).await;
    assert_eq!(summary.total, 8);

    // parent id -> (own total, sum of child totals)
    let mut totals: HashMap<String, (u32, u32)> = HashMap::new();
    for message in sink.messages() {
        let Some(child_summary) = message.finished_summary() else {
            continue;
        };
        let ids = message.ids().unwrap();
        let own = message.subject_id().unwrap().to_string();
        totals.entry(own).or_default().0 = child_summary.total;

        let parent = match message {
            Message::TestCaseFinished(_) => ids.method.clone(),
            Message::TestMethodFinished(_) => ids.class.clone(),
            Message::TestClassFinished(_) => ids.collection.clone(),
            Message::TestCollectionFinished(_) => Some(ids.assembly.clone()),
            _ => None,
        };
        if let Some(parent) = parent {
            totals.entry(parent).or_default().1 += child_summary.total;
        }
    }

    for (id, (own, children)) in totals {
        if children > 0 {
            assert_eq!(own, children, "{id}");
        }
    }
}

#[tokio::test]
async fn test_stop_does_not_carry_into_next_run() {
    let suite = Suite::new();
    let hooks = FnHooks(|point: &str, level: LevelKind| Ok(!(point == "finished" && level == LevelKind::Assembly)));
    let runner = AssemblyRunner::new(sync_options()).with_hooks(hooks);

    let mut totals = Vec::new();
    for _ in 0..2 {
        let case = Arc::new(TestCase::new(&suite.method("again", passing())));
        let summary = runner.run(Arc::clone(&suite.assembly), vec![case], Vec::new()).await;
        totals.push(summary.total);
    }

    assert_eq!(totals, vec![1, 1]);
}

#[tokio::test]
async fn test_dispatched_collection_reports_lifecycle_after_stop() {
    let assembly = Arc::new(trellis::models::TestAssembly::new("stopped"));
    let cases = ["first", "second"]
        .into_iter()
        .map(|name| {
            let collection = Arc::new(TestCollection::new(&assembly, name));
            let class = Arc::new(TestClass::new(&collection, "Tests"));
            Arc::new(TestCase::new(&Arc::new(TestMethod::new(&class, "only", passing()))))
        })
        .collect();
    let hooks = FnHooks(|point: &str, level: LevelKind| Ok(!(point == "finished" && level == LevelKind::Test)));

    let runner = AssemblyRunner::new(sync_options().with_max_threads(1)).with_hooks(hooks);
    let (summary, sink) = run(runner, &assembly, cases).await;

    assert_eq!(summary.total, 1);
    assert_eq!(sink.of_kind("TestCollectionStarting").len(), 2);
    assert_eq!(sink.of_kind("TestCollectionFinished").len(), 2);
    assert_eq!(sink.of_kind("TestClassStarting").len(), 1);
}

fn disposable_rows(log: &Log, count: u32) -> Vec<DataRow> {
    (1..=count)
        .map(|i| {
            let log = log.clone();
            DataRow::new(vec![TestArg::new(i).disposable(move |_: &u32| {
                log.push(format!("dispose {i}"));
                Ok(())
            })])
        })
        .collect()
}

#[tokio::test]
async fn test_rows_left_after_stop_are_disposed() {
    let log = Log::default();
    let suite = Suite::new();
    let body_log = log.clone();
    let method = Arc::new(
        TestMethod::new(
            &suite.class,
            "uses_resource",
            TestBody::sync(move |_, args| {
                body_log.push(format!("use {}", args.get::<u32>(0).copied().unwrap_or_default()));
                Ok(())
            }),
        )
        .with_parameters(["resource"]),
    );
    let row_log = log.clone();
    let case = Arc::new(TestCase::new(&method).with_data(move || Ok(disposable_rows(&row_log, 3))));

    let sink = CollectingSink::new().stop_on("TestFinished");
    let (summary, _) = run_with_sink(AssemblyRunner::new(sync_options()), &suite.assembly, vec![case], sink).await;

    assert_eq!(summary.total, 1);
    assert_eq!(log.entries(), vec!["use 1", "dispose 1", "dispose 2", "dispose 3"]);
}

#[tokio::test]
async fn test_rows_before_enumeration_failure_are_disposed() {
    let log = Log::default();
    let suite = Suite::new();
    let method = Arc::new(TestMethod::new(&suite.class, "rows", passing()).with_parameters(["x"]));
    let row_log = log.clone();
    let case = Arc::new(TestCase::new(&method).with_row_source(move || -> RowIter {
        let rows = disposable_rows(&row_log, 1).into_iter().map(Ok);
        Box::new(rows.chain(std::iter::once(Err(CapturedError::new("SourceError", "cursor lost")))))
    }));

    let (summary, _) = run(AssemblyRunner::new(sync_options()), &suite.assembly, vec![case]).await;

    assert_eq!((summary.total, summary.failed), (1, 1));
    assert_eq!(log.entries(), vec!["dispose 1"]);
}

#[tokio::test]
async fn test_non_awaitable_bodies_reject_timeout() {
    let log = Log::default();
    let suite = Suite::new();
    let (sync_log, detached_log) = (log.clone(), log.clone());
    let sync_method = suite.method(
        "sync_body",
        TestBody::sync(move |_, _| {
            sync_log.push("sync ran");
            Ok(())
        }),
    );
    let detached_method = suite.method(
        "detached_body",
        TestBody::detached(move |_, _| {
            let log = detached_log.clone();
            tokio::spawn(async move {
                log.push("detached ran");
                Ok::<(), CapturedError>(())
            })
        }),
    );
    let cases = vec![
        Arc::new(TestCase::new(&sync_method).timeout(Duration::from_millis(50))),
        Arc::new(TestCase::new(&detached_method).timeout(Duration::from_millis(50))),
    ];

    let (summary, sink) = run(AssemblyRunner::new(sync_options()), &suite.assembly, cases).await;

    assert_eq!((summary.total, summary.failed), (2, 2));
    for failed in sink.of_kind("TestFailed") {
        assert_eq!(failed.error().unwrap().types, vec!["trellis::UnsupportedTestShape"]);
    }
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_detached_body_is_awaited() {
    let log = Log::default();
    let suite = Suite::new();
    let body_log = log.clone();
    let method = suite.method(
        "detached",
        TestBody::detached(move |_, _| {
            let log = body_log.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                log.push("detached ran");
                Ok::<(), CapturedError>(())
            })
        }),
    );
    let failing = suite.method(
        "detached_fails",
        TestBody::detached(|_, _| tokio::spawn(async { Err::<(), _>(CapturedError::assertion("background check failed")) })),
    );

    let (summary, sink) = run(
        AssemblyRunner::new(sync_options()),
        &suite.assembly,
        vec![Arc::new(TestCase::new(&method)), Arc::new(TestCase::new(&failing))],
    )
    .await;

    assert_eq!((summary.total, summary.failed), (2, 1));
    assert_eq!(log.entries(), vec!["detached ran"]);
    let error = sink.of_kind("TestFailed")[0].error().cloned().unwrap();
    assert_eq!(error.messages, vec!["background check failed"]);
}
