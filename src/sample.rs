//! Built-in sample assembly run by the `trellis` binary

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trellis::error::CapturedError;
use trellis::executor::DiagnosticSink;
use trellis::fixtures::{FixtureDefinition, FixtureKey};
use trellis::models::{
    BeforeAfterHook, DataRow, TestArg, TestAssembly, TestBody, TestCase, TestClass, TestCollection, TestMethod,
};

/// Shared across the whole assembly
pub struct Database {
    queries: AtomicU32,
}

impl Database {
    fn query(&self) -> u32 {
        self.queries.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Per-test class instance
pub struct Calculator {
    offset: i64,
}

fn check(condition: bool, message: &str) -> Result<(), CapturedError> {
    if condition {
        Ok(())
    } else {
        Err(CapturedError::assertion(message))
    }
}

/// Build the sample assembly and its cases in discovery order
pub fn build() -> (Arc<TestAssembly>, Vec<Arc<TestCase>>) {
    let database = FixtureDefinition::builder::<Database>()
        .constructor(vec![FixtureKey::of::<DiagnosticSink>()], |deps| {
            deps.get::<DiagnosticSink>()?.send("database fixture created");
            Ok(Database {
                queries: AtomicU32::new(0),
            })
        })
        .dispose_with(|db| {
            tracing::debug!("Database fixture served {} queries", db.queries.load(Ordering::SeqCst));
            Ok(())
        })
        .build();

    let assembly = Arc::new(TestAssembly::new("sample").with_fixture(database));

    let math = Arc::new(TestCollection::new(&assembly, "Math"));
    let storage = Arc::new(TestCollection::new(&assembly, "Storage").sequential());

    let calculator = Arc::new(
        TestClass::new(&math, "CalculatorTests")
            .with_constructor(FixtureDefinition::new(|| Ok(Calculator { offset: 0 })))
            .with_hook(
                BeforeAfterHook::new("log")
                    .before(|ctx| {
                        ctx.write_line("before");
                        Ok(())
                    })
                    .after(|ctx| {
                        ctx.write_line("after");
                        Ok(())
                    }),
            ),
    );

    let adds = Arc::new(TestMethod::new(
        &calculator,
        "adds",
        TestBody::sync(|ctx, _| {
            let calc = ctx
                .instance::<Calculator>()
                .ok_or_else(|| CapturedError::assertion("missing calculator"))?;
            ctx.write_line("2 + 2");
            check(calc.offset + 2 + 2 == 4, "2 + 2 should be 4")
        }),
    ));

    let divides = Arc::new(
        TestMethod::new(
            &calculator,
            "divides",
            TestBody::sync(|_, args| {
                let x = args.get::<i64>(0).copied().unwrap_or_default();
                let y = args.get::<i64>(1).copied().unwrap_or_default();
                let expected = args.get::<i64>(2).copied().unwrap_or_default();
                check(y != 0 && x / y == expected, "division mismatch")
            }),
        )
        .with_parameters(["x", "y", "expected"]),
    );

    let slow = Arc::new(TestMethod::new(
        &calculator,
        "slow",
        TestBody::awaitable(|ctx: trellis::executor::TestContext, _| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                _ = ctx.cancellation_token().cancelled() => {}
            }
            Ok::<(), CapturedError>(())
        }),
    ));

    let repository = Arc::new(TestClass::new(&storage, "RepositoryTests"));
    let queries = Arc::new(TestMethod::new(
        &repository,
        "queries",
        TestBody::awaitable(|ctx: trellis::executor::TestContext, _| async move {
            let db = ctx
                .fixture::<Database>()
                .await?
                .ok_or_else(|| CapturedError::assertion("database fixture missing"))?;
            ctx.write_line(format!("query #{}", db.query()));
            Ok::<(), CapturedError>(())
        }),
    ));
    let flaky = Arc::new(TestMethod::new(
        &repository,
        "flaky",
        TestBody::sync(|_, _| Err(CapturedError::skip("backend unavailable"))),
    ));
    let manual = Arc::new(TestMethod::new(&repository, "manual", TestBody::sync(|_, _| Ok(()))));

    let row = |x: i64, y: i64, expected: i64| DataRow::new(vec![TestArg::new(x), TestArg::new(y), TestArg::new(expected)]);

    let cases = vec![
        Arc::new(TestCase::new(&adds)),
        Arc::new(TestCase::new(&divides).with_data(move || {
            Ok(vec![
                row(10, 2, 5),
                row(9, 3, 3),
                row(1, 0, 0).skip("division by zero"),
                row(7, 2, 4),
            ])
        })),
        Arc::new(TestCase::new(&slow).timeout(Duration::from_millis(50))),
        Arc::new(TestCase::new(&queries)),
        Arc::new(TestCase::new(&flaky)),
        Arc::new(TestCase::new(&manual).explicit()),
    ];

    (assembly, cases)
}
