#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use trellis::config::RunOptions;
use trellis::executor::{AssemblyRunner, RunnerHooks};
use trellis::messages::{CollectingSink, Message, MessageSink};
use trellis::models::{RunSummary, TestAssembly, TestBody, TestCase, TestClass, TestCollection, TestMethod};

/// One collection, one class, ready for methods
pub struct Suite {
    pub assembly: Arc<TestAssembly>,
    pub collection: Arc<TestCollection>,
    pub class: Arc<TestClass>,
}

impl Suite {
    pub fn new() -> Self {
        let assembly = Arc::new(TestAssembly::new("suite"));
        let collection = Arc::new(TestCollection::new(&assembly, "default"));
        let class = Arc::new(TestClass::new(&collection, "Tests"));
        Self {
            assembly,
            collection,
            class,
        }
    }

    pub fn method(&self, name: &str, body: TestBody) -> Arc<TestMethod> {
        Arc::new(TestMethod::new(&self.class, name, body))
    }
}

pub fn passing() -> TestBody {
    TestBody::sync(|_, _| Ok(()))
}

pub fn sync_options() -> RunOptions {
    RunOptions::default().with_sync_reporting(true)
}

pub async fn run(
    runner: AssemblyRunner,
    assembly: &Arc<TestAssembly>,
    cases: Vec<Arc<TestCase>>,
) -> (RunSummary, Arc<CollectingSink>) {
    run_with_sink(runner, assembly, cases, CollectingSink::new()).await
}

pub async fn run_with_sink(
    runner: AssemblyRunner,
    assembly: &Arc<TestAssembly>,
    cases: Vec<Arc<TestCase>>,
    sink: CollectingSink,
) -> (RunSummary, Arc<CollectingSink>) {
    let sink = Arc::new(sink);
    let sinks: Vec<Arc<dyn MessageSink>> = vec![sink.clone()];
    let summary = runner.run(Arc::clone(assembly), cases, sinks).await;
    (summary, sink)
}

/// Names between the first `from` and the first `to` message, inclusive
pub fn window(names: &[&'static str], from: &str, to: &str) -> Vec<&'static str> {
    let start = names.iter().position(|n| *n == from).expect("start marker");
    let end = names.iter().position(|n| *n == to).expect("end marker");
    names[start..=end].to_vec()
}

pub fn finished_summary(sink: &CollectingSink, name: &str) -> RunSummary {
    sink.of_kind(name)
        .first()
        .and_then(Message::finished_summary)
        .copied()
        .expect("finished message")
}

/// Shared ordered log for bodies and fixtures
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Hooks driven by a closure over (level, hook point)
pub struct FnHooks<F>(pub F);

impl<F> RunnerHooks for FnHooks<F>
where
    F: Fn(&str, trellis::messages::LevelKind) -> Result<bool, trellis::error::CapturedError> + Send + Sync,
{
    fn on_starting(&self, scope: &trellis::executor::Scope<'_>) -> Result<bool, trellis::error::CapturedError> {
        (self.0)("starting", scope.level)
    }

    fn on_finished(
        &self,
        scope: &trellis::executor::Scope<'_>,
        _summary: &RunSummary,
    ) -> Result<bool, trellis::error::CapturedError> {
        (self.0)("finished", scope.level)
    }
}
