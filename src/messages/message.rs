//! Lifecycle message types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::ErrorMetadata;
use crate::models::{
    RunSummary, Test, TestAssembly, TestCase, TestClass, TestCollection, TestMethod, Traits,
};

/// Level of the runner hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    Assembly,
    Collection,
    Class,
    Method,
    Case,
    Test,
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LevelKind::Assembly => "assembly",
            LevelKind::Collection => "collection",
            LevelKind::Class => "class",
            LevelKind::Method => "method",
            LevelKind::Case => "case",
            LevelKind::Test => "test",
        };
        f.write_str(name)
    }
}

/// Ids of a unit and all of its ancestors
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UniqueIds {
    pub assembly: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
}

impl UniqueIds {
    pub fn for_assembly(assembly: &TestAssembly) -> Self {
        Self {
            assembly: assembly.unique_id.clone(),
            ..Default::default()
        }
    }

    pub fn for_collection(collection: &TestCollection) -> Self {
        Self {
            collection: Some(collection.unique_id.clone()),
            ..Self::for_assembly(&collection.assembly)
        }
    }

    pub fn for_class(class: &TestClass) -> Self {
        Self {
            class: Some(class.unique_id.clone()),
            ..Self::for_collection(&class.collection)
        }
    }

    pub fn for_method(method: &TestMethod) -> Self {
        Self {
            method: Some(method.unique_id.clone()),
            ..Self::for_class(&method.class)
        }
    }

    pub fn for_case(case: &TestCase) -> Self {
        Self {
            case: Some(case.unique_id.clone()),
            ..Self::for_method(&case.method)
        }
    }

    pub fn for_test(test: &Test) -> Self {
        Self {
            test: Some(test.unique_id.clone()),
            ..Self::for_case(&test.case)
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AssemblyStarting {
    pub ids: UniqueIds,
    pub assembly_name: String,
    pub test_environment: String,
    pub start_time: DateTime<Utc>,
}

/// Starting message for collection, class and method levels
#[derive(Clone, Debug, Serialize)]
pub struct LevelStarting {
    pub ids: UniqueIds,
    pub display_name: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CaseStarting {
    pub ids: UniqueIds,
    pub display_name: String,
    pub explicit: bool,
    pub skip_reason: Option<String>,
    pub traits: Traits,
    pub start_time: DateTime<Utc>,
}

/// Finished message for every level above Test
#[derive(Clone, Debug, Serialize)]
pub struct LevelFinished {
    pub ids: UniqueIds,
    pub summary: RunSummary,
    pub finish_time: DateTime<Utc>,
}

impl LevelFinished {
    pub fn tests_total(&self) -> u32 {
        self.summary.total
    }

    pub fn tests_failed(&self) -> u32 {
        self.summary.failed
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CleanupFailure {
    pub ids: UniqueIds,
    pub error: ErrorMetadata,
}

#[derive(Clone, Debug, Serialize)]
pub struct TestStarting {
    pub ids: UniqueIds,
    pub display_name: String,
    pub explicit: bool,
    pub timeout: Option<Duration>,
    pub traits: BTreeMap<String, Vec<String>>,
    pub start_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TestPassed {
    pub ids: UniqueIds,
    pub execution_time: Duration,
    pub output: String,
    pub finish_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TestFailed {
    pub ids: UniqueIds,
    pub execution_time: Duration,
    pub output: String,
    pub error: ErrorMetadata,
    pub finish_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TestSkipped {
    pub ids: UniqueIds,
    pub reason: String,
    pub finish_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TestNotRun {
    pub ids: UniqueIds,
    pub finish_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TestFinished {
    pub ids: UniqueIds,
    pub execution_time: Duration,
    pub output: String,
    pub finish_time: DateTime<Utc>,
}

/// Live output written by a running test
#[derive(Clone, Debug, Serialize)]
pub struct TestOutput {
    pub ids: UniqueIds,
    pub output: String,
}

/// Marker for per-test class construction and disposal
#[derive(Clone, Debug, Serialize)]
pub struct TestPhase {
    pub ids: UniqueIds,
}

/// Marker around a before/after hook
#[derive(Clone, Debug, Serialize)]
pub struct HookPhase {
    pub ids: UniqueIds,
    pub hook_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DiagnosticMessage {
    pub assembly_id: String,
    pub message: String,
}

/// An engine-level error that could not be attributed to a cleanup failure
#[derive(Clone, Debug, Serialize)]
pub struct ErrorMessage {
    pub assembly_id: Option<String>,
    pub error: ErrorMetadata,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind")]
pub enum Message {
    TestAssemblyStarting(AssemblyStarting),
    TestAssemblyFinished(LevelFinished),
    TestAssemblyCleanupFailure(CleanupFailure),

    TestCollectionStarting(LevelStarting),
    TestCollectionFinished(LevelFinished),
    TestCollectionCleanupFailure(CleanupFailure),

    TestClassStarting(LevelStarting),
    TestClassFinished(LevelFinished),
    TestClassCleanupFailure(CleanupFailure),

    TestMethodStarting(LevelStarting),
    TestMethodFinished(LevelFinished),
    TestMethodCleanupFailure(CleanupFailure),

    TestCaseStarting(CaseStarting),
    TestCaseFinished(LevelFinished),
    TestCaseCleanupFailure(CleanupFailure),

    TestStarting(TestStarting),
    TestPassed(TestPassed),
    TestFailed(TestFailed),
    TestSkipped(TestSkipped),
    TestNotRun(TestNotRun),
    TestFinished(TestFinished),
    TestCleanupFailure(CleanupFailure),
    TestOutput(TestOutput),

    TestClassConstructionStarting(TestPhase),
    TestClassConstructionFinished(TestPhase),
    TestClassDisposeStarting(TestPhase),
    TestClassDisposeFinished(TestPhase),

    BeforeTestStarting(HookPhase),
    BeforeTestFinished(HookPhase),
    AfterTestStarting(HookPhase),
    AfterTestFinished(HookPhase),

    Diagnostic(DiagnosticMessage),
    Error(ErrorMessage),
}

impl Message {
    /// Variant name, e.g. `"TestCaseStarting"`
    pub fn name(&self) -> &'static str {
        match self {
            Message::TestAssemblyStarting(_) => "TestAssemblyStarting",
            Message::TestAssemblyFinished(_) => "TestAssemblyFinished",
            Message::TestAssemblyCleanupFailure(_) => "TestAssemblyCleanupFailure",
            Message::TestCollectionStarting(_) => "TestCollectionStarting",
            Message::TestCollectionFinished(_) => "TestCollectionFinished",
            Message::TestCollectionCleanupFailure(_) => "TestCollectionCleanupFailure",
            Message::TestClassStarting(_) => "TestClassStarting",
            Message::TestClassFinished(_) => "TestClassFinished",
            Message::TestClassCleanupFailure(_) => "TestClassCleanupFailure",
            Message::TestMethodStarting(_) => "TestMethodStarting",
            Message::TestMethodFinished(_) => "TestMethodFinished",
            Message::TestMethodCleanupFailure(_) => "TestMethodCleanupFailure",
            Message::TestCaseStarting(_) => "TestCaseStarting",
            Message::TestCaseFinished(_) => "TestCaseFinished",
            Message::TestCaseCleanupFailure(_) => "TestCaseCleanupFailure",
            Message::TestStarting(_) => "TestStarting",
            Message::TestPassed(_) => "TestPassed",
            Message::TestFailed(_) => "TestFailed",
            Message::TestSkipped(_) => "TestSkipped",
            Message::TestNotRun(_) => "TestNotRun",
            Message::TestFinished(_) => "TestFinished",
            Message::TestCleanupFailure(_) => "TestCleanupFailure",
            Message::TestOutput(_) => "TestOutput",
            Message::TestClassConstructionStarting(_) => "TestClassConstructionStarting",
            Message::TestClassConstructionFinished(_) => "TestClassConstructionFinished",
            Message::TestClassDisposeStarting(_) => "TestClassDisposeStarting",
            Message::TestClassDisposeFinished(_) => "TestClassDisposeFinished",
            Message::BeforeTestStarting(_) => "BeforeTestStarting",
            Message::BeforeTestFinished(_) => "BeforeTestFinished",
            Message::AfterTestStarting(_) => "AfterTestStarting",
            Message::AfterTestFinished(_) => "AfterTestFinished",
            Message::Diagnostic(_) => "Diagnostic",
            Message::Error(_) => "Error",
        }
    }

    pub fn ids(&self) -> Option<&UniqueIds> {
        match self {
            Message::TestAssemblyStarting(m) => Some(&m.ids),
            Message::TestCollectionStarting(m)
            | Message::TestClassStarting(m)
            | Message::TestMethodStarting(m) => Some(&m.ids),
            Message::TestCaseStarting(m) => Some(&m.ids),
            Message::TestAssemblyFinished(m)
            | Message::TestCollectionFinished(m)
            | Message::TestClassFinished(m)
            | Message::TestMethodFinished(m)
            | Message::TestCaseFinished(m) => Some(&m.ids),
            Message::TestAssemblyCleanupFailure(m)
            | Message::TestCollectionCleanupFailure(m)
            | Message::TestClassCleanupFailure(m)
            | Message::TestMethodCleanupFailure(m)
            | Message::TestCaseCleanupFailure(m)
            | Message::TestCleanupFailure(m) => Some(&m.ids),
            Message::TestStarting(m) => Some(&m.ids),
            Message::TestPassed(m) => Some(&m.ids),
            Message::TestFailed(m) => Some(&m.ids),
            Message::TestSkipped(m) => Some(&m.ids),
            Message::TestNotRun(m) => Some(&m.ids),
            Message::TestFinished(m) => Some(&m.ids),
            Message::TestOutput(m) => Some(&m.ids),
            Message::TestClassConstructionStarting(m)
            | Message::TestClassConstructionFinished(m)
            | Message::TestClassDisposeStarting(m)
            | Message::TestClassDisposeFinished(m) => Some(&m.ids),
            Message::BeforeTestStarting(m)
            | Message::BeforeTestFinished(m)
            | Message::AfterTestStarting(m)
            | Message::AfterTestFinished(m) => Some(&m.ids),
            Message::Diagnostic(_) | Message::Error(_) => None,
        }
    }

    /// Rolled-up summary carried by a level's Finished message
    pub fn finished_summary(&self) -> Option<&RunSummary> {
        match self {
            Message::TestAssemblyFinished(m)
            | Message::TestCollectionFinished(m)
            | Message::TestClassFinished(m)
            | Message::TestMethodFinished(m)
            | Message::TestCaseFinished(m) => Some(&m.summary),
            _ => None,
        }
    }

    /// Flattened error carried by failure messages
    pub fn error(&self) -> Option<&ErrorMetadata> {
        match self {
            Message::TestFailed(m) => Some(&m.error),
            Message::TestAssemblyCleanupFailure(m)
            | Message::TestCollectionCleanupFailure(m)
            | Message::TestClassCleanupFailure(m)
            | Message::TestMethodCleanupFailure(m)
            | Message::TestCaseCleanupFailure(m)
            | Message::TestCleanupFailure(m) => Some(&m.error),
            Message::Error(m) => Some(&m.error),
            _ => None,
        }
    }

    /// Display name carried by Starting messages
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Message::TestAssemblyStarting(m) => Some(&m.assembly_name),
            Message::TestCollectionStarting(m)
            | Message::TestClassStarting(m)
            | Message::TestMethodStarting(m) => Some(&m.display_name),
            Message::TestCaseStarting(m) => Some(&m.display_name),
            Message::TestStarting(m) => Some(&m.display_name),
            _ => None,
        }
    }

    /// Unique id of the unit this message is about (deepest id present)
    pub fn subject_id(&self) -> Option<&str> {
        let ids = self.ids()?;
        ids.test
            .as_deref()
            .or(ids.case.as_deref())
            .or(ids.method.as_deref())
            .or(ids.class.as_deref())
            .or(ids.collection.as_deref())
            .or(Some(ids.assembly.as_str()))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.display_name() {
            Some(name) => write!(f, "{} [{}]", self.name(), name),
            None => f.write_str(self.name()),
        }
    }
}
