//! Test descriptors
//!
//! The assembly/collection/class/method/case tree handed to the engine by
//! discovery, plus the runtime `Test` produced from each case.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::arguments::{DataRow, TestArgs};
use super::unique_id::UniqueIdGenerator;
use crate::error::CapturedError;
use crate::executor::TestContext;
use crate::fixtures::FixtureDefinition;

/// Trait name to values
pub type Traits = BTreeMap<String, Vec<String>>;

pub type TestResult = Result<(), CapturedError>;

type SyncBody = Arc<dyn Fn(&TestContext, &TestArgs) -> TestResult + Send + Sync>;
type AsyncBody = Arc<dyn Fn(TestContext, TestArgs) -> BoxFuture<'static, TestResult> + Send + Sync>;
type DetachedBody = Arc<dyn Fn(TestContext, TestArgs) -> JoinHandle<TestResult> + Send + Sync>;
type HookFn = Arc<dyn Fn(&TestContext) -> TestResult + Send + Sync>;

/// Something with a stable id in the descriptor tree
pub trait Identified {
    fn unique_id(&self) -> &str;
}

/// The executable part of a test method
#[derive(Clone)]
pub enum TestBody {
    /// Runs to completion on the calling task
    Sync(SyncBody),
    /// Returns a future the invoker awaits
    Async(AsyncBody),
    /// Starts its own task and hands back the handle
    Detached(DetachedBody),
}

impl TestBody {
    pub fn sync<F>(body: F) -> Self
    where
        F: Fn(&TestContext, &TestArgs) -> TestResult + Send + Sync + 'static,
    {
        TestBody::Sync(Arc::new(body))
    }

    pub fn awaitable<F, Fut>(body: F) -> Self
    where
        F: Fn(TestContext, TestArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestResult> + Send + 'static,
    {
        TestBody::Async(Arc::new(move |ctx: TestContext, args: TestArgs| body(ctx, args).boxed()))
    }

    pub fn detached<F>(body: F) -> Self
    where
        F: Fn(TestContext, TestArgs) -> JoinHandle<TestResult> + Send + Sync + 'static,
    {
        TestBody::Detached(Arc::new(body))
    }

    /// Only `Async` bodies can be raced against a timeout
    pub fn supports_timeout(&self) -> bool {
        matches!(self, TestBody::Async(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TestBody::Sync(_) => "sync",
            TestBody::Async(_) => "async",
            TestBody::Detached(_) => "detached",
        }
    }
}

impl fmt::Debug for TestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestBody::{}", self.kind())
    }
}

/// Named code run around every test of a method
#[derive(Clone)]
pub struct BeforeAfterHook {
    pub name: String,
    before: Option<HookFn>,
    after: Option<HookFn>,
}

impl BeforeAfterHook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: None,
            after: None,
        }
    }

    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&TestContext) -> TestResult + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&TestContext) -> TestResult + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }

    pub(crate) fn run_before(&self, ctx: &TestContext) -> TestResult {
        match &self.before {
            Some(f) => f(ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn run_after(&self, ctx: &TestContext) -> TestResult {
        match &self.after {
            Some(f) => f(ctx),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for BeforeAfterHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeforeAfterHook")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TestAssembly {
    pub unique_id: String,
    pub name: String,
    pub fixtures: Vec<FixtureDefinition>,
}

impl TestAssembly {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            unique_id: UniqueIdGenerator::for_assembly(&name),
            name,
            fixtures: Vec::new(),
        }
    }

    pub fn with_fixture(mut self, fixture: FixtureDefinition) -> Self {
        self.fixtures.push(fixture);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TestCollection {
    pub unique_id: String,
    pub display_name: String,
    pub assembly: Arc<TestAssembly>,
    pub fixtures: Vec<FixtureDefinition>,
    /// Run after the parallel collections, one at a time
    pub disable_parallelization: bool,
}

impl TestCollection {
    pub fn new(assembly: &Arc<TestAssembly>, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        Self {
            unique_id: UniqueIdGenerator::for_collection(&assembly.unique_id, &display_name),
            display_name,
            assembly: Arc::clone(assembly),
            fixtures: Vec::new(),
            disable_parallelization: false,
        }
    }

    pub fn with_fixture(mut self, fixture: FixtureDefinition) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn sequential(mut self) -> Self {
        self.disable_parallelization = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TestClass {
    pub unique_id: String,
    pub name: String,
    pub collection: Arc<TestCollection>,
    pub fixtures: Vec<FixtureDefinition>,
    /// Builds a fresh instance for every test
    pub constructor: Option<FixtureDefinition>,
    pub hooks: Vec<BeforeAfterHook>,
}

impl TestClass {
    pub fn new(collection: &Arc<TestCollection>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            unique_id: UniqueIdGenerator::for_class(&collection.unique_id, &name),
            name,
            collection: Arc::clone(collection),
            fixtures: Vec::new(),
            constructor: None,
            hooks: Vec::new(),
        }
    }

    pub fn with_fixture(mut self, fixture: FixtureDefinition) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn with_constructor(mut self, constructor: FixtureDefinition) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn with_hook(mut self, hook: BeforeAfterHook) -> Self {
        self.hooks.push(hook);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TestMethod {
    pub unique_id: String,
    pub name: String,
    pub class: Arc<TestClass>,
    pub parameters: Vec<String>,
    pub body: TestBody,
    pub hooks: Vec<BeforeAfterHook>,
}

impl TestMethod {
    pub fn new(class: &Arc<TestClass>, name: impl Into<String>, body: TestBody) -> Self {
        let name = name.into();
        Self {
            unique_id: UniqueIdGenerator::for_method(&class.unique_id, &name),
            name,
            class: Arc::clone(class),
            parameters: Vec::new(),
            body,
            hooks: Vec::new(),
        }
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_hook(mut self, hook: BeforeAfterHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// `Class.method`, the default case display name
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class.name, self.name)
    }
}

/// Row iterator produced by a data source
pub type RowIter = Box<dyn Iterator<Item = Result<DataRow, CapturedError>> + Send>;
/// Produces a fresh row iterator each time it is called
pub type RowSource = Arc<dyn Fn() -> RowIter + Send + Sync>;

/// Where a case gets its arguments from
#[derive(Clone)]
pub enum TestData {
    /// One test with pre-bound arguments
    Fixed(TestArgs),
    /// One test per row, enumerated at run time
    Rows(RowSource),
}

impl fmt::Debug for TestData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestData::Fixed(args) => f.debug_tuple("Fixed").field(args).finish(),
            TestData::Rows(_) => f.write_str("Rows(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub unique_id: String,
    pub display_name: String,
    pub method: Arc<TestMethod>,
    pub data: TestData,
    pub skip_reason: Option<String>,
    pub explicit: bool,
    pub timeout: Option<Duration>,
    pub traits: Traits,
}

impl TestCase {
    pub fn new(method: &Arc<TestMethod>) -> Self {
        let display_name = method.qualified_name();
        Self {
            unique_id: UniqueIdGenerator::for_case(&method.unique_id, &display_name),
            display_name,
            method: Arc::clone(method),
            data: TestData::Fixed(TestArgs::empty()),
            skip_reason: None,
            explicit: false,
            timeout: None,
            traits: Traits::new(),
        }
    }

    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self.refresh_id();
        self
    }

    /// Bind fixed arguments; the display name picks them up
    pub fn with_args(mut self, args: impl Into<TestArgs>) -> Self {
        let args = args.into();
        self.display_name = args.display_name(&self.method.qualified_name(), &self.method.parameters);
        self.data = TestData::Fixed(args);
        self.refresh_id();
        self
    }

    /// Data-driven case backed by a fallible, materialized row list
    pub fn with_data<F>(self, source: F) -> Self
    where
        F: Fn() -> Result<Vec<DataRow>, CapturedError> + Send + Sync + 'static,
    {
        self.with_row_source(move || -> RowIter {
            match source() {
                Ok(rows) => Box::new(rows.into_iter().map(Ok)),
                Err(err) => Box::new(std::iter::once(Err(err))),
            }
        })
    }

    /// Data-driven case backed by a lazily failing row iterator
    pub fn with_row_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> RowIter + Send + Sync + 'static,
    {
        self.data = TestData::Rows(Arc::new(source));
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    pub fn explicit(mut self) -> Self {
        self.explicit = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_trait(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.traits.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = unique_id.into();
        self
    }

    fn refresh_id(&mut self) {
        self.unique_id = UniqueIdGenerator::for_case(&self.method.unique_id, &self.display_name);
    }

    pub fn is_theory(&self) -> bool {
        matches!(self.data, TestData::Rows(_))
    }

    pub fn collection(&self) -> &Arc<TestCollection> {
        &self.method.class.collection
    }

    pub fn class(&self) -> &Arc<TestClass> {
        &self.method.class
    }
}

/// A single runnable instance of a case
#[derive(Debug, Clone)]
pub struct Test {
    pub case: Arc<TestCase>,
    pub unique_id: String,
    pub display_name: String,
    /// Position within the case; -1 for a synthetic test standing in for the whole case
    pub index: i32,
    pub args: TestArgs,
    pub skip_reason: Option<String>,
}

impl Test {
    pub fn new(case: &Arc<TestCase>, index: i32, display_name: impl Into<String>, args: TestArgs) -> Self {
        Self {
            unique_id: UniqueIdGenerator::for_test(&case.unique_id, index),
            case: Arc::clone(case),
            display_name: display_name.into(),
            index,
            args,
            skip_reason: case.skip_reason.clone(),
        }
    }

    pub fn with_skip(mut self, reason: Option<String>) -> Self {
        if reason.is_some() {
            self.skip_reason = reason;
        }
        self
    }

    pub fn method(&self) -> &TestMethod {
        &self.case.method
    }
}

macro_rules! impl_identified {
    ($($ty:ty),*) => {
        $(impl Identified for $ty {
            fn unique_id(&self) -> &str {
                &self.unique_id
            }
        })*
    };
}

impl_identified!(TestAssembly, TestCollection, TestClass, TestMethod, TestCase, Test);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestArg;

    fn method() -> Arc<TestMethod> {
        let assembly = Arc::new(TestAssembly::new("suite"));
        let collection = Arc::new(TestCollection::new(&assembly, "default"));
        let class = Arc::new(TestClass::new(&collection, "MathTests"));
        Arc::new(
            TestMethod::new(&class, "adds", TestBody::sync(|_, _| Ok(()))).with_parameters(["x", "y"]),
        )
    }

    #[test]
    fn test_case_defaults() {
        let case = TestCase::new(&method());
        assert_eq!(case.display_name, "MathTests.adds");
        assert!(!case.is_theory());
        assert!(!case.explicit);
        assert_eq!(case.collection().display_name, "default");
    }

    #[test]
    fn test_fixed_args_change_identity() {
        let method = method();
        let a = TestCase::new(&method).with_args(vec![TestArg::new(1), TestArg::new(2)]);
        let b = TestCase::new(&method).with_args(vec![TestArg::new(3), TestArg::new(4)]);

        assert_eq!(a.display_name, "MathTests.adds(x: 1, y: 2)");
        assert_ne!(a.unique_id, b.unique_id);
    }

    #[test]
    fn test_traits_accumulate() {
        let case = TestCase::new(&method())
            .with_trait("Category", "Fast")
            .with_trait("Category", "Math");
        assert_eq!(case.traits["Category"], vec!["Fast", "Math"]);
    }

    #[test]
    fn test_only_async_body_supports_timeout() {
        assert!(!TestBody::sync(|_, _| Ok(())).supports_timeout());
        assert!(TestBody::awaitable(|_, _| async { Ok(()) }).supports_timeout());
    }

    #[test]
    fn test_test_inherits_case_skip() {
        let case = Arc::new(TestCase::new(&method()).skip("flaky"));
        let test = Test::new(&case, 0, "t", TestArgs::empty());
        assert_eq!(test.skip_reason.as_deref(), Some("flaky"));

        let row_skip = Test::new(&case, 1, "t", TestArgs::empty()).with_skip(Some("row".into()));
        assert_eq!(row_skip.skip_reason.as_deref(), Some("row"));
    }
}
