//! Bound test arguments and data rows

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::CapturedError;

type SyncDispose = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<(), CapturedError> + Send + Sync>;
type AsyncDispose = Arc<
    dyn Fn(Arc<dyn Any + Send + Sync>) -> BoxFuture<'static, Result<(), CapturedError>>
        + Send
        + Sync,
>;

/// How an argument releases its resources once its test completes
#[derive(Clone)]
pub enum ArgDisposal {
    Sync(SyncDispose),
    Async(AsyncDispose),
}

/// One type-erased argument value
#[derive(Clone)]
pub struct TestArg {
    value: Arc<dyn Any + Send + Sync>,
    display: String,
    disposal: Option<ArgDisposal>,
}

impl TestArg {
    /// Wrap a value, rendering it with its `Debug` form
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        let display = format!("{value:?}");
        Self {
            value: Arc::new(value),
            display,
            disposal: None,
        }
    }

    /// Wrap a value with an explicit display rendering
    pub fn with_display<T>(value: T, display: impl Into<String>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            value: Arc::new(value),
            display: display.into(),
            disposal: None,
        }
    }

    /// Attach a synchronous disposal step
    pub fn disposable<T, F>(mut self, dispose: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> Result<(), CapturedError> + Send + Sync + 'static,
    {
        self.disposal = Some(ArgDisposal::Sync(Arc::new(move |value: &(dyn Any + Send + Sync)| {
            match value.downcast_ref::<T>() {
                Some(typed) => dispose(typed),
                None => Ok(()),
            }
        })));
        self
    }

    /// Attach an asynchronous disposal step
    pub fn async_disposable<T, F>(mut self, dispose: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>) -> BoxFuture<'static, Result<(), CapturedError>> + Send + Sync + 'static,
    {
        self.disposal = Some(ArgDisposal::Async(Arc::new(move |value: Arc<dyn Any + Send + Sync>| {
            match value.downcast::<T>() {
                Ok(typed) => dispose(typed),
                Err(_) => future::ready(Ok(())).boxed(),
            }
        })));
        self
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn is_disposable(&self) -> bool {
        self.disposal.is_some()
    }

    /// Release the argument's resources, if it has any
    pub async fn dispose(&self) -> Result<(), CapturedError> {
        match &self.disposal {
            None => Ok(()),
            Some(ArgDisposal::Sync(dispose)) => dispose(self.value.as_ref()),
            Some(ArgDisposal::Async(dispose)) => dispose(Arc::clone(&self.value)).await,
        }
    }
}

impl fmt::Debug for TestArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestArg")
            .field("display", &self.display)
            .field("disposable", &self.disposal.is_some())
            .finish()
    }
}

/// Ordered arguments bound to one test invocation
#[derive(Clone, Debug, Default)]
pub struct TestArgs(Vec<TestArg>);

impl TestArgs {
    pub fn new(args: Vec<TestArg>) -> Self {
        Self(args)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed access to the argument at `index`
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Option<&T> {
        self.0.get(index).and_then(|arg| arg.get::<T>())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestArg> {
        self.0.iter()
    }

    /// Render `base(p1: v1, p2: v2)` for theory display names
    pub fn display_name(&self, base: &str, parameters: &[String]) -> String {
        if self.0.is_empty() && parameters.is_empty() {
            return base.to_string();
        }

        let count = parameters.len().max(self.0.len());
        let rendered: Vec<String> = (0..count)
            .map(|i| {
                let name = parameters.get(i).map(String::as_str).unwrap_or("???");
                let value = self.0.get(i).map(TestArg::display).unwrap_or("???");
                format!("{name}: {value}")
            })
            .collect();

        format!("{base}({})", rendered.join(", "))
    }
}

impl From<Vec<TestArg>> for TestArgs {
    fn from(args: Vec<TestArg>) -> Self {
        Self(args)
    }
}

/// One row produced by a data source
#[derive(Clone, Debug, Default)]
pub struct DataRow {
    pub args: TestArgs,
    pub skip: Option<String>,
    pub display_name: Option<String>,
}

impl DataRow {
    pub fn new(args: Vec<TestArg>) -> Self {
        Self {
            args: TestArgs::new(args),
            skip: None,
            display_name: None,
        }
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}
