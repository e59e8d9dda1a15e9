//! Error model
//!
//! Engine-originated failures are typed (`EngineError`); everything that ends up in
//! a report is normalized into a `CapturedError`, which keeps the nested/aggregated
//! cause tree needed by `ErrorMetadata`.

mod aggregator;
mod metadata;

pub use aggregator::ExceptionAggregator;
pub use metadata::ErrorMetadata;

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Message prefix that turns a failure into a dynamic skip
pub const DYNAMIC_SKIP_TOKEN: &str = "$DynamicSkip$";

const AGGREGATE_TYPE: &str = "trellis::AggregateError";
const ASSERTION_TYPE: &str = "trellis::AssertionFailure";
const PANIC_TYPE: &str = "trellis::Panic";
const SOURCE_TYPE: &str = "trellis::ErrorSource";

/// Failures raised by the engine itself
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("The test method expected {expected} parameter value(s), but {actual} parameter value(s) were provided.")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("Tests marked with a timeout are only supported for async tests ('{method}' is not awaitable)")]
    TimeoutRequiresAsync { method: String },

    #[error("Test execution timed out after {} milliseconds", .0.as_millis())]
    Timeout(Duration),

    #[error("{category} fixture type '{type_name}' may only define a single public constructor.")]
    MultipleConstructors { category: String, type_name: String },

    #[error("{category} fixture type '{type_name}' had one or more unresolved constructor arguments: {missing}")]
    UnresolvedDependencies {
        category: String,
        type_name: String,
        missing: String,
    },

    #[error("{category} fixture type '{type_name}' has a circular dependency: {chain}")]
    DependencyCycle {
        category: String,
        type_name: String,
        chain: String,
    },

    #[error("{category} fixture type '{type_name}' threw in {phase}")]
    FixtureLifecycle {
        category: String,
        type_name: String,
        phase: FixturePhase,
    },

    #[error("{category} fixture manager has already been disposed")]
    FixtureManagerDisposed { category: String },

    #[error("Test collection '{collection}' task failed: {reason}")]
    CollectionTask { collection: String, reason: String },

    #[error("Test data enumeration for '{case}' failed")]
    DataEnumeration { case: String },

    #[error("Test data for '{case}' has more rows than a test index can address; rows from {first_skipped} on were not run")]
    TooManyRows { case: String, first_skipped: usize },
}

impl EngineError {
    /// Stable type name reported for this failure
    pub fn type_name(&self) -> &'static str {
        match self {
            EngineError::ArgumentCount { .. } => "trellis::ArgumentCountError",
            EngineError::TimeoutRequiresAsync { .. } => "trellis::UnsupportedTestShape",
            EngineError::Timeout(_) => "trellis::TestTimeoutError",
            EngineError::MultipleConstructors { .. }
            | EngineError::UnresolvedDependencies { .. }
            | EngineError::DependencyCycle { .. } => "trellis::TestClassError",
            EngineError::FixtureLifecycle { phase, .. } => match phase {
                FixturePhase::Dispose | FixturePhase::DisposeAsync => {
                    "trellis::FixtureCleanupError"
                }
                _ => "trellis::TestClassError",
            },
            EngineError::FixtureManagerDisposed { .. } => "trellis::ObjectDisposedError",
            EngineError::CollectionTask { .. } => "trellis::CollectionTaskError",
            EngineError::DataEnumeration { .. } | EngineError::TooManyRows { .. } => {
                "trellis::DataEnumerationError"
            }
        }
    }
}

/// Fixture lifecycle step that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixturePhase {
    Constructor,
    InitializeAsync,
    Dispose,
    DisposeAsync,
}

impl fmt::Display for FixturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixturePhase::Constructor => write!(f, "its constructor"),
            FixturePhase::InitializeAsync => write!(f, "InitializeAsync"),
            FixturePhase::Dispose => write!(f, "Dispose"),
            FixturePhase::DisposeAsync => write!(f, "DisposeAsync"),
        }
    }
}

/// Why a test failed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCause {
    #[default]
    Exception,
    Assertion,
    Timeout,
}

/// A failure captured for reporting
///
/// Aggregate errors are transparent when flattened: each of their inner errors is
/// reported at the aggregate's position in the tree.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedError {
    type_name: String,
    message: String,
    stack_trace: Option<String>,
    inner: Vec<CapturedError>,
    aggregate: bool,
    cause: FailureCause,
}

impl CapturedError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            stack_trace: None,
            inner: Vec::new(),
            aggregate: false,
            cause: FailureCause::Exception,
        }
    }

    /// Assertion failure raised by a test body
    pub fn assertion(message: impl Into<String>) -> Self {
        let mut error = Self::new(ASSERTION_TYPE, message).with_captured_backtrace();
        error.cause = FailureCause::Assertion;
        error
    }

    /// Request a dynamic skip from inside a running test
    pub fn skip(reason: impl AsRef<str>) -> Self {
        Self::new(
            "trellis::SkipRequested",
            format!("{DYNAMIC_SKIP_TOKEN}{}", reason.as_ref()),
        )
    }

    /// Combine several errors; a single error is returned unchanged
    pub fn aggregate(mut errors: Vec<CapturedError>) -> Self {
        if errors.len() == 1 {
            return errors.remove(0);
        }

        Self {
            type_name: AGGREGATE_TYPE.to_string(),
            message: "One or more errors occurred.".to_string(),
            stack_trace: None,
            inner: errors,
            aggregate: true,
            cause: FailureCause::Exception,
        }
    }

    /// Convert any error, walking its `source()` chain into nested causes
    pub fn from_std<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let mut root = Self::new(std::any::type_name::<E>(), err.to_string());
        root.inner = source_chain(err.source());
        root
    }

    /// Convert an `anyhow::Error`, keeping its context chain as nested causes
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let mut chain = err.chain();
        let head = chain.next().map(|e| e.to_string()).unwrap_or_default();
        let mut root = Self::new("anyhow::Error", head);
        root.inner = source_chain(err.chain().nth(1));
        root
    }

    /// Convert a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with a non-string payload".to_string()
        };

        Self::new(PANIC_TYPE, message)
    }

    pub fn with_inner(mut self, inner: CapturedError) -> Self {
        self.inner.push(inner);
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Attach a backtrace when `RUST_BACKTRACE` enables capture
    pub fn with_captured_backtrace(mut self) -> Self {
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            self.stack_trace = Some(backtrace.to_string());
        }
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn inner(&self) -> &[CapturedError] {
        &self.inner
    }

    pub fn is_aggregate(&self) -> bool {
        self.aggregate
    }

    pub fn cause(&self) -> FailureCause {
        self.cause
    }

    /// Reason carried by a dynamic skip, if this error requests one
    pub fn dynamic_skip_reason(&self) -> Option<&str> {
        self.message.strip_prefix(DYNAMIC_SKIP_TOKEN)
    }

    /// Flatten into the parallel-array form consumed by reporting
    pub fn metadata(&self) -> ErrorMetadata {
        ErrorMetadata::extract(self)
    }
}

fn source_chain(mut source: Option<&(dyn std::error::Error + 'static)>) -> Vec<CapturedError> {
    // Each source becomes the single inner error of the previous one.
    let mut links = Vec::new();
    while let Some(err) = source {
        links.push(CapturedError::new(SOURCE_TYPE, err.to_string()));
        source = err.source();
    }

    links.into_iter().rev().fold(Vec::new(), |nested, mut link| {
        link.inner = nested;
        vec![link]
    })
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for CapturedError {}

impl From<EngineError> for CapturedError {
    fn from(err: EngineError) -> Self {
        let mut captured = CapturedError::new(err.type_name(), err.to_string());
        if matches!(err, EngineError::Timeout(_)) {
            captured.cause = FailureCause::Timeout;
        }
        captured
    }
}

impl From<anyhow::Error> for CapturedError {
    fn from(err: anyhow::Error) -> Self {
        CapturedError::from_anyhow(&err)
    }
}

impl From<std::io::Error> for CapturedError {
    fn from(err: std::io::Error) -> Self {
        CapturedError::from_std(&err)
    }
}

impl From<&str> for CapturedError {
    fn from(message: &str) -> Self {
        CapturedError::new("trellis::Error", message)
    }
}

impl From<String> for CapturedError {
    fn from(message: String) -> Self {
        CapturedError::new("trellis::Error", message)
    }
}
