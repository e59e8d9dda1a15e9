//! Append-only error collector for one execution scope

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard};

use futures::FutureExt;

use super::CapturedError;

/// Collects the errors raised inside one level's run.
///
/// Cloning produces an independent aggregator seeded with a snapshot of the
/// current errors, so sibling subtrees never see each other's failures.
#[derive(Debug, Default)]
pub struct ExceptionAggregator {
    errors: Mutex<Vec<CapturedError>>,
}

impl ExceptionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CapturedError>> {
        self.errors.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an error
    pub fn add(&self, error: impl Into<CapturedError>) {
        self.lock().push(error.into());
    }

    /// Copy every error held by `other` into this aggregator
    pub fn extend_from(&self, other: &ExceptionAggregator) {
        let incoming = other.snapshot();
        self.lock().extend(incoming);
    }

    pub fn has_errors(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<CapturedError> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// `None` when empty, the error itself when there is one, an aggregate otherwise
    pub fn to_error(&self) -> Option<CapturedError> {
        let errors = self.snapshot();
        if errors.is_empty() {
            None
        } else {
            Some(CapturedError::aggregate(errors))
        }
    }

    /// Drain the collected errors into a single error
    pub fn take(&self) -> Option<CapturedError> {
        let errors = std::mem::take(&mut *self.lock());
        if errors.is_empty() {
            None
        } else {
            Some(CapturedError::aggregate(errors))
        }
    }

    /// Run a fallible step, capturing its error or panic
    pub fn run<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Option<T>
    where
        E: Into<CapturedError>,
    {
        match std::panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                self.add(err);
                None
            }
            Err(payload) => {
                self.add(CapturedError::from_panic(payload));
                None
            }
        }
    }

    /// Async counterpart of [`ExceptionAggregator::run`]
    pub async fn run_async<T, E, F>(&self, fut: F) -> Option<T>
    where
        E: Into<CapturedError>,
        F: Future<Output = Result<T, E>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                self.add(err);
                None
            }
            Err(payload) => {
                self.add(CapturedError::from_panic(payload));
                None
            }
        }
    }
}

impl Clone for ExceptionAggregator {
    fn clone(&self) -> Self {
        Self {
            errors: Mutex::new(self.snapshot()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_error() {
        let aggregator = ExceptionAggregator::new();
        assert!(aggregator.to_error().is_none());
        assert!(!aggregator.has_errors());
    }

    #[test]
    fn test_single_error_returned_as_is() {
        let aggregator = ExceptionAggregator::new();
        let err = CapturedError::new("trellis::Sample", "only one");
        aggregator.add(err.clone());

        assert_eq!(aggregator.to_error(), Some(err));
    }

    #[test]
    fn test_multiple_errors_aggregate_with_one_root_each() {
        let aggregator = ExceptionAggregator::new();
        aggregator.add(CapturedError::new("A", "first"));
        aggregator.add(CapturedError::new("B", "second").with_inner(CapturedError::new("C", "nested")));
        aggregator.add(CapturedError::new("D", "third"));

        let error = aggregator.to_error().unwrap();
        assert!(error.is_aggregate());

        let metadata = error.metadata();
        assert_eq!(metadata.types, vec!["A", "B", "C", "D"]);
        assert_eq!(metadata.parent_indices, vec![-1, -1, 1, -1]);
    }

    #[test]
    fn test_clone_is_independent() {
        let parent = ExceptionAggregator::new();
        parent.add(CapturedError::new("A", "seed"));

        let child = parent.clone();
        child.add(CapturedError::new("B", "child only"));

        assert_eq!(parent.len(), 1);
        assert_eq!(child.len(), 2);
    }

    #[test]
    fn test_run_captures_error_and_panic() {
        let aggregator = ExceptionAggregator::new();

        let ok: Option<u32> = aggregator.run(|| Ok::<_, CapturedError>(7));
        assert_eq!(ok, Some(7));

        let failed: Option<u32> = aggregator.run(|| Err(CapturedError::new("E", "nope")));
        assert!(failed.is_none());

        let panicked: Option<u32> = aggregator.run(|| -> Result<u32, CapturedError> {
            panic!("exploded")
        });
        assert!(panicked.is_none());

        let types: Vec<String> = aggregator
            .snapshot()
            .iter()
            .map(|e| e.message().to_string())
            .collect();
        assert_eq!(types, vec!["nope", "exploded"]);
    }

    #[test]
    fn test_take_drains() {
        let aggregator = ExceptionAggregator::new();
        aggregator.add(CapturedError::new("E", "x"));

        assert!(aggregator.take().is_some());
        assert!(aggregator.is_empty());
    }
}
