//! Parallel collection scheduling
//!
//! Collections are the unit of parallelism. The conservative algorithm holds
//! a thread permit for a collection's whole run. The aggressive one only
//! holds it while the collection's future is being polled, so a collection
//! waiting on I/O lets another one make progress.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use super::context::CancellationSignal;
use crate::config::{ParallelAlgorithm, RunOptions};
use crate::error::{CapturedError, EngineError};
use crate::models::RunSummary;

/// How collections share threads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulingMode {
    Sequential,
    Unlimited,
    Conservative(usize),
    Aggressive(usize),
}

impl SchedulingMode {
    pub fn from_options(options: &RunOptions) -> Self {
        if options.disable_parallelization {
            return SchedulingMode::Sequential;
        }
        match options.effective_max_threads() {
            None => SchedulingMode::Unlimited,
            Some(threads) => {
                let threads = threads.max(1);
                match options.parallel_algorithm {
                    ParallelAlgorithm::Conservative => SchedulingMode::Conservative(threads),
                    ParallelAlgorithm::Aggressive => SchedulingMode::Aggressive(threads),
                }
            }
        }
    }
}

/// A collection run waiting to be scheduled
pub(crate) struct CollectionJob {
    pub(crate) name: String,
    pub(crate) future: BoxFuture<'static, RunSummary>,
}

impl CollectionJob {
    pub(crate) fn new(name: impl Into<String>, future: impl Future<Output = RunSummary> + Send + 'static) -> Self {
        Self {
            name: name.into(),
            future: future.boxed(),
        }
    }
}

/// Result of scheduling a batch of collections
#[derive(Debug, Default)]
pub(crate) struct ScheduleOutcome {
    pub(crate) summary: RunSummary,
    pub(crate) errors: Vec<CapturedError>,
}

pub(crate) struct CollectionScheduler {
    mode: SchedulingMode,
    cancellation: CancellationSignal,
}

impl CollectionScheduler {
    pub(crate) fn new(mode: SchedulingMode, cancellation: CancellationSignal) -> Self {
        Self { mode, cancellation }
    }

    pub(crate) fn mode(&self) -> SchedulingMode {
        self.mode
    }

    /// Run every job and combine their summaries.
    ///
    /// Parallel jobs are all dispatched up front, so each one still runs its
    /// collection lifecycle after a cancellation. Sequential jobs not yet
    /// begun are dropped.
    pub(crate) async fn run(&self, jobs: Vec<CollectionJob>) -> ScheduleOutcome {
        info!("Scheduling {} collection(s) ({:?})", jobs.len(), self.mode);

        if self.mode == SchedulingMode::Sequential {
            let mut outcome = ScheduleOutcome::default();
            for job in jobs {
                if self.cancellation.is_cancelled() {
                    break;
                }
                debug!("Running collection {}", job.name);
                outcome.summary += job.future.await;
            }
            return outcome;
        }

        let semaphore = match self.mode {
            SchedulingMode::Conservative(n) | SchedulingMode::Aggressive(n) => Some(Arc::new(Semaphore::new(n))),
            _ => None,
        };

        let mut names = Vec::with_capacity(jobs.len());
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            debug!("Dispatching collection {}", job.name);
            let future = job.future;
            let handle = match (self.mode, &semaphore) {
                (SchedulingMode::Conservative(_), Some(semaphore)) => {
                    let semaphore = Arc::clone(semaphore);
                    tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await;
                        future.await
                    })
                }
                (SchedulingMode::Aggressive(_), Some(semaphore)) => {
                    tokio::spawn(MaxConcurrency::new(future, Arc::clone(semaphore)))
                }
                _ => tokio::spawn(future),
            };

            names.push(job.name);
            handles.push(handle);
        }

        let mut outcome = ScheduleOutcome::default();
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(summary) => outcome.summary += summary,
                Err(e) => {
                    warn!("Collection {} did not complete: {}", name, e);
                    outcome.errors.push(
                        EngineError::CollectionTask {
                            collection: name,
                            reason: e.to_string(),
                        }
                        .into(),
                    );
                }
            }
        }
        outcome
    }
}

/// Future that holds a semaphore permit only while its inner future is polled
struct MaxConcurrency<F> {
    inner: F,
    semaphore: Arc<Semaphore>,
    acquire: Option<BoxFuture<'static, Result<OwnedSemaphorePermit, AcquireError>>>,
}

impl<F> MaxConcurrency<F> {
    fn new(inner: F, semaphore: Arc<Semaphore>) -> Self {
        Self {
            inner,
            semaphore,
            acquire: None,
        }
    }
}

impl<F> Future for MaxConcurrency<F>
where
    F: Future + Unpin,
{
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let semaphore = &this.semaphore;
        let acquire = this
            .acquire
            .get_or_insert_with(|| Arc::clone(semaphore).acquire_owned().boxed());

        let permit = match acquire.poll_unpin(cx) {
            Poll::Ready(permit) => permit,
            Poll::Pending => return Poll::Pending,
        };
        this.acquire = None;

        // A closed semaphore only happens at shutdown; run ungated.
        let result = this.inner.poll_unpin(cx);
        drop(permit);
        result
    }
}
