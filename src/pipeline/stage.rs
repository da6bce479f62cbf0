use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::BoundedQueue;

/// Bounded-concurrency executor over a [`BoundedQueue`].
///
/// A permit is taken before an item is popped, so at most `width` workers
/// exist at any time and nothing is pulled from the queue that cannot be
/// started right away. Worker errors and panics are counted and logged; they
/// never stop the stage or its siblings.
#[derive(Debug)]
pub struct ParallelStage {
    name: &'static str,
    width: usize,
    counters: Arc<StageCounters>,
}

/// Live counters of one [`ParallelStage`].
#[derive(Debug, Default)]
pub struct StageCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    active: AtomicU64,
    peak: AtomicU64,
}

impl StageCounters {
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Workers that gave up with `Err(Cancelled)`.
    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Workers running right now.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of workers that were running at the same time.
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub succeeded: u64,
    pub failed: u64,
    /// Cancellation cut the stage short. A token cancelled after the input
    /// was drained does not count.
    pub cancelled: bool,
}

struct ActiveGuard(Arc<StageCounters>);

impl ActiveGuard {
    fn enter(counters: Arc<StageCounters>) -> Self {
        let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ParallelStage {
    /// A width of zero is treated as one.
    pub fn new(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width: width.max(1),
            counters: Arc::new(StageCounters::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn counters(&self) -> Arc<StageCounters> {
        Arc::clone(&self.counters)
    }

    /// Run `worker` for every item of `input` until the queue is completed and
    /// drained, or `cancel` fires.
    ///
    /// Returns only after every spawned worker has finished. `Err(Cancelled)`
    /// from a worker is neither a success nor a failure.
    pub async fn run<I, F, Fut>(
        &self,
        input: &BoundedQueue<I>,
        cancel: &CancelToken,
        worker: F,
    ) -> StageReport
    where
        I: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.width));
        let mut tasks = JoinSet::new();
        let mut interrupted = false;

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interrupted = !input.is_finished();
                    break;
                }
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let item = match input.pop(cancel).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => {
                    interrupted = !input.is_finished();
                    break;
                }
            };

            let work = worker(item);
            let counters = Arc::clone(&self.counters);
            tasks.spawn(async move {
                let _permit = permit;
                let _active = ActiveGuard::enter(counters);
                work.await
            });

            while let Some(joined) = tasks.try_join_next() {
                self.reap(joined);
            }
        }

        #[cfg(feature = "tracing")]
        {
            if interrupted {
                tracing::event!(
                    tracing::Level::DEBUG,
                    event = "lakeindex.cancelled",
                    stage = self.name,
                    in_flight = tasks.len(),
                    "lakeindex.cancelled"
                );
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.reap(joined);
        }

        let report = StageReport {
            succeeded: self.counters.succeeded(),
            failed: self.counters.failed(),
            cancelled: interrupted || self.counters.cancelled() > 0,
        };

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::DEBUG,
            event = "lakeindex.stage.finished",
            stage = self.name,
            succeeded = report.succeeded,
            failed = report.failed,
            peak = self.counters.peak(),
            "lakeindex.stage.finished"
        );

        report
    }

    fn reap(&self, joined: std::result::Result<Result<()>, JoinError>) {
        match joined {
            Ok(Ok(())) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(err)) if err.is_cancelled() => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(_err)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::DEBUG,
                    event = "lakeindex.stage.item_failed",
                    stage = self.name,
                    error = %_err,
                    "lakeindex.stage.item_failed"
                );
            }
            Err(_join_err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::ERROR,
                    event = "lakeindex.stage.worker_panicked",
                    stage = self.name,
                    error = %_join_err,
                    "lakeindex.stage.worker_panicked"
                );
            }
        }
    }
}
