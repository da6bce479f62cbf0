use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::metrics::StageMetrics;
use crate::pipeline::cancel::CancelToken;

/// Snapshot handed to a [`ProgressObserver`] on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: &'static str,
    pub elapsed: Duration,
    pub metrics: StageMetrics,
}

/// Receives periodic progress snapshots. Purely observational.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// Background task reporting a stage's running totals at a fixed interval.
///
/// Every tick emits a `lakeindex.progress` event and calls the observer, if
/// any. The ticker reads counters through `snapshot` and never writes anything,
/// so stopping it early or never starting it changes no result.
#[derive(Debug)]
pub struct ProgressTicker {
    stop: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    /// Start ticking every `interval`. `None` or a zero interval starts nothing.
    pub fn start<P>(
        stage: &'static str,
        interval: Option<Duration>,
        observer: Option<Arc<dyn ProgressObserver>>,
        snapshot: P,
    ) -> Self
    where
        P: Fn() -> StageMetrics + Send + 'static,
    {
        let Some(period) = interval.filter(|period| !period.is_zero()) else {
            return Self::disabled();
        };

        let stop = CancelToken::new();
        let stopped = stop.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticks = interval_at(started + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = ticks.tick() => {
                        let progress = Progress {
                            stage,
                            elapsed: started.elapsed(),
                            metrics: snapshot(),
                        };

                        #[cfg(feature = "tracing")]
                        tracing::event!(
                            tracing::Level::INFO,
                            event = "lakeindex.progress",
                            stage = stage,
                            elapsed_ms = progress.elapsed.as_millis() as u64,
                            metrics = %progress.metrics,
                            "lakeindex.progress"
                        );

                        if let Some(observer) = &observer {
                            observer.on_progress(&progress);
                        }
                    }
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn disabled() -> Self {
        Self {
            stop: CancelToken::new(),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop ticking and wait for the task to exit.
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            // a panicking observer only loses progress reports
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
