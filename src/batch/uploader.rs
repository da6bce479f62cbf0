use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::batch::accumulator::{Admission, Batch, BatchAccumulator};
use crate::batch::size::Measured;
use crate::metrics::{StageMetrics, UploadCounters, UploadMetrics};
use crate::model::IndexDocument;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::progress::{ProgressObserver, ProgressTicker};
use crate::pipeline::queue::BoundedQueue;
use crate::store::{SearchUploader, UploadMode};

pub const UPLOAD_STAGE: &str = "upload";

/// Batch upload stage.
///
/// A single task drains the document queue into a [`BatchAccumulator`].
/// Every emitted batch takes an upload permit and is sent on its own task,
/// so at most `upload_concurrency` calls are in flight while the next batch
/// is being filled. Once all permits are taken, accumulation waits, which
/// propagates backpressure to the read stage.
pub struct BatchingUploader<U: ?Sized> {
    uploader: Arc<U>,
    upload_concurrency: usize,
    batch_size: usize,
    max_batch_bytes: u64,
    max_document_bytes: Option<u64>,
    mode: UploadMode,
    progress_interval: Option<Duration>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

/// Counts the whole batch as failed unless disarmed, so a call that errors
/// or panics is never credited.
struct BatchFailureGuard {
    counters: Arc<UploadCounters>,
    documents: u64,
    armed: bool,
}

impl Drop for BatchFailureGuard {
    fn drop(&mut self) {
        if self.armed {
            self.counters.record_batch_failed(self.documents);
        }
    }
}

impl<U: ?Sized> BatchingUploader<U> {
    pub fn new(
        uploader: Arc<U>,
        upload_concurrency: usize,
        batch_size: usize,
        max_batch_bytes: u64,
    ) -> Self {
        Self {
            uploader,
            upload_concurrency: upload_concurrency.max(1),
            batch_size,
            max_batch_bytes,
            max_document_bytes: None,
            mode: UploadMode::Upload,
            progress_interval: None,
            observer: None,
        }
    }

    /// Per-document ceiling; the batch ceiling when unset.
    pub fn max_document_bytes(mut self, bytes: u64) -> Self {
        self.max_document_bytes = Some(bytes);
        self
    }

    pub fn mode(mut self, mode: UploadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn progress_interval(mut self, interval: Option<Duration>) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn observer(mut self, observer: Option<Arc<dyn ProgressObserver>>) -> Self {
        self.observer = observer;
        self
    }

    /// Upload every document of `input`.
    ///
    /// Returns after `input` is completed and drained, the last partial batch
    /// has been sent and every upload call has returned. On cancellation the
    /// partial batch is dropped and in-flight calls are awaited.
    ///
    /// `cancelled` is set on the result only if cancellation cut the stage
    /// short.
    pub async fn run<D>(&self, input: &BoundedQueue<Measured<D>>, cancel: &CancelToken) -> UploadMetrics
    where
        D: IndexDocument,
        U: SearchUploader<D> + 'static,
    {
        let _close_input = input.complete_on_drop();

        let counters = Arc::new(UploadCounters::default());
        let ticker = {
            let counters = Arc::clone(&counters);
            ProgressTicker::start(
                UPLOAD_STAGE,
                self.progress_interval,
                self.observer.clone(),
                move || StageMetrics::Upload(counters.snapshot()),
            )
        };

        let permits = Arc::new(Semaphore::new(self.upload_concurrency));
        let mut uploads = JoinSet::new();
        let mut accumulator = BatchAccumulator::new(self.batch_size, self.max_batch_bytes);
        if let Some(bytes) = self.max_document_bytes {
            accumulator = accumulator.with_max_document_bytes(bytes);
        }

        loop {
            let measured = match input.pop(cancel).await {
                Ok(Some(measured)) => measured,
                Ok(None) => break,
                Err(_) => {
                    if !input.is_finished() {
                        counters.record_interrupted();
                    }
                    break;
                }
            };

            match accumulator.consider_add_measured(measured) {
                Admission::Oversize { document: _document, size: _size } => {
                    counters.record_oversize();
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::WARN,
                        event = "lakeindex.upload.oversize",
                        key = _document.key(),
                        size = _size,
                        max_document_bytes = accumulator.max_document_bytes(),
                        "lakeindex.upload.oversize"
                    );
                }
                Admission::Accepted { flushed } => {
                    if let Some(batch) = flushed {
                        self.dispatch(batch, &permits, &mut uploads, &counters, cancel).await;
                    }
                }
            }

            if let Some(batch) = accumulator.flush(false) {
                self.dispatch(batch, &permits, &mut uploads, &counters, cancel).await;
            }

            while let Some(joined) = uploads.try_join_next() {
                log_join_error(joined);
            }
        }

        if let Some(batch) = accumulator.flush(true) {
            self.dispatch(batch, &permits, &mut uploads, &counters, cancel).await;
        }

        while let Some(joined) = uploads.join_next().await {
            log_join_error(joined);
        }

        ticker.stop().await;

        let metrics = counters.snapshot();

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::INFO,
            event = "lakeindex.upload.completed",
            processed = metrics.processed_count,
            created = metrics.created_count,
            modified = metrics.modified_count,
            failed = metrics.failed_count,
            oversize = metrics.oversize_rejected_count,
            "lakeindex.upload.completed"
        );

        metrics
    }

    /// Wait for an upload permit and send `batch` on its own task.
    ///
    /// A batch that never got a permit because the run was cancelled is not
    /// counted as processed.
    async fn dispatch<D>(
        &self,
        batch: Batch<D>,
        permits: &Arc<Semaphore>,
        uploads: &mut JoinSet<()>,
        counters: &Arc<UploadCounters>,
        cancel: &CancelToken,
    ) where
        D: IndexDocument,
        U: SearchUploader<D> + 'static,
    {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(permits).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            counters.record_interrupted();
            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::DEBUG,
                event = "lakeindex.cancelled",
                stage = UPLOAD_STAGE,
                dropped = batch.len(),
                "lakeindex.cancelled"
            );
            return;
        };

        let documents = batch.len() as u64;
        let _bytes = batch.bytes();
        let _total = counters.record_dispatched(documents);

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::INFO,
            event = "lakeindex.upload.batch_sent",
            documents = documents,
            bytes = _bytes,
            total = _total,
            "lakeindex.upload.batch_sent"
        );

        let uploader = Arc::clone(&self.uploader);
        let mode = self.mode;
        let cancel = cancel.clone();
        let mut guard = BatchFailureGuard {
            counters: Arc::clone(counters),
            documents,
            armed: true,
        };

        uploads.spawn(async move {
            let _permit = permit;
            let batch = batch.into_documents();
            match uploader.submit(mode, &batch, &cancel).await {
                Ok(results) => {
                    guard.armed = false;
                    let _tally = guard.counters.record_results(&results);
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::INFO,
                        event = "lakeindex.upload.batch_completed",
                        documents = documents,
                        created = _tally.created,
                        modified = _tally.modified,
                        failed = _tally.failed,
                        total = _total,
                        "lakeindex.upload.batch_completed"
                    );
                }
                Err(err) => {
                    if err.is_cancelled() {
                        guard.counters.record_interrupted();
                    }
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::ERROR,
                        event = "lakeindex.upload.batch_failed",
                        documents = documents,
                        total = _total,
                        error = %err,
                        "lakeindex.upload.batch_failed"
                    );
                }
            }
        });
    }
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(_err) = joined {
        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::ERROR,
            event = "lakeindex.upload.task_panicked",
            error = %_err,
            "lakeindex.upload.task_panicked"
        );
    }
}
