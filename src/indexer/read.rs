use std::sync::Arc;
use std::time::Duration;

use crate::batch::size::Measured;
use crate::error::Result;
use crate::map::Mapper;
use crate::metrics::{ReadCounters, ReadDocumentsMetrics, StageMetrics};
use crate::model::{IndexDocument, PathRecord};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::progress::{ProgressObserver, ProgressTicker};
use crate::pipeline::queue::BoundedQueue;
use crate::pipeline::stage::ParallelStage;
use crate::source::FileFetcher;

pub const READ_STAGE: &str = "read";

/// Fetch + map stage.
///
/// Each path is fetched and mapped on its own worker, at most `concurrency`
/// at a time. Documents leave the stage already measured, so a document that
/// cannot be serialized is a read failure and never reaches batching.
pub struct DocumentReader<F: ?Sized, M: ?Sized> {
    fetcher: Arc<F>,
    mapper: Arc<M>,
    concurrency: usize,
    progress_interval: Option<Duration>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl<F: ?Sized, M: ?Sized> DocumentReader<F, M> {
    pub fn new(fetcher: Arc<F>, mapper: Arc<M>, concurrency: usize) -> Self {
        Self {
            fetcher,
            mapper,
            concurrency,
            progress_interval: None,
            observer: None,
        }
    }

    pub fn progress_interval(mut self, interval: Option<Duration>) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn observer(mut self, observer: Option<Arc<dyn ProgressObserver>>) -> Self {
        self.observer = observer;
        self
    }
}

impl<F, M> DocumentReader<F, M>
where
    F: FileFetcher + ?Sized + 'static,
    M: ?Sized + 'static,
{
    /// Read every path of `input` into `output`.
    ///
    /// Completes `output` when done. `input` is completed too, so a lister
    /// that is still pushing after this stage stopped fails instead of waiting.
    pub async fn run<D>(
        &self,
        input: &BoundedQueue<PathRecord>,
        output: &BoundedQueue<Measured<D>>,
        cancel: &CancelToken,
    ) -> ReadDocumentsMetrics
    where
        D: IndexDocument,
        M: Mapper<D>,
    {
        let _complete_output = output.complete_on_drop();
        let _close_input = input.complete_on_drop();

        let counters = Arc::new(ReadCounters::default());
        let stage = ParallelStage::new(READ_STAGE, self.concurrency);

        let ticker = {
            let counters = Arc::clone(&counters);
            let stage_counters = stage.counters();
            ProgressTicker::start(
                READ_STAGE,
                self.progress_interval,
                self.observer.clone(),
                move || StageMetrics::Read(counters.snapshot(stage_counters.failed())),
            )
        };

        let report = stage
            .run(input, cancel, |path| {
                let fetcher = Arc::clone(&self.fetcher);
                let mapper = Arc::clone(&self.mapper);
                let output = output.clone();
                let counters = Arc::clone(&counters);
                let cancel = cancel.clone();
                async move {
                    read_one(&*fetcher, &*mapper, path, &output, &counters, &cancel).await
                }
            })
            .await;

        ticker.stop().await;

        let metrics = ReadDocumentsMetrics {
            cancelled: report.cancelled,
            ..counters.snapshot(report.failed)
        };

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::INFO,
            event = "lakeindex.read.completed",
            read = metrics.read_count,
            failed = metrics.read_failed_count,
            bytes = metrics.document_bytes,
            "lakeindex.read.completed"
        );

        metrics
    }
}

async fn read_one<D, F, M>(
    fetcher: &F,
    mapper: &M,
    path: PathRecord,
    output: &BoundedQueue<Measured<D>>,
    counters: &ReadCounters,
    cancel: &CancelToken,
) -> Result<()>
where
    D: IndexDocument,
    F: FileFetcher + ?Sized,
    M: Mapper<D> + ?Sized,
{
    let outcome: Result<()> = async {
        let content = fetcher.fetch(&path, cancel).await?;
        let Some(document) = mapper.map(&path, content).await? else {
            return Ok(());
        };
        let measured = Measured::new(document)?;
        let size = measured.size();
        output.push(measured, cancel).await?;
        counters.record_read(size);
        Ok(())
    }
    .await;

    #[cfg(feature = "tracing")]
    {
        if let Err(err) = &outcome {
            if !err.is_cancelled() {
                tracing::event!(
                    tracing::Level::WARN,
                    event = "lakeindex.read.failed",
                    path = path.path_url_encoded(),
                    container = path.container(),
                    error = %err,
                    "lakeindex.read.failed"
                );
            }
        }
    }

    outcome
}
