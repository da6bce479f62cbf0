use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use crate::batch::uploader::BatchingUploader;
use crate::error::Result;
use crate::indexer::config::IndexerOptions;
use crate::indexer::list::list_paths_stage;
use crate::indexer::read::DocumentReader;
use crate::map::Mapper;
use crate::metrics::{IndexerRunMetrics, ListingReport};
use crate::model::{IndexDocument, ListPathsOptions, PathRecord};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::progress::ProgressObserver;
use crate::pipeline::queue::BoundedQueue;
use crate::source::{FileFetcher, PathLister, VecLister};
use crate::store::SearchUploader;

/// Lists paths, reads them into documents and uploads the documents in
/// batches, with the three stages running concurrently.
///
/// ```text
/// lister ──▶ [path queue] ──▶ read (fetch + map) ──▶ [document queue] ──▶ batch upload
/// ```
///
/// Both queues are bounded, so a slow backend throttles reading and a slow
/// store throttles listing. Per-item and per-batch failures only show up in
/// the returned [`IndexerRunMetrics`].
pub struct DataLakeIndexer<F: ?Sized, U: ?Sized> {
    fetcher: Arc<F>,
    uploader: Arc<U>,
    options: IndexerOptions,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl<F, U> DataLakeIndexer<F, U> {
    pub fn new(fetcher: F, uploader: U, options: IndexerOptions) -> Self {
        Self::from_arcs(Arc::new(fetcher), Arc::new(uploader), options)
    }
}

impl<F: ?Sized, U: ?Sized> DataLakeIndexer<F, U> {
    pub fn from_arcs(fetcher: Arc<F>, uploader: Arc<U>, options: IndexerOptions) -> Self {
        Self {
            fetcher,
            uploader,
            options,
            observer: None,
        }
    }

    /// Receive the periodic progress snapshots of the read and upload stages.
    pub fn observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &IndexerOptions {
        &self.options
    }
}

impl<F, U> DataLakeIndexer<F, U>
where
    F: FileFetcher + ?Sized + 'static,
    U: ?Sized + 'static,
{
    /// Index every path `lister` yields for `list_options`.
    ///
    /// Fails only for invalid options. A cancelled run returns the partial
    /// metrics with `cancelled` set; see [`IndexerRunMetrics::into_result`].
    pub async fn run<L, M, D>(
        &self,
        lister: L,
        mapper: M,
        list_options: ListPathsOptions,
        cancel: &CancelToken,
    ) -> Result<IndexerRunMetrics>
    where
        L: PathLister + 'static,
        M: Mapper<D> + 'static,
        D: IndexDocument,
        U: SearchUploader<D>,
    {
        self.options.validate()?;
        let started = Instant::now();

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::INFO,
            event = "lakeindex.run.started",
            read_concurrency = self.options.read_concurrency,
            upload_concurrency = self.options.upload_concurrency,
            batch_size = self.options.batch_size,
            max_batch_bytes = self.options.max_batch_bytes,
            "lakeindex.run.started"
        );

        let paths = BoundedQueue::new(self.options.effective_path_queue_capacity());
        let documents = BoundedQueue::new(self.options.effective_document_queue_capacity());

        let listing = {
            let paths = paths.clone();
            let cancel = cancel.clone();
            spawn_stage("list", async move {
                list_paths_stage(&lister, &list_options, &paths, &cancel).await
            })
        };

        let reading = {
            let reader = DocumentReader::new(
                Arc::clone(&self.fetcher),
                Arc::new(mapper),
                self.options.read_concurrency,
            )
            .progress_interval(self.options.progress_interval)
            .observer(self.observer.clone());
            let documents = documents.clone();
            let cancel = cancel.clone();
            spawn_stage("read", async move { reader.run(&paths, &documents, &cancel).await })
        };

        let uploading = {
            let uploader = BatchingUploader::new(
                Arc::clone(&self.uploader),
                self.options.upload_concurrency,
                self.options.batch_size,
                self.options.max_batch_bytes,
            )
            .max_document_bytes(self.options.effective_max_document_bytes())
            .mode(self.options.upload_mode)
            .progress_interval(self.options.progress_interval)
            .observer(self.observer.clone());
            let cancel = cancel.clone();
            spawn_stage("upload", async move { uploader.run(&documents, &cancel).await })
        };

        let (listing, reading, uploading) = tokio::join!(listing, reading, uploading);

        let listing = listing.unwrap_or_else(|err| {
            stage_panicked("list", &err);
            ListingReport {
                failed: true,
                ..ListingReport::default()
            }
        });
        let reading = reading.unwrap_or_else(|err| {
            stage_panicked("read", &err);
            Default::default()
        });
        let uploading = uploading.unwrap_or_else(|err| {
            stage_panicked("upload", &err);
            Default::default()
        });

        let metrics = IndexerRunMetrics::merge(listing, reading, uploading, started.elapsed());

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::INFO,
            event = "lakeindex.run.completed",
            elapsed_ms = metrics.elapsed.as_millis() as u64,
            listed = metrics.listed_count,
            read = metrics.read_count,
            read_failed = metrics.read_failed_count,
            document_bytes = metrics.document_bytes,
            processed = metrics.processed_count,
            created = metrics.upload_created_count,
            modified = metrics.upload_modified_count,
            failed = metrics.upload_failed_count,
            oversize = metrics.upload_oversize_count,
            cancelled = metrics.cancelled,
            "lakeindex.run.completed"
        );

        Ok(metrics)
    }

    /// Same pipeline over an explicit set of paths, e.g. from change events.
    pub async fn run_on_paths<M, D>(
        &self,
        paths: impl IntoIterator<Item = PathRecord>,
        mapper: M,
        cancel: &CancelToken,
    ) -> Result<IndexerRunMetrics>
    where
        M: Mapper<D> + 'static,
        D: IndexDocument,
        U: SearchUploader<D>,
    {
        self.run(
            VecLister::new(paths),
            mapper,
            ListPathsOptions::default(),
            cancel,
        )
        .await
    }
}

fn spawn_stage<T, Fut>(stage: &'static str, future: Fut) -> JoinHandle<T>
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    #[cfg(feature = "tracing")]
    let handle = {
        use tracing::Instrument;
        let span = tracing::info_span!("lakeindex.stage", stage = stage);
        tokio::spawn(future.instrument(span))
    };

    #[cfg(not(feature = "tracing"))]
    let handle = {
        let _ = stage;
        tokio::spawn(future)
    };

    handle
}

fn stage_panicked(_stage: &'static str, _err: &tokio::task::JoinError) {
    #[cfg(feature = "tracing")]
    tracing::event!(
        tracing::Level::ERROR,
        event = "lakeindex.stage.panicked",
        stage = _stage,
        error = %_err,
        "lakeindex.stage.panicked"
    );
}
