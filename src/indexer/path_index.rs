use std::sync::Arc;

use serde::Serialize;

use crate::batch::size::Measured;
use crate::batch::uploader::BatchingUploader;
use crate::error::{Error, Result};
use crate::indexer::config::IndexerOptions;
use crate::indexer::list::list_paths_stage;
use crate::metrics::ResultTally;
use crate::model::{ListPathsOptions, PathRecord};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::BoundedQueue;
use crate::source::PathLister;
use crate::store::{SearchUploader, UploadMode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertPathsResult {
    pub created: u64,
    pub modified: u64,
    pub failed: u64,
}

impl From<ResultTally> for UpsertPathsResult {
    fn from(tally: ResultTally) -> Self {
        Self {
            created: tally.created,
            modified: tally.modified,
            failed: tally.failed,
        }
    }
}

/// Maintains the index of known paths, which later runs list from.
pub struct PathIndexer<U: ?Sized> {
    uploader: Arc<U>,
    options: IndexerOptions,
}

impl<U> PathIndexer<U> {
    pub fn new(uploader: U, options: IndexerOptions) -> Self {
        Self::from_arc(Arc::new(uploader), options)
    }
}

impl<U: ?Sized> PathIndexer<U> {
    pub fn from_arc(uploader: Arc<U>, options: IndexerOptions) -> Self {
        Self { uploader, options }
    }
}

impl<U> PathIndexer<U>
where
    U: SearchUploader<PathRecord> + ?Sized + 'static,
{
    /// Merge-or-upload one batch of paths, e.g. from storage change events.
    ///
    /// Unlike a run, a failed call is returned as an error so the event can
    /// be retried by its trigger.
    pub async fn upsert_paths(
        &self,
        paths: &[PathRecord],
        cancel: &CancelToken,
    ) -> Result<UpsertPathsResult> {
        if paths.is_empty() {
            return Ok(UpsertPathsResult::default());
        }
        let results = self.uploader.merge_or_upload(paths, cancel).await?;
        let result = UpsertPathsResult::from(ResultTally::from_results(&results));

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::INFO,
            event = "lakeindex.paths.upserted",
            paths = paths.len(),
            created = result.created,
            modified = result.modified,
            failed = result.failed,
            "lakeindex.paths.upserted"
        );

        Ok(result)
    }

    /// List every path and merge-or-upload it, batched with the same count and
    /// size limits as document runs.
    ///
    /// Fails if the listing failed or the run was cancelled. Oversize records
    /// and records that cannot be serialized count as failed.
    pub async fn rebuild<L>(
        &self,
        lister: &L,
        list_options: &ListPathsOptions,
        cancel: &CancelToken,
    ) -> Result<UpsertPathsResult>
    where
        L: PathLister + ?Sized,
    {
        self.options.validate()?;

        let paths = BoundedQueue::new(self.options.effective_path_queue_capacity());
        let records = BoundedQueue::new(self.options.effective_document_queue_capacity());
        let uploader = BatchingUploader::new(
            Arc::clone(&self.uploader),
            self.options.upload_concurrency,
            self.options.batch_size,
            self.options.max_batch_bytes,
        )
        .max_document_bytes(self.options.effective_max_document_bytes())
        .mode(UploadMode::MergeOrUpload)
        .progress_interval(self.options.progress_interval);

        let (listing, (unmeasurable, measuring_cancelled), upload) = tokio::join!(
            list_paths_stage(lister, list_options, &paths, cancel),
            measure_paths(&paths, &records, cancel),
            uploader.run(&records, cancel),
        );

        if listing.cancelled || measuring_cancelled || upload.cancelled {
            return Err(Error::Cancelled);
        }
        if listing.failed {
            return Err(Error::listing(format!(
                "path listing failed after {} paths",
                listing.listed_count
            )));
        }

        Ok(UpsertPathsResult {
            created: upload.created_count,
            modified: upload.modified_count,
            failed: upload.failed_count + upload.oversize_rejected_count + unmeasurable,
        })
    }
}

/// Moves path records into the upload queue with their serialized size.
/// Returns how many could not be serialized and whether cancellation cut the
/// move short.
async fn measure_paths(
    input: &BoundedQueue<PathRecord>,
    output: &BoundedQueue<Measured<PathRecord>>,
    cancel: &CancelToken,
) -> (u64, bool) {
    let _complete_output = output.complete_on_drop();
    let _close_input = input.complete_on_drop();

    let mut failed = 0;
    loop {
        let path = match input.pop(cancel).await {
            Ok(Some(path)) => path,
            Ok(None) => return (failed, false),
            Err(_) => return (failed, !input.is_finished()),
        };
        match Measured::new(path) {
            Ok(measured) => {
                if output.push(measured, cancel).await.is_err() {
                    return (failed, true);
                }
            }
            Err(_) => failed += 1,
        }
    }
}
