use crate::error::Error;
use crate::metrics::ListingReport;
use crate::model::{ListPathsOptions, PathRecord};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::BoundedQueue;
use crate::source::PathLister;

/// Run `lister` into `output` and complete `output` afterwards, whatever the
/// outcome.
///
/// A lister error ends the stage and is reported as `failed`; the documents
/// already listed still flow through the rest of the run.
pub async fn list_paths_stage<L>(
    lister: &L,
    options: &ListPathsOptions,
    output: &BoundedQueue<PathRecord>,
    cancel: &CancelToken,
) -> ListingReport
where
    L: PathLister + ?Sized,
{
    let _complete = output.complete_on_drop();

    #[cfg(feature = "tracing")]
    tracing::event!(
        tracing::Level::INFO,
        event = "lakeindex.listing.started",
        filter = options.filter_expression().as_deref().unwrap_or(""),
        "lakeindex.listing.started"
    );

    match lister.list(options, output, cancel).await {
        Ok(listed_count) => {
            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::INFO,
                event = "lakeindex.listing.completed",
                listed = listed_count,
                "lakeindex.listing.completed"
            );
            ListingReport {
                listed_count,
                ..ListingReport::default()
            }
        }
        Err(err) if err.is_cancelled() || (cancel.is_cancelled() && matches!(err, Error::QueueCompleted)) => {
            ListingReport {
                listed_count: output.pushed_count(),
                failed: false,
                cancelled: true,
            }
        }
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::ERROR,
                event = "lakeindex.listing.failed",
                listed = output.pushed_count(),
                error = %_err,
                "lakeindex.listing.failed"
            );
            ListingReport {
                listed_count: output.pushed_count(),
                failed: true,
                cancelled: false,
            }
        }
    }
}
