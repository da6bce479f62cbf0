use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as TimeDelta;
use lakeindex::error::{Error, Result};
use lakeindex::indexer::{DataLakeIndexer, IndexerOptions};
use lakeindex::map::MapFn;
use lakeindex::model::{IndexDocument, ListPathsOptions, PathRecord};
use lakeindex::pipeline::{CancelToken, Progress, ProgressObserver};
use lakeindex::source::{MemoryFetcher, RawContent, VecLister};
use lakeindex::store::{MemoryIndex, UploadMode};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};

mod common;
use common::{body_mapper, fetcher_for, modified_at, paths, FailingLister, RecordingUploader, TestDoc};

fn quiet() -> IndexerOptions {
    IndexerOptions::new()
        .read_concurrency(8)
        .upload_concurrency(2)
        .batch_size(10)
        .progress_interval(None)
}

#[tokio::test]
async fn indexes_every_listed_path() -> Result<()> {
    let all = paths(50);
    let index = Arc::new(MemoryIndex::new());
    let indexer = DataLakeIndexer::new(fetcher_for(&all, |i| format!("doc {i}")), Arc::clone(&index), quiet());

    let metrics = indexer
        .run(VecLister::new(all.clone()), body_mapper(), ListPathsOptions::new(), &CancelToken::new())
        .await?
        .into_result()?;

    assert_eq!(metrics.listed_count, 50);
    assert_eq!(metrics.read_count, 50);
    assert_eq!(metrics.read_failed_count, 0);
    assert_eq!(metrics.processed_count, 50);
    assert_eq!(metrics.upload_created_count, 50);
    assert_eq!(metrics.upload_modified_count, 0);
    assert!(metrics.document_bytes > 0);
    assert!(!metrics.listing_failed);
    assert_eq!(index.len(), 50);
    assert_eq!(index.get(all[7].key()).unwrap()["body"], "doc 7");

    // same files again: every document already exists
    let again = indexer
        .run(VecLister::new(all), body_mapper(), ListPathsOptions::new(), &CancelToken::new())
        .await?;
    assert_eq!(again.upload_modified_count, 50);
    assert_eq!(again.upload_created_count, 0);
    Ok(())
}

#[tokio::test]
async fn empty_input_yields_zero_metrics_and_no_calls() -> Result<()> {
    let uploader = Arc::new(RecordingUploader::new());
    let indexer = DataLakeIndexer::new(MemoryFetcher::new(), Arc::clone(&uploader), quiet());

    let metrics = indexer
        .run(VecLister::default(), body_mapper(), ListPathsOptions::new(), &CancelToken::new())
        .await?;

    assert_eq!(metrics.listed_count, 0);
    assert_eq!(metrics.read_count, 0);
    assert_eq!(metrics.read_failed_count, 0);
    assert_eq!(metrics.processed_count, 0);
    assert_eq!(metrics.upload_created_count, 0);
    assert_eq!(metrics.upload_modified_count, 0);
    assert_eq!(metrics.upload_failed_count, 0);
    assert_eq!(metrics.upload_oversize_count, 0);
    assert!(!metrics.cancelled);
    assert_eq!(uploader.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn read_failures_are_isolated() -> Result<()> {
    let all = paths(20);
    // paths 3 and 4 have no content; 5 holds content the mapper rejects
    let fetcher = MemoryFetcher::new();
    for (i, path) in all.iter().enumerate() {
        match i {
            3 | 4 => {}
            5 => fetcher.insert(path, "reject me"),
            _ => fetcher.insert(path, format!("doc {i}")),
        }
    }
    let mapper = MapFn(|path: &PathRecord, content: RawContent| -> Result<Option<TestDoc>> {
        if content.bytes == "reject me" {
            return Err(Error::map(path.path_url_encoded(), "unexpected content"));
        }
        Ok(Some(TestDoc::new(path.key(), String::from_utf8_lossy(&content.bytes))))
    });
    let uploader = Arc::new(RecordingUploader::new());
    let indexer = DataLakeIndexer::new(fetcher, Arc::clone(&uploader), quiet());

    let metrics = indexer
        .run(VecLister::new(all), mapper, ListPathsOptions::new(), &CancelToken::new())
        .await?;

    assert_eq!(metrics.read_failed_count, 3);
    assert_eq!(metrics.read_count, 17);
    assert_eq!(metrics.processed_count, 17);
    assert_eq!(uploader.uploaded_keys().len(), 17);
    Ok(())
}

#[tokio::test]
async fn mapper_none_drops_without_failure() -> Result<()> {
    let all = paths(12);
    let mapper = MapFn(|path: &PathRecord, content: RawContent| -> Result<Option<TestDoc>> {
        let body = String::from_utf8_lossy(&content.bytes).into_owned();
        Ok((!body.ends_with("skip")).then(|| TestDoc::new(path.key(), body)))
    });
    let fetcher = fetcher_for(&all, |i| if i % 3 == 0 { "skip".into() } else { format!("doc {i}") });
    let indexer = DataLakeIndexer::new(fetcher, RecordingUploader::new(), quiet());

    let metrics = indexer
        .run(VecLister::new(all), mapper, ListPathsOptions::new(), &CancelToken::new())
        .await?;

    assert_eq!(metrics.read_count, 8);
    assert_eq!(metrics.read_failed_count, 0);
    assert_eq!(metrics.processed_count, 8);
    Ok(())
}

#[derive(Debug)]
struct Picky {
    key: String,
    serializable: bool,
}

impl Serialize for Picky {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        if !self.serializable {
            return Err(S::Error::custom("field cannot be represented as json"));
        }
        s.serialize_str(&self.key)
    }
}

impl IndexDocument for Picky {
    fn key(&self) -> &str {
        &self.key
    }
}

#[tokio::test]
async fn unserializable_documents_are_read_failures() -> Result<()> {
    let all = paths(6);
    let mapper = MapFn(|path: &PathRecord, content: RawContent| -> Result<Option<Picky>> {
        Ok(Some(Picky {
            key: path.key().to_owned(),
            serializable: content.bytes != "bad",
        }))
    });
    let fetcher = fetcher_for(&all, |i| if i < 2 { "bad".into() } else { "ok".into() });
    let uploader = Arc::new(RecordingUploader::new());
    let indexer = DataLakeIndexer::new(fetcher, Arc::clone(&uploader), quiet());

    let metrics = indexer
        .run(VecLister::new(all), mapper, ListPathsOptions::new(), &CancelToken::new())
        .await?;

    assert_eq!(metrics.read_failed_count, 2);
    assert_eq!(metrics.read_count, 4);
    assert_eq!(metrics.processed_count, 4);
    assert_eq!(metrics.upload_failed_count, 0);
    Ok(())
}

#[tokio::test]
async fn processed_equals_read_minus_oversize() -> Result<()> {
    let all = paths(30);
    let fetcher = fetcher_for(&all, |i| if i % 7 == 0 { "x".repeat(5_000) } else { format!("doc {i}") });
    let uploader = Arc::new(RecordingUploader::new().statuses([201, 200, 503]));
    let indexer = DataLakeIndexer::new(fetcher, Arc::clone(&uploader), quiet().max_batch_bytes(1_000));

    let metrics = indexer
        .run(VecLister::new(all), body_mapper(), ListPathsOptions::new(), &CancelToken::new())
        .await?;

    assert_eq!(metrics.read_count, 30);
    assert_eq!(metrics.upload_oversize_count, 5);
    assert_eq!(metrics.processed_count, metrics.read_count - metrics.upload_oversize_count);
    assert_eq!(
        metrics.upload_created_count + metrics.upload_modified_count + metrics.upload_failed_count,
        metrics.processed_count
    );
    assert!(metrics.upload_failed_count > 0);
    Ok(())
}

#[tokio::test]
async fn listing_failure_ends_listing_but_not_the_run() -> Result<()> {
    let listed = paths(3);
    let fetcher = fetcher_for(&listed, |i| format!("doc {i}"));
    let uploader = Arc::new(RecordingUploader::new());
    let indexer = DataLakeIndexer::new(fetcher, Arc::clone(&uploader), quiet());

    let metrics = tokio::time::timeout(
        Duration::from_secs(5),
        indexer.run(
            FailingLister { before_failing: listed },
            body_mapper(),
            ListPathsOptions::new(),
            &CancelToken::new(),
        ),
    )
    .await
    .expect("a failed listing must not hang the run")?;

    assert!(metrics.listing_failed);
    assert_eq!(metrics.listed_count, 3);
    assert_eq!(metrics.read_count, 3);
    assert_eq!(metrics.processed_count, 3);
    assert!(!metrics.cancelled);
    Ok(())
}

#[tokio::test]
async fn watermark_limits_the_run() -> Result<()> {
    let old = PathRecord::new("lake", "old.json", modified_at() - TimeDelta::days(1));
    let new = PathRecord::new("lake", "new.json", modified_at() + TimeDelta::days(1));
    let fetcher = fetcher_for(&[old.clone(), new.clone()], |_| "{}".into());
    let uploader = Arc::new(RecordingUploader::new());
    let indexer = DataLakeIndexer::new(fetcher, Arc::clone(&uploader), quiet());

    let metrics = indexer
        .run(
            VecLister::new([old, new.clone()]),
            body_mapper(),
            ListPathsOptions::new().from_last_modified(modified_at()),
            &CancelToken::new(),
        )
        .await?;

    assert_eq!(metrics.listed_count, 1);
    assert_eq!(uploader.uploaded_keys(), vec![new.key().to_owned()]);
    Ok(())
}

#[tokio::test]
async fn run_on_paths_uses_the_configured_mode() -> Result<()> {
    let all = paths(4);
    let fetcher = fetcher_for(&all, |i| format!("doc {i}"));
    let uploader = Arc::new(RecordingUploader::new());
    let indexer = DataLakeIndexer::new(
        fetcher,
        Arc::clone(&uploader),
        quiet().upload_mode(UploadMode::MergeOrUpload),
    );

    let metrics = indexer
        .run_on_paths(all, body_mapper(), &CancelToken::new())
        .await?;

    assert_eq!(metrics.processed_count, 4);
    assert_eq!(uploader.modes(), vec![UploadMode::MergeOrUpload]);
    Ok(())
}

#[tokio::test]
async fn invalid_options_fail_before_anything_runs() {
    let uploader = Arc::new(RecordingUploader::new());
    let indexer = DataLakeIndexer::new(MemoryFetcher::new(), Arc::clone(&uploader), quiet().batch_size(0));

    let err = indexer
        .run(VecLister::new(paths(3)), body_mapper(), ListPathsOptions::new(), &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config { field: "batch_size", .. }));
    assert_eq!(uploader.call_count(), 0);
}

#[tokio::test]
async fn observer_receives_progress_snapshots() -> Result<()> {
    let all = paths(20);
    let fetcher = fetcher_for(&all, |i| format!("doc {i}"));
    let uploader = RecordingUploader::new().delay(Duration::from_millis(40));
    let ticks = Arc::new(AtomicUsize::new(0));
    let observer: Arc<dyn ProgressObserver> = {
        let ticks = Arc::clone(&ticks);
        Arc::new(move |_: &Progress| {
            ticks.fetch_add(1, Ordering::SeqCst);
        })
    };
    let indexer = DataLakeIndexer::new(
        fetcher,
        uploader,
        quiet()
            .upload_concurrency(1)
            .progress_interval(Some(Duration::from_millis(5))),
    )
    .observer(observer);

    let metrics = indexer
        .run(VecLister::new(all), body_mapper(), ListPathsOptions::new(), &CancelToken::new())
        .await?;

    assert_eq!(metrics.processed_count, 20);
    assert!(ticks.load(Ordering::SeqCst) > 0);
    Ok(())
}

#[tokio::test]
async fn per_document_ceiling_is_below_the_batch_ceiling() -> Result<()> {
    let all = paths(10);
    let fetcher = fetcher_for(&all, |i| if i < 3 { "x".repeat(500) } else { format!("doc {i}") });
    let uploader = Arc::new(RecordingUploader::new());
    let indexer = DataLakeIndexer::new(fetcher, Arc::clone(&uploader), quiet().max_document_bytes(300));

    let metrics = indexer
        .run(VecLister::new(all), body_mapper(), ListPathsOptions::new(), &CancelToken::new())
        .await?;

    assert_eq!(metrics.read_count, 10);
    assert_eq!(metrics.upload_oversize_count, 3);
    assert_eq!(metrics.processed_count, 7);
    // the small documents still share one batch
    assert_eq!(uploader.batch_sizes(), vec![7]);
    Ok(())
}
