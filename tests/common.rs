#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lakeindex::batch::Measured;
use lakeindex::error::{Error, Result};
use lakeindex::map::MapFn;
use lakeindex::model::{IndexDocument, ListPathsOptions, PathRecord};
use lakeindex::pipeline::{BoundedQueue, CancelToken};
use lakeindex::source::{FileFetcher, MemoryFetcher, PathLister, RawContent};
use lakeindex::store::{IndexingResult, SearchUploader, UploadMode};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestDoc {
    pub key: String,
    pub body: String,
}

impl TestDoc {
    pub fn new(key: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            body: body.into(),
        }
    }
}

impl IndexDocument for TestDoc {
    fn key(&self) -> &str {
        &self.key
    }
}

pub fn modified_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn paths(n: usize) -> Vec<PathRecord> {
    (0..n)
        .map(|i| PathRecord::new("lake", &format!("partition_{}/{i}.json", i % 4), modified_at()))
        .collect()
}

/// Serves `body(i)` for the i-th path.
pub fn fetcher_for(paths: &[PathRecord], body: impl Fn(usize) -> String) -> MemoryFetcher {
    let fetcher = MemoryFetcher::new();
    for (i, path) in paths.iter().enumerate() {
        fetcher.insert(path, body(i));
    }
    fetcher
}

/// Maps every file to a [`TestDoc`] holding its content.
pub fn body_mapper(
) -> MapFn<impl Fn(&PathRecord, RawContent) -> Result<Option<TestDoc>> + Send + Sync + 'static> {
    MapFn(|path: &PathRecord, content: RawContent| -> Result<Option<TestDoc>> {
        let body = String::from_utf8_lossy(&content.bytes).into_owned();
        Ok(Some(TestDoc::new(path.key(), body)))
    })
}

pub fn measured(docs: impl IntoIterator<Item = TestDoc>) -> Vec<Measured<TestDoc>> {
    docs.into_iter()
        .map(|doc| Measured::new(doc).expect("test docs serialize"))
        .collect()
}

/// A completed queue holding `items`.
pub async fn completed_queue<T: Send>(items: Vec<T>) -> BoundedQueue<T> {
    let queue = BoundedQueue::new(items.len().max(1));
    let cancel = CancelToken::new();
    for item in items {
        queue.push(item, &cancel).await.expect("queue has room");
    }
    queue.complete();
    queue
}

/// Tracks how many calls run at the same time.
#[derive(Debug, Default)]
pub struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) -> GaugeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct GaugeGuard<'a>(&'a Gauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cancel-aware sleep.
pub async fn pause(delay: Duration, cancel: &CancelToken) -> Result<()> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Fetcher wrapper that sleeps before every fetch and records concurrency.
pub struct SlowFetcher<F> {
    inner: F,
    delay: Duration,
    pub gauge: Gauge,
    pub calls: AtomicUsize,
}

impl<F> SlowFetcher<F> {
    pub fn new(inner: F, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            gauge: Gauge::default(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<F: FileFetcher> FileFetcher for SlowFetcher<F> {
    async fn fetch(&self, path: &PathRecord, cancel: &CancelToken) -> Result<RawContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _active = self.gauge.enter();
        pause(self.delay, cancel).await?;
        self.inner.fetch(path, cancel).await
    }
}

/// Pushes the given paths, then fails.
pub struct FailingLister {
    pub before_failing: Vec<PathRecord>,
}

#[async_trait]
impl PathLister for FailingLister {
    async fn list(
        &self,
        _: &ListPathsOptions,
        output: &BoundedQueue<PathRecord>,
        cancel: &CancelToken,
    ) -> Result<u64> {
        for path in &self.before_failing {
            output.push(path.clone(), cancel).await?;
        }
        Err(Error::listing("storage account unreachable"))
    }
}

/// Uploader that records every call and answers from a script.
pub struct RecordingUploader {
    batches: Mutex<Vec<Vec<String>>>,
    modes: Mutex<Vec<UploadMode>>,
    statuses: Vec<u16>,
    failing_calls: HashSet<usize>,
    delay: Duration,
    calls: AtomicUsize,
    pub gauge: Gauge,
}

impl Default for RecordingUploader {
    fn default() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            modes: Mutex::new(Vec::new()),
            statuses: vec![201],
            failing_calls: HashSet::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            gauge: Gauge::default(),
        }
    }
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of the i-th document of every batch, cycling.
    pub fn statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.statuses = statuses.into();
        self
    }

    /// The n-th call (0-based) fails as a whole.
    pub fn failing_call(mut self, call: usize) -> Self {
        self.failing_calls.insert(call);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().expect("mutex poisoned").clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.batches().iter().map(Vec::len).collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.batches().into_iter().flatten().collect();
        keys.sort();
        keys
    }

    pub fn modes(&self) -> Vec<UploadMode> {
        self.modes.lock().expect("mutex poisoned").clone()
    }

    async fn record<D: IndexDocument>(
        &self,
        mode: UploadMode,
        batch: &[D],
        cancel: &CancelToken,
    ) -> Result<Vec<IndexingResult>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let _active = self.gauge.enter();
            pause(self.delay, cancel).await?;
        }

        self.batches
            .lock()
            .expect("mutex poisoned")
            .push(batch.iter().map(|doc| doc.key().to_owned()).collect());
        self.modes.lock().expect("mutex poisoned").push(mode);

        if self.failing_calls.contains(&call) {
            return Err(Error::upload("scripted call failure"));
        }
        Ok(batch
            .iter()
            .enumerate()
            .map(|(i, doc)| IndexingResult::new(doc.key(), self.statuses[i % self.statuses.len()]))
            .collect())
    }
}

#[async_trait]
impl<D: IndexDocument> SearchUploader<D> for RecordingUploader {
    async fn upload(&self, batch: &[D], cancel: &CancelToken) -> Result<Vec<IndexingResult>> {
        self.record(UploadMode::Upload, batch, cancel).await
    }

    async fn merge_or_upload(
        &self,
        batch: &[D],
        cancel: &CancelToken,
    ) -> Result<Vec<IndexingResult>> {
        self.record(UploadMode::MergeOrUpload, batch, cancel).await
    }
}
