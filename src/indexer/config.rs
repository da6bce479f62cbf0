use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::UploadMode;

pub const DEFAULT_READ_CONCURRENCY: usize = 128;
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// Just below the 64 MiB request ceiling of common search backends.
pub const DEFAULT_MAX_BATCH_BYTES: u64 = 63 * 1024 * 1024;
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

/// Tunables of one indexer run.
///
/// Every field has a default, so a partial JSON/TOML document deserializes:
///
/// ```
/// # use lakeindex::indexer::IndexerOptions;
/// let options: IndexerOptions =
///     serde_json::from_str(r#"{ "uploadConcurrency": 8, "progressIntervalMs": null }"#).unwrap();
/// assert_eq!(options.upload_concurrency, 8);
/// assert_eq!(options.batch_size, 1000);
/// assert!(options.progress_interval.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexerOptions {
    /// Concurrent fetch + map workers.
    pub read_concurrency: usize,
    /// Concurrent upload calls.
    pub upload_concurrency: usize,
    /// Maximum documents per batch.
    pub batch_size: usize,
    /// Maximum serialized bytes per batch.
    pub max_batch_bytes: u64,
    /// Larger single documents are rejected. Defaults to `max_batch_bytes`
    /// and never exceeds it.
    pub max_document_bytes: Option<u64>,
    /// `None` disables the progress ticker.
    #[serde(rename = "progressIntervalMs", with = "optional_millis")]
    pub progress_interval: Option<Duration>,
    pub upload_mode: UploadMode,
    /// Overrides `batch_size * upload_concurrency * 2`.
    pub path_queue_capacity: Option<usize>,
    /// Overrides `batch_size * (upload_concurrency + 2)`.
    pub document_queue_capacity: Option<usize>,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            read_concurrency: DEFAULT_READ_CONCURRENCY,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_document_bytes: None,
            progress_interval: Some(DEFAULT_PROGRESS_INTERVAL),
            upload_mode: UploadMode::default(),
            path_queue_capacity: None,
            document_queue_capacity: None,
        }
    }
}

impl IndexerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_concurrency(mut self, n: usize) -> Self {
        self.read_concurrency = n;
        self
    }

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.upload_concurrency = n;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn max_batch_bytes(mut self, bytes: u64) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    pub fn max_document_bytes(mut self, bytes: u64) -> Self {
        self.max_document_bytes = Some(bytes);
        self
    }

    pub fn progress_interval(mut self, interval: Option<Duration>) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn upload_mode(mut self, mode: UploadMode) -> Self {
        self.upload_mode = mode;
        self
    }

    pub fn path_queue_capacity(mut self, capacity: usize) -> Self {
        self.path_queue_capacity = Some(capacity);
        self
    }

    pub fn document_queue_capacity(mut self, capacity: usize) -> Self {
        self.document_queue_capacity = Some(capacity);
        self
    }

    pub fn effective_max_document_bytes(&self) -> u64 {
        self.max_document_bytes
            .map_or(self.max_batch_bytes, |bytes| bytes.min(self.max_batch_bytes))
    }

    pub fn effective_path_queue_capacity(&self) -> usize {
        self.path_queue_capacity.unwrap_or_else(|| {
            self.batch_size
                .saturating_mul(self.upload_concurrency)
                .saturating_mul(2)
        })
    }

    pub fn effective_document_queue_capacity(&self) -> usize {
        self.document_queue_capacity.unwrap_or_else(|| {
            self.batch_size
                .saturating_mul(self.upload_concurrency.saturating_add(2))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_concurrency == 0 {
            return Err(Error::config("read_concurrency", "must be at least 1"));
        }
        if self.upload_concurrency == 0 {
            return Err(Error::config("upload_concurrency", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size", "must be at least 1"));
        }
        if self.max_batch_bytes == 0 {
            return Err(Error::config("max_batch_bytes", "must be at least 1"));
        }
        if self.max_document_bytes == Some(0) {
            return Err(Error::config("max_document_bytes", "must be at least 1"));
        }
        if self.progress_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::config(
                "progress_interval",
                "must be positive; use None to disable",
            ));
        }
        if self.path_queue_capacity == Some(0) {
            return Err(Error::config("path_queue_capacity", "must be at least 1"));
        }
        if self.document_queue_capacity == Some(0) {
            return Err(Error::config("document_queue_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
