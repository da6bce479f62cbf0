//! Run counters.
//!
//! Each stage owns a set of atomic counters while it runs and hands back an
//! immutable snapshot when it finishes; the orchestrator merges the stage
//! snapshots into one [`IndexerRunMetrics`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::{IndexingResult, ResultClass};

/// Live counters of the document read stage.
#[derive(Debug, Default)]
pub struct ReadCounters {
    read: AtomicU64,
    bytes: AtomicU64,
}

impl ReadCounters {
    pub fn record_read(&self, document_bytes: u64) {
        self.read.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(document_bytes, Ordering::Relaxed);
    }

    pub fn read_count(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, read_failed_count: u64) -> ReadDocumentsMetrics {
        ReadDocumentsMetrics {
            read_count: self.read.load(Ordering::Relaxed),
            read_failed_count,
            document_bytes: self.bytes.load(Ordering::Relaxed),
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadDocumentsMetrics {
    pub read_count: u64,
    pub read_failed_count: u64,
    /// Serialized size of every document that was read.
    pub document_bytes: u64,
    /// The stage stopped before its input was drained.
    pub cancelled: bool,
}

/// Live counters of the batch upload stage.
#[derive(Debug, Default)]
pub struct UploadCounters {
    processed: AtomicU64,
    created: AtomicU64,
    modified: AtomicU64,
    failed: AtomicU64,
    oversize: AtomicU64,
    interrupted: AtomicBool,
}

impl UploadCounters {
    /// Count a batch as handed to the search backend; returns the running total.
    pub fn record_dispatched(&self, documents: u64) -> u64 {
        self.processed.fetch_add(documents, Ordering::Relaxed) + documents
    }

    pub fn record_results(&self, results: &[IndexingResult]) -> ResultTally {
        let tally = ResultTally::from_results(results);
        self.created.fetch_add(tally.created, Ordering::Relaxed);
        self.modified.fetch_add(tally.modified, Ordering::Relaxed);
        self.failed.fetch_add(tally.failed, Ordering::Relaxed);
        tally
    }

    /// The whole call failed: no per-document credit.
    pub fn record_batch_failed(&self, documents: u64) {
        self.failed.fetch_add(documents, Ordering::Relaxed);
    }

    pub fn record_oversize(&self) {
        self.oversize.fetch_add(1, Ordering::Relaxed);
    }

    /// Cancellation cut the stage short: input left unread, a batch dropped or
    /// a call aborted.
    pub fn record_interrupted(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UploadMetrics {
        UploadMetrics {
            processed_count: self.processed.load(Ordering::Relaxed),
            created_count: self.created.load(Ordering::Relaxed),
            modified_count: self.modified.load(Ordering::Relaxed),
            failed_count: self.failed.load(Ordering::Relaxed),
            oversize_rejected_count: self.oversize.load(Ordering::Relaxed),
            cancelled: self.interrupted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadMetrics {
    pub processed_count: u64,
    pub created_count: u64,
    pub modified_count: u64,
    pub failed_count: u64,
    pub oversize_rejected_count: u64,
    pub cancelled: bool,
}

/// Per-batch classification of backend statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultTally {
    pub created: u64,
    pub modified: u64,
    pub failed: u64,
}

impl ResultTally {
    pub fn from_results(results: &[IndexingResult]) -> Self {
        results
            .iter()
            .fold(Self::default(), |mut tally, result| {
                match result.class() {
                    ResultClass::Created => tally.created += 1,
                    ResultClass::Modified => tally.modified += 1,
                    ResultClass::Failed => tally.failed += 1,
                    ResultClass::Other => {}
                }
                tally
            })
    }
}

/// Outcome of the path listing stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListingReport {
    pub listed_count: u64,
    pub failed: bool,
    pub cancelled: bool,
}

/// Final, immutable report of one indexer run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexerRunMetrics {
    pub listed_count: u64,
    pub listing_failed: bool,
    pub read_count: u64,
    pub read_failed_count: u64,
    pub document_bytes: u64,
    pub processed_count: u64,
    pub upload_created_count: u64,
    pub upload_modified_count: u64,
    pub upload_failed_count: u64,
    pub upload_oversize_count: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl IndexerRunMetrics {
    /// The run counts as cancelled only if some stage was cut short; a cancel
    /// that lands after every stage finished its input changes nothing.
    pub fn merge(
        listing: ListingReport,
        read: ReadDocumentsMetrics,
        upload: UploadMetrics,
        elapsed: Duration,
    ) -> Self {
        Self {
            listed_count: listing.listed_count,
            listing_failed: listing.failed,
            read_count: read.read_count,
            read_failed_count: read.read_failed_count,
            document_bytes: read.document_bytes,
            processed_count: upload.processed_count,
            upload_created_count: upload.created_count,
            upload_modified_count: upload.modified_count,
            upload_failed_count: upload.failed_count,
            upload_oversize_count: upload.oversize_rejected_count,
            elapsed,
            cancelled: listing.cancelled || read.cancelled || upload.cancelled,
        }
    }

    /// Turn a cancelled run into [`Error::RunCancelled`], keeping the partial counts.
    pub fn into_result(self) -> Result<Self> {
        if self.cancelled {
            Err(Error::RunCancelled(Box::new(self)))
        } else {
            Ok(self)
        }
    }
}

/// Counters reported by the progress ticker of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMetrics {
    Read(ReadDocumentsMetrics),
    Upload(UploadMetrics),
}

impl fmt::Display for StageMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(m) => write!(
                f,
                "read: {}, failed: {}, bytes: {}",
                m.read_count, m.read_failed_count, m.document_bytes
            ),
            Self::Upload(m) => write!(
                f,
                "processed: {}, created: {}, modified: {}, failed: {}, oversize: {}",
                m.processed_count,
                m.created_count,
                m.modified_count,
                m.failed_count,
                m.oversize_rejected_count
            ),
        }
    }
}
