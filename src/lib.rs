//! # lakeindex
//!
//! **Streaming bulk indexer for search backends.**
//!
//! `lakeindex` lists files from a storage tree, turns each file into a
//! document with a caller-supplied mapper and uploads the documents to a
//! search index in batches bounded by count and serialized size.
//!
//! It is built for large, incremental runs:
//!
//! - bounded memory: stages talk through fixed-capacity queues
//! - bounded concurrency per stage
//! - failures isolated per file and per batch, reported as counters
//! - cooperative cancellation that never leaves a stage hanging
//!
//! ---
//!
//! ## Core Model
//!
//! ```text
//! PathLister → [paths] → fetch + Mapper → [documents] → BatchAccumulator → SearchUploader
//! ```
//!
//! The collaborators are traits: [`PathLister`], [`FileFetcher`], [`Mapper`]
//! and [`SearchUploader`]. In-memory and local filesystem implementations ship
//! with the crate.
//!
//! ---
//!
//! ## Example
//!
//! ```no_run
//! use chrono::Utc;
//! use lakeindex::error::Result;
//! use lakeindex::prelude::*;
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Doc {
//!     key: String,
//!     len: usize,
//! }
//!
//! impl IndexDocument for Doc {
//!     fn key(&self) -> &str {
//!         &self.key
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let path = PathRecord::new("lake", "a/b.json", Utc::now());
//!     let fetcher = MemoryFetcher::new().with_file(&path, r#"{"x":1}"#);
//!     let index = std::sync::Arc::new(MemoryIndex::new());
//!
//!     let indexer = DataLakeIndexer::new(fetcher, index.clone(), IndexerOptions::new());
//!     let mapper = MapFn(|path: &PathRecord, content: RawContent| -> Result<Option<Doc>> {
//!         Ok(Some(Doc { key: path.key().to_owned(), len: content.len() }))
//!     });
//!
//!     let metrics = indexer
//!         .run(VecLister::new([path]), mapper, ListPathsOptions::new(), &CancelToken::new())
//!         .await?
//!         .into_result()?;
//!
//!     assert_eq!(metrics.upload_created_count, 1);
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Failure model
//!
//! - A fetch, map or serialization failure counts one `read_failed_count`.
//! - A document larger than `max_document_bytes` is rejected and
//!   counted in `upload_oversize_count`.
//! - A per-document status `>= 400` counts one `upload_failed_count`.
//! - An upload call that fails as a whole counts its entire batch as failed.
//! - A failing lister ends listing (`listing_failed`); everything listed so far
//!   is still indexed.
//!
//! Only invalid [`IndexerOptions`] make a run return `Err`. Cancellation sets
//! `cancelled` on the returned metrics; `into_result()` turns that into
//! [`Error::RunCancelled`](error::Error::RunCancelled).
//!
//! ---
//!
//! ## Observability
//!
//! With the default `tracing` feature the crate emits structured events such
//! as `lakeindex.read.failed`, `lakeindex.upload.batch_sent`,
//! `lakeindex.upload.batch_failed`, `lakeindex.upload.oversize`,
//! `lakeindex.listing.failed`, `lakeindex.progress` and
//! `lakeindex.run.completed`, each stage running in a `lakeindex.stage` span.
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("lakeindex=info")
//!     .init();
//! ```
//!
//! ---
//!
//! ## Feature Flags
//!
//! - `tracing` *(default)*: structured events and stage spans.
//! - `fs`: [`FsLister`](source::FsLister) and [`FsFetcher`](source::FsFetcher)
//!   for local directory trees.
//!
//! [`PathLister`]: source::PathLister
//! [`FileFetcher`]: source::FileFetcher
//! [`Mapper`]: map::Mapper
//! [`SearchUploader`]: store::SearchUploader
//! [`IndexerOptions`]: indexer::IndexerOptions

pub mod batch;
pub mod error;
pub mod indexer;
pub mod map;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod source;
pub mod store;

pub mod prelude {
    //! Convenient imports for most `lakeindex` users.

    pub use crate::indexer::{DataLakeIndexer, IndexerOptions, PathIndexer, UpsertPathsResult};
    pub use crate::map::{JsonMapper, MapFn, Mapper};
    pub use crate::metrics::IndexerRunMetrics;
    pub use crate::model::{IndexDocument, ListPathsOptions, PathRecord};
    pub use crate::pipeline::cancel::CancelToken;
    pub use crate::pipeline::progress::{Progress, ProgressObserver};
    #[cfg(feature = "fs")]
    pub use crate::source::{FsFetcher, FsLister};
    pub use crate::source::{
        FileFetcher, MemoryFetcher, PathIndexLister, PathLister, RawContent, VecLister,
    };
    pub use crate::store::{IndexingResult, MemoryIndex, SearchUploader, UploadMode};
}
