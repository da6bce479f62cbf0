//! Storage-side collaborators: listing paths and fetching file contents.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::model::{ListPathsOptions, PathRecord};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::BoundedQueue;

#[cfg(feature = "fs")]
pub mod fs;
pub mod memory;
pub mod path_index;

#[cfg(feature = "fs")]
pub use fs::{FsFetcher, FsLister};
pub use memory::{MemoryFetcher, VecLister};
pub use path_index::{PathIndexLister, PathIndexReader, PathPageRequest};

/// Raw file content as returned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawContent {
    pub bytes: Bytes,
    /// Store-specific version tag, when the store has one.
    pub etag: Option<String>,
}

impl RawContent {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Produces the paths taking part in a run.
///
/// Implementations push every admitted path into `output` and return how many
/// they pushed. They may fan out internally but must not complete `output`;
/// the listing stage does that. An `Err` ends the listing stage.
#[async_trait]
pub trait PathLister: Send + Sync {
    async fn list(
        &self,
        options: &ListPathsOptions,
        output: &BoundedQueue<PathRecord>,
        cancel: &CancelToken,
    ) -> Result<u64>;
}

/// Reads the content behind a path.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, path: &PathRecord, cancel: &CancelToken) -> Result<RawContent>;
}

#[async_trait]
impl<L: PathLister + ?Sized> PathLister for Arc<L> {
    async fn list(
        &self,
        options: &ListPathsOptions,
        output: &BoundedQueue<PathRecord>,
        cancel: &CancelToken,
    ) -> Result<u64> {
        (**self).list(options, output, cancel).await
    }
}

#[async_trait]
impl<F: FileFetcher + ?Sized> FileFetcher for Arc<F> {
    async fn fetch(&self, path: &PathRecord, cancel: &CancelToken) -> Result<RawContent> {
        (**self).fetch(path, cancel).await
    }
}
