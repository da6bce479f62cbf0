//! Search backend seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;

pub mod memory;

pub use memory::MemoryIndex;

/// How a batch is written to the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadMode {
    /// Replace documents with the same key.
    #[default]
    Upload,
    /// Merge into existing documents, inserting missing ones.
    MergeOrUpload,
}

/// Backend status of one document of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingResult {
    pub key: String,
    pub status: u16,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    Created,
    Modified,
    Failed,
    Other,
}

impl IndexingResult {
    pub fn new(key: impl Into<String>, status: u16) -> Self {
        Self {
            key: key.into(),
            status,
            error_message: None,
        }
    }

    pub fn created(key: impl Into<String>) -> Self {
        Self::new(key, 201)
    }

    pub fn modified(key: impl Into<String>) -> Self {
        Self::new(key, 200)
    }

    pub fn failed(key: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status,
            error_message: Some(message.into()),
        }
    }

    pub fn class(&self) -> ResultClass {
        match self.status {
            201 => ResultClass::Created,
            200 => ResultClass::Modified,
            s if s >= 400 => ResultClass::Failed,
            _ => ResultClass::Other,
        }
    }
}

/// Writes batches to the search index.
///
/// Implementations own transport-level retries and timeouts; the pipeline
/// submits each batch exactly once. An `Err` means the whole call failed.
#[async_trait]
pub trait SearchUploader<D: Send + Sync>: Send + Sync {
    async fn upload(&self, batch: &[D], cancel: &CancelToken) -> Result<Vec<IndexingResult>>;

    async fn merge_or_upload(
        &self,
        batch: &[D],
        cancel: &CancelToken,
    ) -> Result<Vec<IndexingResult>>;

    async fn submit(
        &self,
        mode: UploadMode,
        batch: &[D],
        cancel: &CancelToken,
    ) -> Result<Vec<IndexingResult>> {
        match mode {
            UploadMode::Upload => self.upload(batch, cancel).await,
            UploadMode::MergeOrUpload => self.merge_or_upload(batch, cancel).await,
        }
    }
}

#[async_trait]
impl<D, U> SearchUploader<D> for Arc<U>
where
    D: Send + Sync,
    U: SearchUploader<D> + ?Sized,
{
    async fn upload(&self, batch: &[D], cancel: &CancelToken) -> Result<Vec<IndexingResult>> {
        (**self).upload(batch, cancel).await
    }

    async fn merge_or_upload(
        &self,
        batch: &[D],
        cancel: &CancelToken,
    ) -> Result<Vec<IndexingResult>> {
        (**self).merge_or_upload(batch, cancel).await
    }

    async fn submit(
        &self,
        mode: UploadMode,
        batch: &[D],
        cancel: &CancelToken,
    ) -> Result<Vec<IndexingResult>> {
        (**self).submit(mode, batch, cancel).await
    }
}
