use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::model::{ListPathsOptions, PathRecord};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::BoundedQueue;
use crate::source::{FileFetcher, PathLister, RawContent};

/// Lists a fixed set of paths, applying the watermark locally.
///
/// The backend filter expression is not interpreted.
#[derive(Debug, Clone, Default)]
pub struct VecLister {
    paths: Vec<PathRecord>,
}

impl VecLister {
    pub fn new(paths: impl IntoIterator<Item = PathRecord>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn paths(&self) -> &[PathRecord] {
        &self.paths
    }
}

#[async_trait]
impl PathLister for VecLister {
    async fn list(
        &self,
        options: &ListPathsOptions,
        output: &BoundedQueue<PathRecord>,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let mut listed = 0;
        for path in self.paths.iter().filter(|path| options.admits(path)) {
            output.push(path.clone(), cancel).await?;
            listed += 1;
        }
        Ok(listed)
    }
}

/// Serves file contents from memory, keyed by path key.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: RwLock<HashMap<String, Bytes>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &PathRecord, content: impl Into<Bytes>) {
        self.files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.key().to_owned(), content.into());
    }

    pub fn with_file(self, path: &PathRecord, content: impl Into<Bytes>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn len(&self) -> usize {
        self.files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FileFetcher for MemoryFetcher {
    async fn fetch(&self, path: &PathRecord, cancel: &CancelToken) -> Result<RawContent> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path.key())
            .cloned()
            .map(RawContent::new)
            .ok_or_else(|| Error::fetch(path.path_url_encoded(), "no such file"))
    }
}
