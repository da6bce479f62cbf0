//! Listing from the index of known paths, built by
//! [`PathIndexer`](crate::indexer::PathIndexer).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::options::concat_with_and;
use crate::model::{ListPathsOptions, PathRecord};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::BoundedQueue;
use crate::source::PathLister;

pub const DEFAULT_PAGE_SIZE: usize = 5000;

/// One keyset page: up to `size` records with a key greater than `after_key`,
/// in ascending key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPageRequest {
    pub after_key: Option<String>,
    pub size: usize,
    pub options: ListPathsOptions,
}

impl PathPageRequest {
    /// Cursor, watermark and caller filter as one backend expression.
    pub fn filter_expression(&self) -> Option<String> {
        let cursor = self
            .after_key
            .as_ref()
            .map(|key| format!("key gt '{}'", key.replace('\'', "''")));
        concat_with_and([cursor.as_deref(), self.options.filter_expression().as_deref()])
    }
}

/// Read side of a path index.
#[async_trait]
pub trait PathIndexReader: Send + Sync {
    /// An empty page means there is nothing after `after_key`.
    async fn read_page(
        &self,
        request: &PathPageRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<PathRecord>>;
}

#[async_trait]
impl<R: PathIndexReader + ?Sized> PathIndexReader for Arc<R> {
    async fn read_page(
        &self,
        request: &PathPageRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<PathRecord>> {
        (**self).read_page(request, cancel).await
    }
}

/// Lists paths from a path index, page by page in key order.
pub struct PathIndexLister<R: ?Sized> {
    reader: Arc<R>,
    page_size: usize,
}

impl<R> PathIndexLister<R> {
    pub fn new(reader: R) -> Self {
        Self::from_arc(Arc::new(reader))
    }
}

impl<R: ?Sized> PathIndexLister<R> {
    pub fn from_arc(reader: Arc<R>) -> Self {
        Self {
            reader,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }
}

#[async_trait]
impl<R: PathIndexReader + ?Sized> PathLister for PathIndexLister<R> {
    async fn list(
        &self,
        options: &ListPathsOptions,
        output: &BoundedQueue<PathRecord>,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let mut request = PathPageRequest {
            after_key: None,
            size: self.page_size,
            options: options.clone(),
        };
        let mut listed = 0;

        loop {
            let page = self.reader.read_page(&request, cancel).await?;
            let Some(last_key) = page.last().map(|path| path.key().to_owned()) else {
                break;
            };
            if request.after_key.as_deref().is_some_and(|after| last_key.as_str() <= after) {
                return Err(Error::listing(format!(
                    "path index cursor did not advance past {last_key}"
                )));
            }

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::DEBUG,
                event = "lakeindex.listing.page",
                records = page.len(),
                last_key = %last_key,
                "lakeindex.listing.page"
            );

            for path in page.into_iter().filter(|path| options.admits(path)) {
                output.push(path, cancel).await?;
                listed += 1;
            }
            request.after_key = Some(last_key);
        }

        Ok(listed)
    }
}
