//! Caller-supplied mapping from raw file content to index documents.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::model::PathRecord;
use crate::source::RawContent;

/// Turns one file into at most one document.
///
/// `Ok(None)` means the file is not relevant and is dropped without being
/// counted as a failure. `Err` counts as a read failure for that path.
#[async_trait]
pub trait Mapper<D>: Send + Sync {
    async fn map(&self, path: &PathRecord, content: RawContent) -> Result<Option<D>>;
}

#[async_trait]
impl<D, M> Mapper<D> for Arc<M>
where
    D: Send + 'static,
    M: Mapper<D> + ?Sized,
{
    async fn map(&self, path: &PathRecord, content: RawContent) -> Result<Option<D>> {
        (**self).map(path, content).await
    }
}

/// Adapts a synchronous closure.
#[derive(Clone, Copy)]
pub struct MapFn<F>(pub F);

impl<F> fmt::Debug for MapFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MapFn")
    }
}

#[async_trait]
impl<D, F> Mapper<D> for MapFn<F>
where
    D: Send + 'static,
    F: Fn(&PathRecord, RawContent) -> Result<Option<D>> + Send + Sync,
{
    async fn map(&self, path: &PathRecord, content: RawContent) -> Result<Option<D>> {
        (self.0)(path, content)
    }
}

/// Parses the content as JSON into `T`, then builds the document from it.
///
/// Content that is not valid JSON for `T` is a map error carrying the path.
pub struct JsonMapper<T, F> {
    build: F,
    _model: PhantomData<fn() -> T>,
}

impl<T, F> JsonMapper<T, F> {
    pub fn new(build: F) -> Self {
        Self {
            build,
            _model: PhantomData,
        }
    }
}

impl<T, F> fmt::Debug for JsonMapper<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonMapper")
            .field("model", &std::any::type_name::<T>())
            .finish()
    }
}

#[async_trait]
impl<T, D, F> Mapper<D> for JsonMapper<T, F>
where
    T: DeserializeOwned,
    D: Send + 'static,
    F: Fn(&PathRecord, T) -> Option<D> + Send + Sync,
{
    async fn map(&self, path: &PathRecord, content: RawContent) -> Result<Option<D>> {
        let model: T = serde_json::from_slice(&content.bytes)
            .map_err(|e| Error::map(path.path_url_encoded(), e))?;
        Ok((self.build)(path, model))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Article {
        title: String,
        draft: bool,
    }

    fn path() -> PathRecord {
        PathRecord::new("lake", "articles/1.json", Utc::now())
    }

    #[tokio::test]
    async fn json_mapper_builds_or_skips() {
        let mapper = JsonMapper::<Article, _>::new(|_: &PathRecord, article: Article| {
            (!article.draft).then_some(article.title)
        });

        let published = RawContent::new(r#"{"title":"Hello","draft":false}"#);
        let draft = RawContent::new(r#"{"title":"Later","draft":true}"#);

        assert_eq!(
            mapper.map(&path(), published).await.unwrap(),
            Some("Hello".to_string())
        );
        assert_eq!(mapper.map(&path(), draft).await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_mapper_reports_the_path_on_bad_content() {
        let mapper = JsonMapper::<Article, _>::new(|_: &PathRecord, article: Article| {
            Some(article.title)
        });
        let err = mapper
            .map(&path(), RawContent::new("not json"))
            .await
            .unwrap_err();
        match err {
            Error::Map { path, .. } => assert_eq!(path, "articles%2F1.json"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn map_fn_passes_through() {
        let mapper = MapFn(
            |path: &PathRecord, content: RawContent| -> Result<Option<(String, usize)>> {
                Ok(Some((path.key().to_owned(), content.len())))
            },
        );
        let (key, len) = mapper
            .map(&path(), RawContent::new("abc"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key, path().key());
        assert_eq!(len, 3);
    }
}
