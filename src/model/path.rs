use std::borrow::Cow;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::document::IndexDocument;

const KEY_SEPARATOR: char = '/';

/// One file in the storage tree.
///
/// The key is derived from container and path only, so the same file always
/// maps to the same key and equal paths in different containers never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRecord {
    key: String,
    container: String,
    path_url_encoded: String,
    last_modified: DateTime<Utc>,
}

impl PathRecord {
    /// Build a record from a container name and a plain (decoded) relative path.
    pub fn new(
        container: impl Into<String>,
        path: &str,
        last_modified: DateTime<Utc>,
    ) -> Self {
        let container = container.into();
        let path = path.trim_start_matches('/');
        Self {
            key: derive_key(&container, path),
            path_url_encoded: urlencoding::encode(path).into_owned(),
            container,
            last_modified,
        }
    }

    /// Parse a blob URL such as `https://account.host/container/dir/file.json`.
    pub fn from_blob_url(url: &str, last_modified: DateTime<Utc>) -> Result<Self> {
        let mut parts = url.splitn(5, '/');
        let (Some(_scheme), Some(""), Some(_host), Some(container), Some(path)) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(Error::listing(format!("not a blob url: {url}")));
        };
        if container.is_empty() || path.is_empty() {
            return Err(Error::listing(format!("blob url has no path: {url}")));
        }
        let path = urlencoding::decode(path).map_err(Error::listing)?;
        Ok(Self::new(container, &path, last_modified))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn path_url_encoded(&self) -> &str {
        &self.path_url_encoded
    }

    pub fn decoded_path(&self) -> Result<Cow<'_, str>> {
        urlencoding::decode(&self.path_url_encoded)
            .map_err(|e| Error::fetch(self.path_url_encoded.clone(), e))
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

impl IndexDocument for PathRecord {
    fn key(&self) -> &str {
        &self.key
    }
}

fn derive_key(container: &str, path: &str) -> String {
    let mut raw = String::with_capacity(container.len() + path.len() + 1);
    raw.push_str(container);
    raw.push(KEY_SEPARATOR);
    raw.push_str(path);
    URL_SAFE.encode(raw)
}
