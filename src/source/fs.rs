//! Local directory tree as a storage container.

use std::collections::VecDeque;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs::DirEntry;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::model::{ListPathsOptions, PathRecord};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::BoundedQueue;
use crate::source::{FileFetcher, PathLister, RawContent};

pub const DEFAULT_LIST_WIDTH: usize = 256;

/// Lists the regular files below `root`.
///
/// Directories are read concurrently, at most `width` at a time. The
/// watermark is compared against file mtimes and the caller filter is a
/// relative path prefix (`partition_43/`). Symlinks are not followed. An
/// unreadable root fails the listing; unreadable subdirectories are skipped.
#[derive(Debug, Clone)]
pub struct FsLister {
    root: PathBuf,
    container: String,
    width: usize,
}

struct DirListing {
    dirs: Vec<PathBuf>,
    files: Vec<(PathBuf, DateTime<Utc>)>,
}

impl FsLister {
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            container: container.into(),
            width: DEFAULT_LIST_WIDTH,
        }
    }

    /// A width of zero is treated as one.
    pub fn width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl PathLister for FsLister {
    async fn list(
        &self,
        options: &ListPathsOptions,
        output: &BoundedQueue<PathRecord>,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let root_meta = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| Error::listing(format!("{}: {e}", self.root.display())))?;
        if !root_meta.is_dir() {
            return Err(Error::listing(format!(
                "{}: not a directory",
                self.root.display()
            )));
        }

        let prefix = options
            .filter
            .as_deref()
            .map(|f| f.trim().trim_start_matches('/'))
            .filter(|f| !f.is_empty());

        let mut pending = VecDeque::from([self.root.clone()]);
        let mut tasks = JoinSet::new();
        let mut listed = 0;

        loop {
            while tasks.len() < self.width {
                let Some(dir) = pending.pop_front() else { break };
                tasks.spawn(async move {
                    let outcome = read_directory(&dir).await;
                    (dir, outcome)
                });
            }

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(Error::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            let (dir, outcome) = joined?;

            let listing = match outcome {
                Ok(listing) => listing,
                Err(err) if dir == self.root => {
                    return Err(Error::listing(format!("{}: {err}", dir.display())));
                }
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::WARN,
                        event = "lakeindex.listing.dir_skipped",
                        dir = %dir.display(),
                        error = %_err,
                        "lakeindex.listing.dir_skipped"
                    );
                    continue;
                }
            };

            for sub in listing.dirs {
                let keep = match (prefix, self.relative(&sub)) {
                    (Some(prefix), Some(rel)) => may_contain(&rel, prefix),
                    _ => true,
                };
                if keep {
                    pending.push_back(sub);
                }
            }

            for (file, modified) in listing.files {
                let Some(rel) = self.relative(&file) else {
                    continue;
                };
                if prefix.is_some_and(|prefix| !rel.starts_with(prefix)) {
                    continue;
                }
                let record = PathRecord::new(self.container.as_str(), &rel, modified);
                if !options.admits(&record) {
                    continue;
                }
                output.push(record, cancel).await?;
                listed += 1;
            }
        }

        Ok(listed)
    }
}

/// Whether files below `dir` can match `prefix`.
fn may_contain(dir: &str, prefix: &str) -> bool {
    let dir = format!("{dir}/");
    dir.starts_with(prefix) || prefix.starts_with(&dir)
}

/// Read one directory level.
///
/// Only a failure to open or iterate the directory fails it. An entry that
/// cannot be inspected, e.g. a file removed after the directory was read, is
/// skipped on its own.
async fn read_directory(dir: &Path) -> io::Result<DirListing> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut listing = DirListing {
        dirs: Vec::new(),
        files: Vec::new(),
    };
    while let Some(entry) = entries.next_entry().await? {
        match inspect_entry(&entry).await {
            Ok(Some(EntryKind::Dir)) => listing.dirs.push(entry.path()),
            Ok(Some(EntryKind::File(modified))) => listing.files.push((entry.path(), modified)),
            Ok(None) => {}
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::WARN,
                    event = "lakeindex.listing.entry_skipped",
                    path = %entry.path().display(),
                    error = %_err,
                    "lakeindex.listing.entry_skipped"
                );
            }
        }
    }
    Ok(listing)
}

enum EntryKind {
    Dir,
    File(DateTime<Utc>),
}

/// `None` for anything that is neither a directory nor a regular file.
async fn inspect_entry(entry: &DirEntry) -> io::Result<Option<EntryKind>> {
    let file_type = entry.file_type().await?;
    if file_type.is_dir() {
        return Ok(Some(EntryKind::Dir));
    }
    if !file_type.is_file() {
        return Ok(None);
    }
    let modified = entry.metadata().await?.modified()?;
    Ok(Some(EntryKind::File(DateTime::<Utc>::from(modified))))
}

/// Reads files below `root` by their relative path.
///
/// The container of a path is not consulted; `root` is the container.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &PathRecord) -> Result<PathBuf> {
        let decoded = path.decoded_path()?;
        let relative = Path::new(&*decoded);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(Error::fetch(&*decoded, "path escapes the root"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileFetcher for FsFetcher {
    async fn fetch(&self, path: &PathRecord, cancel: &CancelToken) -> Result<RawContent> {
        let full = self.resolve(path)?;
        let read = async {
            let bytes = tokio::fs::read(&full).await?;
            let meta = tokio::fs::metadata(&full).await?;
            io::Result::Ok((bytes, meta))
        };

        let (bytes, meta) = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            read = read => read.map_err(|e| Error::fetch(path.path_url_encoded(), e))?,
        };

        let mut content = RawContent::new(Bytes::from(bytes));
        if let Ok(modified) = meta.modified() {
            let nanos = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default();
            content = content.with_etag(format!("{nanos:x}-{:x}", meta.len()));
        }
        Ok(content)
    }
}
