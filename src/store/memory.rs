use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{IndexDocument, PathRecord};
use crate::pipeline::cancel::CancelToken;
use crate::source::path_index::{PathIndexReader, PathPageRequest};
use crate::store::{IndexingResult, SearchUploader};

/// In-process search index.
///
/// Reports 201 for new keys and 200 for existing ones, like a real backend.
/// Keys can be marked as rejected (400) and whole calls can be made to fail,
/// which is what tests and dry runs need.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: Mutex<HashMap<String, Value>>,
    rejected_keys: Mutex<HashSet<String>>,
    failing_calls: AtomicU64,
    calls: AtomicU64,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents with this key get a 400 status.
    pub fn reject_key(&self, key: impl Into<String>) {
        lock(&self.rejected_keys).insert(key.into());
    }

    /// The next `calls` upload calls fail as a whole.
    pub fn fail_next_calls(&self, calls: u64) {
        self.failing_calls.store(calls, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        lock(&self.documents).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.documents).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.documents).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of upload calls received, including failed ones.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn write<D: IndexDocument>(
        &self,
        batch: &[D],
        merge: bool,
        cancel: &CancelToken,
    ) -> Result<Vec<IndexingResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let failing = self
            .failing_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(Error::upload("injected call failure"));
        }

        let values = batch
            .iter()
            .map(|doc| Ok((doc.key().to_owned(), serde_json::to_value(doc)?)))
            .collect::<Result<Vec<_>>>()?;

        let rejected = lock(&self.rejected_keys).clone();
        let mut documents = lock(&self.documents);
        let results = values
            .into_iter()
            .map(|(key, value)| {
                if rejected.contains(&key) {
                    return IndexingResult::failed(key, 400, "document rejected");
                }
                match documents.get_mut(&key) {
                    Some(existing) => {
                        if merge {
                            merge_into(existing, value);
                        } else {
                            *existing = value;
                        }
                        IndexingResult::modified(key)
                    }
                    None => {
                        documents.insert(key.clone(), value);
                        IndexingResult::created(key)
                    }
                }
            })
            .collect();
        Ok(results)
    }
}

#[async_trait]
impl<D: IndexDocument> SearchUploader<D> for MemoryIndex {
    async fn upload(&self, batch: &[D], cancel: &CancelToken) -> Result<Vec<IndexingResult>> {
        self.write(batch, false, cancel)
    }

    async fn merge_or_upload(
        &self,
        batch: &[D],
        cancel: &CancelToken,
    ) -> Result<Vec<IndexingResult>> {
        self.write(batch, true, cancel)
    }
}

/// Serves keyset pages of stored path records.
///
/// Only the watermark is applied; the caller filter expression is meant for a
/// real backend and is not interpreted here.
#[async_trait]
impl PathIndexReader for MemoryIndex {
    async fn read_page(
        &self,
        request: &PathPageRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<PathRecord>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let documents = lock(&self.documents);
        let mut keys: Vec<&String> = documents
            .keys()
            .filter(|key| request.after_key.as_ref().map_or(true, |after| *key > after))
            .collect();
        keys.sort();

        let mut page = Vec::new();
        for key in keys {
            if page.len() >= request.size {
                break;
            }
            let path: PathRecord = serde_json::from_value(documents[key].clone())?;
            if request.options.admits(&path) {
                page.push(path);
            }
        }
        Ok(page)
    }
}

/// Shallow merge: top-level fields of `update` overwrite those of `target`.
fn merge_into(target: &mut Value, update: Value) {
    match (target, update) {
        (Value::Object(target), Value::Object(update)) => {
            for (field, value) in update {
                target.insert(field, value);
            }
        }
        (target, update) => *target = update,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
