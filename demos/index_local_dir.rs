//! Index a local directory tree
//!
//! Run with:
//!   cargo run --example index_local_dir --features fs -- <root> [prefix]
//!
//! Every `*.json` file below `<root>` becomes one document holding its path,
//! size and top-level keys. Other files are skipped by the mapper. Ctrl-C
//! cancels the run; the partial metrics are still printed.

use std::sync::Arc;

use lakeindex::error::{Error, Result};
use lakeindex::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct FileDoc {
    key: String,
    path: String,
    bytes: usize,
    fields: Vec<String>,
}

impl IndexDocument for FileDoc {
    fn key(&self) -> &str {
        &self.key
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lakeindex=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let root = args
        .next()
        .ok_or_else(|| Error::config("root", "usage: index_local_dir <root> [prefix]"))?;
    let mut list_options = ListPathsOptions::new();
    if let Some(prefix) = args.next() {
        list_options = list_options.filter(prefix);
    }

    let index = Arc::new(MemoryIndex::new());
    let indexer = DataLakeIndexer::new(FsFetcher::new(&root), Arc::clone(&index), IndexerOptions::new());

    let mapper = MapFn(|path: &PathRecord, content: RawContent| -> Result<Option<FileDoc>> {
        let decoded = path.decoded_path()?;
        if !decoded.ends_with(".json") {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(&content.bytes)
            .map_err(|e| Error::map(path.path_url_encoded(), e))?;
        let fields = value
            .as_object()
            .map(|object| object.keys().cloned().collect())
            .unwrap_or_default();
        Ok(Some(FileDoc {
            key: path.key().to_owned(),
            path: decoded.into_owned(),
            bytes: content.len(),
            fields,
        }))
    });

    let cancel = CancelToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let metrics = indexer
        .run(FsLister::new(&root, "local"), mapper, list_options, &cancel)
        .await?;

    println!("{}", serde_json::to_string_pretty(&metrics)?);
    println!("index holds {} documents", index.len());
    metrics.into_result().map(|_| ())
}
