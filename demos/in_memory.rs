//! In-memory indexing run
//!
//! Run with:
//!   cargo run --example in_memory
//!
//! Indexes a few hundred generated JSON files into a `MemoryIndex`, twice.
//! The first run creates every document, the second one modifies them.
//! One file is not valid JSON and one key is rejected by the index, so the
//! metrics show how failures are counted without stopping the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lakeindex::error::Result;
use lakeindex::prelude::*;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct Reading {
    sensor: String,
    value: f64,
}

#[derive(Serialize)]
struct ReadingDoc {
    key: String,
    sensor: String,
    value: f64,
    path: String,
}

impl IndexDocument for ReadingDoc {
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

    let now = Utc::now();
    let paths: Vec<PathRecord> = (0..500)
        .map(|i| PathRecord::new("telemetry", &format!("day={}/reading_{i}.json", i % 7), now))
        .collect();

    let fetcher = MemoryFetcher::new();
    for (i, path) in paths.iter().enumerate() {
        let body = if i == 13 {
            "{ truncated".to_owned()
        } else {
            format!(r#"{{"sensor":"s{}","value":{}}}"#, i % 20, i as f64 / 10.0)
        };
        fetcher.insert(path, body);
    }

    let index = Arc::new(MemoryIndex::new());
    index.reject_key(paths[42].key());

    let indexer = DataLakeIndexer::new(
        fetcher,
        Arc::clone(&index),
        IndexerOptions::new()
            .batch_size(64)
            .upload_concurrency(2)
            .progress_interval(Some(Duration::from_millis(200))),
    )
    .observer(Arc::new(|progress: &Progress| {
        println!("[{:>6.2?}] {}", progress.elapsed, progress.metrics);
    }));

    for round in 1..=2 {
        let mapper = JsonMapper::<Reading, _>::new(|path: &PathRecord, reading: Reading| -> Option<ReadingDoc> {
            Some(ReadingDoc {
                key: path.key().to_owned(),
                sensor: reading.sensor,
                value: reading.value,
                path: path.path_url_encoded().to_owned(),
            })
        });

        let metrics = indexer
            .run(VecLister::new(paths.clone()), mapper, ListPathsOptions::new(), &CancelToken::new())
            .await?
            .into_result()?;

        println!(
            "round {round}: listed={} read={} read_failed={} created={} modified={} failed={} in {:?}",
            metrics.listed_count,
            metrics.read_count,
            metrics.read_failed_count,
            metrics.upload_created_count,
            metrics.upload_modified_count,
            metrics.upload_failed_count,
            metrics.elapsed,
        );
    }

    println!("index holds {} documents", index.len());
    Ok(())
}
