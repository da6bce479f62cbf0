use thiserror::Error;

use crate::metrics::IndexerRunMetrics;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("pipeline error: {context}")]
    Pipeline { context: &'static str },

    #[error("invalid configuration: {field} {reason}")]
    Config { field: &'static str, reason: String },

    #[error("failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("failed to map {path}: {reason}")]
    Map { path: String, reason: String },

    #[error("listing failed: {reason}")]
    Listing { reason: String },

    #[error("upload failed: {reason}")]
    Upload { reason: String },

    #[error("queue already completed")]
    QueueCompleted,

    #[error("operation cancelled")]
    Cancelled,

    #[error("run cancelled after reading {} documents", .0.read_count)]
    RunCancelled(Box<IndexerRunMetrics>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn pipeline(context: &'static str) -> Self {
        Self::Pipeline { context }
    }

    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }

    pub fn fetch(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn map(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Map {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn listing(reason: impl ToString) -> Self {
        Self::Listing {
            reason: reason.to_string(),
        }
    }

    pub fn upload(reason: impl ToString) -> Self {
        Self::Upload {
            reason: reason.to_string(),
        }
    }

    /// True for the two cancellation variants.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::RunCancelled(_))
    }
}
