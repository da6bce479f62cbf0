//! The indexer: configuration, the listing and read stages, the orchestrator
//! and path-index maintenance.

pub mod config;
pub mod list;
pub mod orchestrator;
pub mod path_index;
pub mod read;

pub use config::IndexerOptions;
pub use list::list_paths_stage;
pub use orchestrator::DataLakeIndexer;
pub use path_index::{PathIndexer, UpsertPathsResult};
pub use read::DocumentReader;
