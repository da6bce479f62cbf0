pub mod document;
pub mod options;
pub mod path;

pub use document::IndexDocument;
pub use options::ListPathsOptions;
pub use path::PathRecord;
