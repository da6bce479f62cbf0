//! Size estimation, count/byte bounded batching and the batch upload stage.

pub mod accumulator;
pub mod size;
pub mod uploader;

pub use accumulator::{Admission, Batch, BatchAccumulator};
pub use size::{json_size, ByteCounter, Measured};
pub use uploader::BatchingUploader;
