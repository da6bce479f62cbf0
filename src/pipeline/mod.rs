//! Pipeline building blocks: cancellation, bounded queues, the parallel
//! stage runner and the progress ticker.

pub mod cancel;
pub mod progress;
pub mod queue;
pub mod stage;

pub use cancel::CancelToken;
pub use progress::{Progress, ProgressObserver, ProgressTicker};
pub use queue::{BoundedQueue, CompleteOnDrop};
pub use stage::{ParallelStage, StageCounters, StageReport};
