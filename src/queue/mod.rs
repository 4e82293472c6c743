pub mod record;
pub mod shared;

pub use record::{Job, JobResult};
pub use shared::SharedQueue;

/// Handle to the queue of jobs waiting for a worker.
pub type JobQueue = SharedQueue<Job>;

/// Handle to the queue of finished job results.
pub type ResultQueue = SharedQueue<JobResult>;
