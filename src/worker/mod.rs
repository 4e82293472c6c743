//! Worker side of a run.
//!
//! - [`CommandExecutor`]: runs one shell command and captures its output
//! - [`Worker`]: connects to the queue server and drains the job queue
//! - [`WorkerPool`]: runs several workers on one node and waits for them
//!
//! # Worker lifecycle
//!
//! `CONNECTING -> CONNECTED -> (PULL -> RUN -> PUSH)* -> DRAINED`
//!
//! A worker exits the first time it finds the job queue empty. That is only
//! correct because the coordinator enqueues every job before any worker is
//! started.

pub mod executor;
pub mod pool;
pub mod runner;

pub use executor::{CommandExecutor, Execution};
pub use pool::{LocalPool, PoolMode, PoolSummary, WorkerPool};
pub use runner::{Worker, WorkerState};
