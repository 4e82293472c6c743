use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::process::Command;
use tokio::task::JoinSet;

use crate::config::{ServerEndpoint, WorkerConfig};
use crate::dispatch::WorkerLauncher;
use crate::error::Result;
use crate::worker::runner::Worker;

/// Environment variable carrying the shared secret to child worker processes.
pub const SECRET_ENV: &str = "CALCIT_SECRET";

/// How the workers of a pool are run.
#[derive(Debug, Clone)]
pub enum PoolMode {
    /// One OS process per worker, running `<program> worker ...`.
    Process { program: PathBuf },
    /// One tokio task per worker inside the current process.
    InProcess,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub workers: usize,
    /// Workers that could not connect or exited abnormally.
    pub failed: usize,
    /// Jobs run, counted for in-process workers only.
    pub jobs_run: usize,
}

/// A fixed number of sibling workers on one node.
///
/// Workers share nothing but the two remote queues and compete for jobs
/// through the job queue's pop.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    template: WorkerConfig,
    size: usize,
}

impl WorkerPool {
    /// `template` is cloned per worker; each copy gets its own name.
    pub fn new(template: WorkerConfig, size: usize) -> Self {
        Self { template, size }
    }

    fn worker_config(&self, index: usize) -> WorkerConfig {
        self.template
            .clone()
            .with_name(format!("{}-{}", self.template.name, index))
    }

    /// Start every worker and wait until all of them have finished.
    pub async fn run(&self, mode: &PoolMode) -> PoolSummary {
        tracing::info!(
            workers = self.size,
            server = %self.template.endpoint.authority(),
            mode = ?mode,
            "Launching worker pool"
        );
        let summary = match mode {
            PoolMode::InProcess => self.run_in_process().await,
            PoolMode::Process { program } => self.run_processes(program).await,
        };
        tracing::info!(
            workers = summary.workers,
            failed = summary.failed,
            jobs_run = summary.jobs_run,
            "Worker pool finished"
        );
        summary
    }

    async fn run_in_process(&self) -> PoolSummary {
        let mut set = JoinSet::new();
        for index in 0..self.size {
            let config = self.worker_config(index);
            set.spawn(async move {
                let worker = Worker::connect(&config).await?;
                worker.run().await
            });
        }

        let mut summary = PoolSummary {
            workers: self.size,
            ..Default::default()
        };
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(jobs_run)) => summary.jobs_run += jobs_run,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Worker failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Worker task panicked");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    async fn run_processes(&self, program: &Path) -> PoolSummary {
        let mut summary = PoolSummary {
            workers: self.size,
            ..Default::default()
        };
        let mut children = Vec::with_capacity(self.size);

        for index in 0..self.size {
            let config = self.worker_config(index);
            let spawned = Command::new(program)
                .arg("worker")
                .arg("--host")
                .arg(&config.endpoint.host)
                .arg("--port")
                .arg(config.endpoint.port.to_string())
                .arg("--name")
                .arg(&config.name)
                .arg("--post-delay-ms")
                .arg(config.post_delay.as_millis().to_string())
                .env(SECRET_ENV, config.endpoint.secret.to_string_lossy())
                .kill_on_drop(false)
                .spawn();

            match spawned {
                Ok(child) => children.push((config.name, child)),
                Err(e) => {
                    tracing::error!(worker = %config.name, error = %e, "Failed to spawn worker process");
                    summary.failed += 1;
                }
            }
        }

        for (name, mut child) in children {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::debug!(worker = %name, "Worker process exited");
                }
                Ok(status) => {
                    tracing::warn!(worker = %name, exit_code = ?status.code(), "Worker process failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!(worker = %name, error = %e, "Failed to wait for worker process");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

/// Launches an in-process worker pool next to the coordinator.
///
/// Useful for single-machine runs and tests; no remote shell involved.
#[derive(Debug, Clone)]
pub struct LocalPool {
    size: usize,
}

impl LocalPool {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

#[tonic::async_trait]
impl WorkerLauncher for LocalPool {
    async fn launch(&self, endpoint: &ServerEndpoint) -> Result<()> {
        let config = WorkerConfig::new(endpoint.clone());
        let pool = WorkerPool::new(config, self.size);
        // Fire and forget, like remote dispatch.
        tokio::spawn(async move {
            pool.run(&PoolMode::InProcess).await;
        });
        Ok(())
    }
}
