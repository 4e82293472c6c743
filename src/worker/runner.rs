use std::fmt;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::grpc::QueueClient;
use crate::queue::JobResult;
use crate::worker::executor::CommandExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Connecting,
    Connected,
    Pull,
    Run,
    Push,
    Drained,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Connecting => write!(f, "connecting"),
            WorkerState::Connected => write!(f, "connected"),
            WorkerState::Pull => write!(f, "pull"),
            WorkerState::Run => write!(f, "run"),
            WorkerState::Push => write!(f, "push"),
            WorkerState::Drained => write!(f, "drained"),
        }
    }
}

/// A connected worker that pulls jobs until the job queue is empty.
pub struct Worker {
    client: QueueClient,
    executor: CommandExecutor,
    state: WorkerState,
}

impl Worker {
    /// Connect to the queue server.
    ///
    /// # Errors
    ///
    /// Connection failures are fatal for this worker; there is no retry.
    pub async fn connect(config: &WorkerConfig) -> Result<Self> {
        tracing::debug!(
            worker = %config.name,
            server = %config.endpoint.authority(),
            state = %WorkerState::Connecting,
            "Worker starting"
        );
        let client =
            QueueClient::connect(&config.endpoint, config.name.clone(), config.connect_timeout)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        worker = %config.name,
                        server = %config.endpoint.authority(),
                        error = %e,
                        "Worker failed to connect"
                    )
                })?;

        Ok(Self {
            client,
            executor: CommandExecutor::new().with_post_delay(config.post_delay),
            state: WorkerState::Connected,
        })
    }

    pub fn name(&self) -> &str {
        self.client.name()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Pull, run and push jobs until the queue reports empty.
    ///
    /// Returns the number of jobs this worker ran. A job whose command
    /// fails is still pushed as a normal result.
    pub async fn run(mut self) -> Result<usize> {
        let mut jobs_run = 0;

        loop {
            self.state = WorkerState::Pull;
            let Some(job) = self.client.try_pop_job().await? else {
                self.state = WorkerState::Drained;
                break;
            };

            self.state = WorkerState::Run;
            tracing::info!(worker = %self.name(), job = %job.identifier, "Running job");
            let execution = self.executor.execute(&job.command).await;

            self.state = WorkerState::Push;
            let result = JobResult {
                job_id: job.id,
                identifier: job.identifier,
                elapsed_seconds: execution.elapsed_seconds(),
                stdout: execution.stdout,
                stderr: execution.stderr,
                worker: self.client.name().to_string(),
            };
            // Returns only once the server has stored the result.
            self.client.push_result(result).await?;
            jobs_run += 1;
        }

        tracing::info!(worker = %self.name(), jobs_run, state = %self.state, "Job queue drained");
        Ok(jobs_run)
    }
}
