use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{CoordinatorConfig, ServerEndpoint};
use crate::dispatch::WorkerLauncher;
use crate::error::Result;
use crate::grpc::QueueServer;
use crate::queue::{Job, JobQueue, JobResult, ResultQueue};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every submitted job reported a result.
    Complete,
    /// Waiting for the next result exceeded the configured timeout.
    TimedOut,
    /// The run was cancelled externally (e.g. SIGINT).
    Interrupted,
    /// Nothing was submitted.
    DryRun,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Complete => write!(f, "complete"),
            RunOutcome::TimedOut => write!(f, "timed out"),
            RunOutcome::Interrupted => write!(f, "interrupted"),
            RunOutcome::DryRun => write!(f, "dry run"),
        }
    }
}

/// One collected result, with output decoded for display.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    pub job_id: Uuid,
    pub identifier: String,
    pub worker: String,
    pub elapsed_seconds: f64,
    pub stdout: String,
    pub stderr: String,
}

impl From<&JobResult> for ResultSummary {
    fn from(result: &JobResult) -> Self {
        Self {
            job_id: result.job_id,
            identifier: result.identifier.clone(),
            worker: result.worker.clone(),
            elapsed_seconds: result.elapsed_seconds,
            stdout: result.stdout_lossy(),
            stderr: result.stderr_lossy(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub submitted: usize,
    pub completed: usize,
    pub results: Vec<ResultSummary>,
    /// Identifiers of submitted jobs with no result when the run ended.
    pub missing: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, RunOutcome::Complete | RunOutcome::DryRun)
    }
}

/// Owns one run: queue server, worker launch, submission and collection.
pub struct Coordinator {
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    /// Run every job to completion (or until timeout/cancellation).
    ///
    /// Steps:
    /// 1. Start the queue server
    /// 2. Enqueue all jobs, in input order
    /// 3. Launch workers through `launcher`
    /// 4. Pop exactly one result per submitted job
    /// 5. Shut the server down, also when 3-4 fail
    ///
    /// With no jobs, steps 3-4 are skipped and the server stops at once,
    /// without the shutdown grace.
    ///
    /// All jobs are enqueued before any worker starts, so a worker that sees
    /// an empty queue can safely exit.
    pub async fn run<L: WorkerLauncher + ?Sized>(
        &self,
        jobs: Vec<Job>,
        launcher: &L,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let started_at = Utc::now();

        if self.config.dry_run {
            for job in &jobs {
                tracing::info!(job = %job.identifier, command = %job.command, "Dry run, not submitting job");
            }
            return Ok(RunReport {
                outcome: RunOutcome::DryRun,
                submitted: 0,
                completed: 0,
                results: Vec::new(),
                missing: Vec::new(),
                started_at,
                finished_at: Utc::now(),
            });
        }

        let server = QueueServer::start(&self.config.server).await?;
        let submitted: Vec<(Uuid, String)> = jobs
            .iter()
            .map(|job| (job.id, job.identifier.clone()))
            .collect();
        let total = submit_jobs(jobs, &server.job_queue()).await;

        if total == 0 {
            tracing::info!("No jobs submitted, nothing to wait for");
            // No worker was launched, so nothing can be mid-request.
            server.shutdown_now().await;
            return Ok(RunReport {
                outcome: RunOutcome::Complete,
                submitted: 0,
                completed: 0,
                results: Vec::new(),
                missing: Vec::new(),
                started_at,
                finished_at: Utc::now(),
            });
        }

        let outcome = self
            .drive(&server, &submitted, launcher, cancel, started_at)
            .await;
        server.shutdown().await;
        outcome
    }

    /// Launch workers for the already enqueued jobs and collect results.
    async fn drive<L: WorkerLauncher + ?Sized>(
        &self,
        server: &QueueServer,
        submitted: &[(Uuid, String)],
        launcher: &L,
        cancel: CancellationToken,
        started_at: DateTime<Utc>,
    ) -> Result<RunReport> {
        let total = submitted.len();

        let endpoint = ServerEndpoint::new(
            self.config.advertise_host.clone(),
            server.local_addr().port(),
            self.config.server.secret.clone(),
        );
        launcher.launch(&endpoint).await?;

        let (outcome, results) = self
            .collect_results(submitted, &server.result_queue(), &cancel)
            .await;

        let seen: HashSet<Uuid> = results.iter().map(|r| r.job_id).collect();
        let missing: Vec<String> = submitted
            .iter()
            .filter(|(id, _)| !seen.contains(id))
            .map(|(_, identifier)| identifier.clone())
            .collect();

        tracing::info!(
            outcome = %outcome,
            submitted = total,
            completed = results.len(),
            connected_workers = server.connected_workers(),
            "Run finished"
        );

        Ok(RunReport {
            outcome,
            submitted: total,
            completed: results.len(),
            results: results.iter().map(ResultSummary::from).collect(),
            missing,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Pop results until one per submitted job has arrived.
    ///
    /// Results are matched to jobs by id only for reporting; an unknown or
    /// repeated id is logged but still counts towards the total.
    async fn collect_results(
        &self,
        submitted: &[(Uuid, String)],
        results: &ResultQueue,
        cancel: &CancellationToken,
    ) -> (RunOutcome, Vec<JobResult>) {
        let total = submitted.len();
        let mut pending: HashSet<Uuid> = submitted.iter().map(|(id, _)| *id).collect();
        let mut collected = Vec::with_capacity(total);

        while collected.len() < total {
            let next = async {
                match self.config.result_timeout {
                    Some(timeout) => results.pop_timeout(timeout).await,
                    None => Some(results.pop().await),
                }
            };

            let result = tokio::select! {
                result = next => result,
                _ = cancel.cancelled() => {
                    tracing::warn!(completed = collected.len(), total, "Run interrupted");
                    return (RunOutcome::Interrupted, collected);
                }
            };

            let Some(result) = result else {
                tracing::warn!(
                    completed = collected.len(),
                    total,
                    timeout_s = self.config.result_timeout.map(|t| t.as_secs_f64()),
                    "Timed out waiting for results"
                );
                return (RunOutcome::TimedOut, collected);
            };

            if !pending.remove(&result.job_id) {
                tracing::warn!(
                    job = %result.identifier,
                    job_id = %result.job_id,
                    "Result does not match an outstanding job"
                );
            }

            log_result(&result, collected.len() + 1, total);
            collected.push(result);
        }

        (RunOutcome::Complete, collected)
    }
}

/// Enqueue every job in order. Returns the number submitted.
async fn submit_jobs(jobs: Vec<Job>, queue: &JobQueue) -> usize {
    let total = jobs.len();
    tracing::info!(total, "Submitting jobs to the queue");
    for job in jobs {
        tracing::info!(job = %job.identifier, command = %job.command, "Job added to queue");
        queue.push(job).await;
    }
    total
}

fn log_result(result: &JobResult, completed: usize, total: usize) {
    tracing::info!(
        job = %result.identifier,
        worker = %result.worker,
        "Finished '{}' ({} of {}) in {:.2}s",
        result.identifier,
        completed,
        total,
        result.elapsed_seconds
    );
    let stdout = result.stdout_lossy();
    if !stdout.trim_end().is_empty() {
        tracing::info!(job = %result.identifier, "STDOUT: {}", stdout.trim_end_matches('\n'));
    }
    let stderr = result.stderr_lossy();
    if !stderr.trim_end().is_empty() {
        tracing::info!(job = %result.identifier, "STDERR: {}", stderr.trim_end_matches('\n'));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RunOutcome) -> RunReport {
        RunReport {
            outcome,
            submitted: 1,
            completed: 0,
            results: Vec::new(),
            missing: vec!["a".to_string()],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn only_complete_and_dry_runs_count_as_complete() {
        assert!(report(RunOutcome::Complete).is_complete());
        assert!(report(RunOutcome::DryRun).is_complete());
        assert!(!report(RunOutcome::TimedOut).is_complete());
        assert!(!report(RunOutcome::Interrupted).is_complete());
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_value(report(RunOutcome::TimedOut)).unwrap();
        assert_eq!(json["outcome"], "timed_out");
        assert_eq!(json["missing"][0], "a");
    }

    #[tokio::test]
    async fn submit_jobs_preserves_order() {
        let queue = JobQueue::new();
        let jobs = vec![Job::new("a", "echo a"), Job::new("b", "echo b")];
        assert_eq!(submit_jobs(jobs, &queue).await, 2);
        assert_eq!(queue.try_pop().await.unwrap().identifier, "a");
        assert_eq!(queue.try_pop().await.unwrap().identifier, "b");
    }
}
