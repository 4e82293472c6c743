use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::proto::queue_service_server::QueueService;
use crate::proto::{
    HandshakeRequest, HandshakeResponse, JobRecord, PopResultRequest, PushResponse, ResultRecord,
    TryPopJobRequest, TryPopJobResponse,
};
use crate::queue::{Job, JobQueue, JobResult, ResultQueue};

/// gRPC front end for the job and result queues.
///
/// Authentication happens in an interceptor, so every handler here can
/// assume the caller presented the right secret.
pub struct QueueServiceImpl {
    jobs: JobQueue,
    results: ResultQueue,
    connected_workers: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl QueueServiceImpl {
    pub fn new(
        jobs: JobQueue,
        results: ResultQueue,
        connected_workers: Arc<AtomicU64>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            jobs,
            results,
            connected_workers,
            shutdown,
        }
    }
}

#[tonic::async_trait]
impl QueueService for QueueServiceImpl {
    async fn handshake(
        &self,
        request: Request<HandshakeRequest>,
    ) -> Result<Response<HandshakeResponse>, Status> {
        let req = request.into_inner();
        let connected = self.connected_workers.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(worker = %req.worker_name, connected, "Worker connected");
        Ok(Response::new(HandshakeResponse {
            connected_workers: connected,
        }))
    }

    async fn push_job(
        &self,
        request: Request<JobRecord>,
    ) -> Result<Response<PushResponse>, Status> {
        let job = Job::try_from(request.into_inner())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        if job.command.trim().is_empty() {
            return Err(Status::invalid_argument("Command cannot be empty"));
        }
        tracing::debug!(job = %job.identifier, "Job pushed remotely");
        let queue_len = self.jobs.push(job).await as u64;
        Ok(Response::new(PushResponse { queue_len }))
    }

    async fn try_pop_job(
        &self,
        _request: Request<TryPopJobRequest>,
    ) -> Result<Response<TryPopJobResponse>, Status> {
        let job = self.jobs.try_pop().await;
        if let Some(ref job) = job {
            tracing::debug!(job = %job.identifier, "Job handed out");
        }
        Ok(Response::new(TryPopJobResponse {
            job: job.map(JobRecord::from),
        }))
    }

    async fn push_result(
        &self,
        request: Request<ResultRecord>,
    ) -> Result<Response<PushResponse>, Status> {
        let result = JobResult::try_from(request.into_inner())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        tracing::debug!(job = %result.identifier, worker = %result.worker, "Result received");
        let queue_len = self.results.push(result).await as u64;
        Ok(Response::new(PushResponse { queue_len }))
    }

    async fn pop_result(
        &self,
        _request: Request<PopResultRequest>,
    ) -> Result<Response<ResultRecord>, Status> {
        tokio::select! {
            result = self.results.pop() => Ok(Response::new(ResultRecord::from(result))),
            _ = self.shutdown.cancelled() => {
                Err(Status::unavailable("Queue server is shutting down"))
            }
        }
    }
}
