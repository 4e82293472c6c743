use std::time::Duration;

use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;

use crate::auth::SecretInjector;
use crate::config::ServerEndpoint;
use crate::error::{CalcitError, Result};
use crate::proto::queue_service_client::QueueServiceClient;
use crate::proto::{HandshakeRequest, JobRecord, PopResultRequest, ResultRecord, TryPopJobRequest};
use crate::queue::{Job, JobResult};

type AuthenticatedChannel = InterceptedService<Channel, SecretInjector>;

/// Remote handle to a queue server's job and result queues.
///
/// Obtained only through [`QueueClient::connect`], which fails when the
/// shared secret is rejected.
#[derive(Clone)]
pub struct QueueClient {
    inner: QueueServiceClient<AuthenticatedChannel>,
    name: String,
    connected_workers: u64,
}

impl QueueClient {
    /// Dial the server and verify the shared secret with a handshake.
    ///
    /// # Errors
    ///
    /// [`CalcitError::Unauthenticated`] if the secret does not match, a
    /// transport error if the server cannot be reached. No retries.
    pub async fn connect(
        endpoint: &ServerEndpoint,
        name: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let uri = format!("http://{}", endpoint.authority());
        let channel = Endpoint::from_shared(uri)?
            .connect_timeout(connect_timeout)
            .connect()
            .await?;

        let mut inner = QueueServiceClient::with_interceptor(
            channel,
            SecretInjector::new(endpoint.secret.clone()),
        );

        let response = inner
            .handshake(HandshakeRequest {
                worker_name: name.clone(),
            })
            .await
            .map_err(map_status)?
            .into_inner();

        tracing::debug!(
            server = %endpoint.authority(),
            worker = %name,
            connected_workers = response.connected_workers,
            "Connected to queue server"
        );

        Ok(Self {
            inner,
            name,
            connected_workers: response.connected_workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Workers connected at the time of our handshake, ourselves included.
    pub fn connected_workers(&self) -> u64 {
        self.connected_workers
    }

    /// Non-blocking pop. `None` means the job queue is empty.
    pub async fn try_pop_job(&mut self) -> Result<Option<Job>> {
        let response = self
            .inner
            .try_pop_job(TryPopJobRequest {})
            .await
            .map_err(map_status)?
            .into_inner();
        response.job.map(Job::try_from).transpose()
    }

    pub async fn push_job(&mut self, job: Job) -> Result<u64> {
        let response = self
            .inner
            .push_job(JobRecord::from(job))
            .await
            .map_err(map_status)?;
        Ok(response.into_inner().queue_len)
    }

    /// Push a result and wait for the server to acknowledge it is stored.
    pub async fn push_result(&mut self, result: JobResult) -> Result<u64> {
        let response = self
            .inner
            .push_result(ResultRecord::from(result))
            .await
            .map_err(map_status)?;
        Ok(response.into_inner().queue_len)
    }

    /// Blocking pop from the result queue.
    pub async fn pop_result(&mut self) -> Result<JobResult> {
        let record = self
            .inner
            .pop_result(PopResultRequest {})
            .await
            .map_err(map_status)?
            .into_inner();
        JobResult::try_from(record)
    }
}

fn map_status(status: tonic::Status) -> CalcitError {
    if status.code() == Code::Unauthenticated {
        CalcitError::Unauthenticated
    } else {
        CalcitError::GrpcError(status)
    }
}
