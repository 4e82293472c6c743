use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::auth::SecretVerifier;
use crate::config::QueueServerConfig;
use crate::error::Result;
use crate::grpc::queue_service::QueueServiceImpl;
use crate::proto::queue_service_server::QueueServiceServer;
use crate::queue::{JobQueue, ResultQueue};

/// Upper bound on waiting for the serve task once shutdown is signalled.
const SERVE_TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Network-reachable host for the job and result queues.
///
/// The queues are created fresh by [`QueueServer::start`] and discarded
/// when the server is dropped or shut down.
pub struct QueueServer {
    local_addr: SocketAddr,
    jobs: JobQueue,
    results: ResultQueue,
    connected_workers: Arc<AtomicU64>,
    shutdown_grace: Duration,
    shutdown: CancellationToken,
    serve_handle: Option<JoinHandle<()>>,
}

impl QueueServer {
    /// Bind the listener and start serving in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(config: &QueueServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let jobs = JobQueue::new();
        let results = ResultQueue::new();
        let connected_workers = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();

        let service = QueueServiceImpl::new(
            jobs.clone(),
            results.clone(),
            connected_workers.clone(),
            shutdown.clone(),
        );
        let verifier = SecretVerifier::new(config.secret.clone());

        tracing::info!(addr = %local_addr, "Starting queue server");

        let signal = shutdown.clone();
        let serve_handle = tokio::spawn(async move {
            let result = Server::builder()
                .add_service(QueueServiceServer::with_interceptor(service, verifier))
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                    signal.cancelled().await
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Queue server failed");
            }
        });

        Ok(Self {
            local_addr,
            jobs,
            results,
            connected_workers,
            shutdown_grace: config.shutdown_grace,
            shutdown,
            serve_handle: Some(serve_handle),
        })
    }

    /// Address the listener is bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Local handle to the job queue.
    pub fn job_queue(&self) -> JobQueue {
        self.jobs.clone()
    }

    /// Local handle to the result queue.
    pub fn result_queue(&self) -> ResultQueue {
        self.results.clone()
    }

    /// Number of clients that completed the handshake so far.
    pub fn connected_workers(&self) -> u64 {
        self.connected_workers.load(Ordering::SeqCst)
    }

    /// Stop serving.
    ///
    /// Call only once no further queue access is expected. The grace delay
    /// lets workers that are mid-request finish before the listener goes
    /// away; it narrows that race but does not close it.
    pub async fn shutdown(self) {
        let grace = self.shutdown_grace;
        self.stop(grace).await;
    }

    /// Stop serving without the grace delay.
    ///
    /// For runs that never launched a worker, so no request can be in flight.
    pub async fn shutdown_now(self) {
        self.stop(Duration::ZERO).await;
    }

    async fn stop(mut self, grace: Duration) {
        tracing::info!(
            addr = %self.local_addr,
            grace_ms = grace.as_millis() as u64,
            "Shutting down queue server"
        );
        if !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }
        self.shutdown.cancel();

        if let Some(mut handle) = self.serve_handle.take() {
            if tokio::time::timeout(SERVE_TASK_DRAIN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Queue server did not drain in time, aborting");
                handle.abort();
            }
        }
    }
}

impl Drop for QueueServer {
    fn drop(&mut self) {
        // Covers early returns that skip `shutdown()`.
        self.shutdown.cancel();
    }
}
