//! Shared helpers for queue server, worker and coordinator tests.
//!
//! Every server binds port 0 on loopback so tests can run in parallel.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use calcit::auth::SharedSecret;
use calcit::config::{CoordinatorConfig, QueueServerConfig, ServerEndpoint, WorkerConfig};
use calcit::grpc::QueueServer;

pub const TEST_SECRET: &str = "calcit-test-secret";

pub fn secret() -> SharedSecret {
    SharedSecret::new(TEST_SECRET)
}

/// Server config on an ephemeral loopback port with no shutdown grace.
pub fn server_config() -> QueueServerConfig {
    QueueServerConfig::new("127.0.0.1:0".parse().unwrap(), secret())
        .with_shutdown_grace(Duration::ZERO)
}

pub async fn start_server() -> QueueServer {
    QueueServer::start(&server_config())
        .await
        .expect("queue server should start")
}

pub fn endpoint_for(server: &QueueServer, secret: SharedSecret) -> ServerEndpoint {
    ServerEndpoint::new("127.0.0.1", server.local_addr().port(), secret)
}

pub fn worker_config(server: &QueueServer, name: &str) -> WorkerConfig {
    WorkerConfig::new(endpoint_for(server, secret())).with_name(name)
}

pub fn coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig::new(server_config()).with_advertise_host("127.0.0.1")
}

/// Assert that a condition becomes true within a timeout.
pub async fn assert_eventually<F, Fut>(condition: F, timeout: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Condition not met within {:?}: {}", timeout, message);
}
