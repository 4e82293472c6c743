pub mod auth;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod grpc;
pub mod jobs;
pub mod queue;
pub mod shutdown;
pub mod template;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("calcit");
}
