pub mod client;
pub mod queue_service;
pub mod server;

pub use client::QueueClient;
pub use queue_service::QueueServiceImpl;
pub use server::QueueServer;
