use std::path::PathBuf;

use thiserror::Error;

use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum CalcitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote shell '{0}' is not supported, use 'ssh'")]
    UnsupportedRemoteShell(String),

    #[error("Failed to create job '{identifier}': {source}")]
    JobCreate {
        identifier: String,
        #[source]
        source: TemplateError,
    },

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid queue record: {0}")]
    InvalidRecord(String),

    #[error("Queue server rejected the shared secret")]
    Unauthenticated,

    #[error("Job file not found: {0}")]
    JobFileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gRPC error: {0}")]
    GrpcError(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CalcitError {
    /// True for failures that happen before a run starts (bad flags, missing
    /// templates, unsupported remote shell).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CalcitError::Config(_)
                | CalcitError::UnsupportedRemoteShell(_)
                | CalcitError::JobCreate { .. }
                | CalcitError::Template(_)
                | CalcitError::JobFileNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CalcitError>;
