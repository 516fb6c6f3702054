//! Job execution errors

use thiserror::Error;

use core_kernel::{DomainError, PortError};

/// Failure of one job attempt; the queue decides whether to retry
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("No handler for queue '{0}'")]
    UnknownQueue(String),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
