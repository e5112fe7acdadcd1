//! Links between the monitoring process and everything else.
//!
//! - [`snapshot`]: request/reply over TCP for the live window
//! - [`summary`]: redis pub/sub carrying archived minute summaries to the recorder

pub mod snapshot;
pub mod summary;

use thiserror::Error;

pub type TransportResult<T> = core::result::Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message published on foreign topic '{0}'")]
    ForeignTopic(String),

    #[error("connection closed by peer")]
    Closed,
}
