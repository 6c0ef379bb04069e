use std::time::Duration;

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failures talking to the chain API. A rejected broadcast is not an error;
/// it is reported through [`BroadcastResponse`](crate::BroadcastResponse).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection: {0}")]
    Connection(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Parse(_) => false,
        }
    }
}
