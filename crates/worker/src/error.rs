//! Errors raised while speaking the host protocol.

use perch_core::Error;

use crate::host::HostReply;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The event line was not valid JSON or named no known event.
    #[error("INVALID_INPUT: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Worker(#[from] Error),
}

impl HostError {
    pub fn code(&self) -> &'static str {
        match self {
            HostError::InvalidEvent(_) => "INVALID_INPUT",
            HostError::Worker(err) => err.code(),
        }
    }
}

impl From<HostError> for HostReply {
    fn from(err: HostError) -> Self {
        HostReply::Failed { id: None, code: err.code().to_string(), message: err.to_string() }
    }
}
