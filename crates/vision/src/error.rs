use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model endpoint unavailable: {message}")]
    Upstream { message: String, transient: bool },

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid model reply: {message}")]
    InvalidReply { message: String },
}

impl ModelError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            transient: false,
        }
    }

    pub fn invalid_reply(message: impl Into<String>) -> Self {
        Self::InvalidReply {
            message: message.into(),
        }
    }

    /// Worth another attempt: network failures, throttling, server errors and timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Upstream { transient, .. } => *transient,
            Self::Timeout(_) => true,
            Self::InvalidReply { .. } => false,
        }
    }
}
