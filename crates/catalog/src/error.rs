use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    #[error("invalid {what} key: {key:?}")]
    InvalidKey { what: &'static str, key: String },

    #[error("object store unavailable: {message}")]
    Upstream { message: String },

    #[error("failed to parse {key}: {message}")]
    Parse { key: String, message: String },
}

impl CatalogError {
    pub fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            key: key.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }
}
