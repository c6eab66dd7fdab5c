//! Error types for the model capability layer

/// Result type for capability operations.
///
/// Convenience alias over [`ModelError`], used for call-level failures
/// (the whole request failed). Per-item failures inside a batch are
/// carried as [`ItemResult`] instead.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Per-item outcome inside a batch call.
///
/// A batch call that succeeds as a whole can still fail for individual
/// items; callers decide how to degrade (the indexer substitutes an
/// empty placeholder and counts the failure).
pub type ItemResult<T> = std::result::Result<T, ModelError>;

/// Error type for all model capability operations.
///
/// Covers configuration problems, transport failures against remote
/// model servers, and generation failures reported by the model itself.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Error when a capability configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// Error transporting a request to a remote model server
    #[error("Model request failed: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    /// Error reported by the model for a specific input
    #[error("Generation failed: {message}")]
    Generation { message: String },

    /// Response from a model server that does not match the expected shape
    #[error("Malformed model response: {message}")]
    MalformedResponse { message: String },

    /// IO errors while reading item content
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl ModelError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a generation error for a single failed item.
    pub fn generation<S: Into<String>>(message: S) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a malformed-response error.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}
