use thiserror::Error;

/// Errors from loading or persisting the credential/auth files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration encoding error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from talking to the Composio platform.
#[derive(Debug, Error)]
pub enum ComposioError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Composio API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Composio rejected the API key: {0}")]
    Unauthorized(String),

    #[error("Unexpected response from Composio: {0}")]
    Decode(String),
}

/// Top-level error taxonomy surfaced to HTTP callers.
///
/// The router maps these to status codes: validation errors to 400,
/// missing credentials to 428, not-authenticated to 401 and everything
/// upstream-related to 500.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("Gmail is not authenticated. Call POST /authenticate first.")]
    NotAuthenticated,

    #[error("Authentication service unavailable")]
    AuthServiceUnavailable,

    #[error("{0}")]
    Upstream(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<ComposioError> for AgentError {
    fn from(err: ComposioError) -> Self {
        AgentError::Upstream(err.to_string())
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
