use thiserror::Error;

/// Error types produced by the session/model plane of the harness.
///
/// Tool-level failures are deliberately absent here: they are converted into
/// `Observation`s and fed back to the model instead of aborting a session.
#[derive(Debug, Error)]
pub enum AgentError {
    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    Http(String),
    /// A remote call exceeded its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// The provider rejected the request for rate reasons
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// Authentication and authorization errors
    #[error("Auth error: {0}")]
    Auth(String),
    /// Invalid request parameters or format
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Errors returned by the model provider
    #[error("Provider error: {0}")]
    Provider(String),
    /// API response parsing or format error
    #[error("Response format error: {message}. Raw response: {raw_response}")]
    ResponseFormat {
        message: String,
        raw_response: String,
    },
    /// JSON serialization/deserialization errors
    #[error("JSON parse error: {0}")]
    Json(String),
    /// Model output matched neither a final answer nor a tool invocation
    #[error("Unparseable model action: {0}")]
    Parse(String),
    /// A tool pool's wait queue is saturated
    #[error("Tool server saturated: {0}")]
    ResourceExhausted(String),
    /// Retry attempts exceeded
    #[error("Retry attempts exceeded after {attempts} tries: {last_error}")]
    RetryExceeded { attempts: usize, last_error: String },
    /// Filesystem errors while reading tasks or persisting results
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgentError::Timeout(err.to_string())
        } else {
            AgentError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Json(format!(
            "{} at line {} column {}",
            err,
            err.line(),
            err.column()
        ))
    }
}
