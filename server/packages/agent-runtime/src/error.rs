use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentRuntimeError {
    #[error("invalid agent runtime configuration: {0}")]
    Config(String),
    #[error("Agent invocation timed out: {0}")]
    Timeout(String),
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Agent invocation failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("No response from AgentCore")]
    EmptyResponse,
    #[error("Invalid response from agent: {0}")]
    InvalidResponse(String),
}

impl AgentRuntimeError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}
