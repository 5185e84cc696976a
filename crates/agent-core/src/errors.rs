use thiserror::Error;

/// Fallback suspension when a rate-limited response carries no retry hint.
pub const DEFAULT_RETRY_AFTER_SECONDS: u64 = 60;

/// Errors surfaced across the automation-agent boundary.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent endpoint rejected the call with a 429-equivalent.
    #[error("agent rate limited; retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    /// Transport or non-success HTTP failure.
    #[error("agent request failed: {0}")]
    Request(String),

    /// The endpoint answered but the payload was unusable.
    #[error("agent response invalid: {0}")]
    InvalidResponse(String),
}

impl AgentError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }
}

/// Normalized view of an agent error for the retry path. The defensive
/// unwrapping of loosely-typed upstream errors lives here so the executor
/// never inspects raw errors itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSignal {
    pub is_rate_limited: bool,
    pub retry_after_seconds: u64,
}

impl RateLimitSignal {
    pub fn from_error(err: &AgentError) -> Self {
        match err {
            AgentError::RateLimited {
                retry_after_seconds,
            } => Self {
                is_rate_limited: true,
                retry_after_seconds: *retry_after_seconds,
            },
            _ => Self {
                is_rate_limited: false,
                retry_after_seconds: DEFAULT_RETRY_AFTER_SECONDS,
            },
        }
    }
}
