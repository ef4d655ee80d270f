/// Shared error type used across all studybuddy crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// The model service refused the call because of rate limiting or quota
    /// exhaustion. Never retried inside a turn.
    #[error("provider {provider} rate limited: {message}")]
    RateLimited {
        provider: String,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("storage: {0}")]
    Storage(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is the rate-limit degradation signal.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_distinguished() {
        let err = Error::RateLimited {
            provider: "google".into(),
            message: "quota".into(),
            retry_after_secs: Some(30),
        };
        assert!(err.is_rate_limit());
        assert!(err.to_string().contains("rate limited"));

        let other = Error::Provider {
            provider: "google".into(),
            message: "HTTP 500".into(),
        };
        assert!(!other.is_rate_limit());
    }
}
