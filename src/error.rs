use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("State file is corrupt: {0}")]
    StateCorrupt(String),
    #[error("State I/O error: {0}")]
    StateIo(String),
}

/// Errors coming back from the chain client. Transient errors are worth
/// retrying; everything else is recorded as final for the pass.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("rate limited by provider")]
    RateLimited,
    #[error("rejected by chain: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    BadResponse(String),
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Timeout | ChainError::Connect(_) | ChainError::RateLimited
        )
    }
}
