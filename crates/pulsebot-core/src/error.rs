use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseBotError {
    /// The key/value backend could not be reached or timed out.
    /// Callers treat this as a degraded-mode condition, never fatal.
    #[error("storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("access denied")]
    AccessDenied,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
