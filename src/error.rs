use thiserror::Error;

/// Boxed error type for caller-supplied fetchers and refreshers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Construction-time configuration errors.
///
/// This is the only error surface of the crate: runtime failures (remote
/// tier outages, fetcher errors, bad rules) are logged and absorbed rather
/// than propagated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_size must be greater than zero")]
    ZeroMaxSize,
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
    #[error("configuration error: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
