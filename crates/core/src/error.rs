/// Result alias that carries the custom [`BackdropError`] type.
pub type Result<T> = std::result::Result<T, BackdropError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BackdropError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be parsed.
    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration parsed but violates an engine invariant.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An image could not be materialised by the loader.
    #[error("failed to preload `{image}`: {reason}")]
    PreloadFailure { image: String, reason: String },
    /// A shared state lock was poisoned by a panicking holder.
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
}

impl BackdropError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a preload failure for `image` with a human readable reason.
    pub fn preload(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PreloadFailure {
            image: image.into(),
            reason: reason.into(),
        }
    }
}

impl From<&str> for BackdropError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BackdropError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
