use thiserror::Error;

/// Locator error types
#[derive(Error, Debug, Clone)]
pub enum LocatorError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown anchor: {0}")]
    UnknownAnchor(String),
}

/// Result type for locator operations
pub type Result<T> = std::result::Result<T, LocatorError>;
