//! Error types for the localization core

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Localization core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A direction or angle outside the accepted set was passed to an accessor
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The listener is already registered with the hub
    #[error("Listener already registered")]
    DuplicateListener,

    /// The listener was never registered (or was already removed)
    #[error("Listener not registered")]
    UnknownListener,

    /// Configuration value out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Component could not change lifecycle state
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),
}
