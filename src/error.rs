use thiserror::Error;

/// Errors that can occur in feed collectors
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Failed to connect to feed: {0}")]
    ConnectFailed(String),

    #[error("Collector thread terminated unexpectedly: {0}")]
    ThreadTerminated(String),

    #[error("Failed to parse feed payload: {0}")]
    ParseError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur while rendering a dashboard frame
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to serialize snapshot: {0}")]
    SerializeError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
