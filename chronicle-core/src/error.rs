//! Error types for Chronicle operations

/// Result type for Chronicle operations
pub type Result<T> = std::result::Result<T, ChronicleError>;

/// Error types for the timeline subsystem
///
/// Expected conditions (duplicate appends, empty queries, out-of-range
/// seeks) are not errors; only genuinely fallible edges surface here.
#[derive(Debug, thiserror::Error)]
pub enum ChronicleError {
    /// A serialized session document could not be imported
    #[error("Import error: {0}")]
    Import(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for ChronicleError {
    fn from(s: String) -> Self {
        ChronicleError::Other(s)
    }
}

impl From<&str> for ChronicleError {
    fn from(s: &str) -> Self {
        ChronicleError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for ChronicleError {
    fn from(err: anyhow::Error) -> Self {
        ChronicleError::Other(err.to_string())
    }
}
