//! Error handling for the fieldcam agent

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera device could not be opened
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Frame read failed mid-session
    #[error("Device read failure: {0}")]
    FrameRead(String),

    /// Bundling or upload of a session archive failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Remote listing failed (aborts the retention pass)
    #[error("Listing error: {0}")]
    Listing(String),

    /// A single remote deletion failed (logged and skipped)
    #[error("Delete failed for {name}: {message}")]
    Delete { name: String, message: String },

    /// Remote store rejected a request
    #[error("Store error: {0}")]
    Store(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip container error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
