//! Error types for vsync-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from vsync-core
    #[error(transparent)]
    Core(#[from] vsync_core::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Logging could not be initialized
    #[error("Failed to initialize logging: {message}")]
    Logging { message: String },
}
