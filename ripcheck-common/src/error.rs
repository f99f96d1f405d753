//! Common error types for ripcheck

use thiserror::Error;

/// Common result type for ripcheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across ripcheck crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File content does not match its expected structure
    #[error("Format error: {0}")]
    Format(String),

    /// Digest computation failed
    #[error("Hash error: {0}")]
    Hash(String),

    /// Invalid user input or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
