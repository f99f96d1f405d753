//! Error types for ripcheck
//!
//! Problems found *in* a rip are issues, not errors. These variants cover
//! failures to set up or drive validation at all.

use crate::services::dir_scanner::ScanError;
use crate::services::web_verifier::WebCheckError;
use thiserror::Error;

/// Pipeline-level error
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Configuration or other shared-library error
    #[error("Common error: {0}")]
    Common(#[from] ripcheck_common::Error),

    /// Rip directory discovery failed
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Web verification client could not be built
    #[error("Web verification error: {0}")]
    WebCheck(#[from] WebCheckError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ValidationError>;
