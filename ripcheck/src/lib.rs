//! ripcheck library interface
//!
//! Audits CD rip directories: cross-checks the extraction log, the FLAC
//! tracks, the playlist and the signed digest, then (with a signer) renames,
//! writes the digest and records provenance history.

pub mod error;
pub mod formats;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{Result, ValidationError};
pub use crate::models::RipUnit;
pub use crate::services::{BatchRunner, RipValidator};
