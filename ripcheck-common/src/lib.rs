//! # ripcheck Common Library
//!
//! Shared code for the ripcheck crates:
//! - Incremental hashing abstraction
//! - Issue/severity model with tag escalation
//! - Event types and broadcast bus
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod hashing;
pub mod issues;
pub mod severity;

pub use error::{Error, Result};
pub use hashing::{Hasher, Hashes};
pub use issues::{Issue, IssueTags, IssueVector, RepairKind, RepairOutcome};
pub use severity::Severity;
