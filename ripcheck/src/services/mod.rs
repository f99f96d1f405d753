//! Services for ripcheck

pub mod batch;
pub mod dir_scanner;
pub mod naming;
pub mod prompter;
pub mod repairer;
pub mod validation_pipeline;
pub mod web_verifier;

pub use batch::{BatchRunner, BatchSummary, DirectoryOutcome};
pub use dir_scanner::{DirectoryListing, DirectoryScanner, ScanError};
pub use prompter::{DeclinePrompter, Prompter, ScriptedPrompter, StdinPrompter};
pub use validation_pipeline::RipValidator;
pub use web_verifier::{WebCheckResult, WebVerifier};
