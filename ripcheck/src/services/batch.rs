//! Batch validation over one or more root paths
//!
//! Each root is searched for rip directories and every directory found is
//! validated in turn. A failed directory never stops the batch.

use crate::error::Result;
use crate::services::dir_scanner::DirectoryScanner;
use crate::services::validation_pipeline::RipValidator;
use ripcheck_common::Severity;
use std::path::{Path, PathBuf};

/// Result of validating one directory
#[derive(Debug, Clone)]
pub struct DirectoryOutcome {
    /// Final location; differs from the input after a rename or failure mark
    pub directory: PathBuf,
    pub status: Severity,
    pub trailer: String,
    /// Itemized report at the configured threshold
    pub report: Vec<String>,
}

/// Results of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<DirectoryOutcome>,
}

impl BatchSummary {
    /// Highest status over every directory
    pub fn worst(&self) -> Severity {
        self.outcomes.iter().map(|o| o.status).max().unwrap_or_default()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_failure()).count()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Drives a [`RipValidator`] across directory trees
pub struct BatchRunner {
    validator: RipValidator,
    scanner: DirectoryScanner,
    recursive: bool,
}

impl BatchRunner {
    pub fn new(validator: RipValidator, recursive: bool) -> Self {
        Self {
            validator,
            scanner: DirectoryScanner::new(),
            recursive,
        }
    }

    pub fn validator(&self) -> &RipValidator {
        &self.validator
    }

    /// Validate every rip directory under `roots`
    ///
    /// A root that is itself a rip directory is validated even when
    /// discovery would skip it. Discovery errors abort the batch.
    pub fn run(&mut self, roots: &[PathBuf]) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        for root in roots {
            let directories = self.scanner.find_rip_directories(root, self.recursive)?;
            if directories.is_empty() {
                tracing::warn!(root = %root.display(), "No rip directories found");
            }
            for directory in directories {
                summary.outcomes.push(self.run_one(&directory));
            }
        }

        tracing::info!(
            directories = summary.len(),
            failed = summary.failed_count(),
            worst = %summary.worst(),
            "Batch complete"
        );
        Ok(summary)
    }

    fn run_one(&mut self, directory: &Path) -> DirectoryOutcome {
        let threshold = self.validator.config().report_threshold;
        let rip = self.validator.validate(directory);
        DirectoryOutcome {
            directory: rip.directory.clone(),
            status: rip.status,
            trailer: rip.trailer.clone().unwrap_or_else(|| rip.trailer_sentence().to_string()),
            report: rip.report(threshold),
        }
    }
}
