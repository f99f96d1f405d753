//! Rip validation pipeline
//!
//! # State Progression
//! DIRECTORYSCAN → LOGPARSE → AUDIOSETVALIDATE → ALBUMNAMING →
//! PLAYLISTVALIDATE → DIGESTVALIDATE → COMMENTPROMPT → COMMIT → COMPLETED
//!
//! Each stage is a `phase_*` method in its own module. Stages share state only
//! through the [`RipUnit`] and the [`DirectoryListing`] produced by the scan.
//! After every stage the running status is checked; `Error` or worse ends the
//! directory in FAILED and no later stage runs.
//!
//! Without a signer the pipeline only verifies: nothing is renamed, written
//! or repaired.

use crate::error::Result;
use crate::formats::{FormatInstance, FormatRegistry};
use crate::models::{RipUnit, ValidationState};
use crate::services::dir_scanner::{DirectoryListing, DirectoryScanner};
use crate::services::naming::{mark_failed_directory, MARKER_FILE_NAME};
use crate::services::prompter::Prompter;
use crate::services::repairer::offer_repairs;
use crate::services::web_verifier::WebVerifier;
use chrono::Utc;
use ripcheck_common::config::ValidationConfig;
use ripcheck_common::events::{EventBus, ValidationEvent};
use ripcheck_common::{Hashes, IssueTags, IssueVector, Severity};
use std::path::Path;

mod phase_audio;
mod phase_commit;
mod phase_digest;
mod phase_log;
mod phase_naming;
mod phase_playlist;
mod phase_scan;

/// Rip directory validator
pub struct RipValidator {
    config: ValidationConfig,
    warn_escalator: IssueTags,
    error_escalator: IssueTags,
    registry: FormatRegistry,
    scanner: DirectoryScanner,
    event_bus: EventBus,
    prompter: Box<dyn Prompter>,
    web_verifier: Option<WebVerifier>,
    preset_comment: Option<String>,
}

impl RipValidator {
    /// Create a validator
    ///
    /// # Arguments
    /// * `config` - Validation settings; escalator names must be valid tags
    /// * `event_bus` - Event bus for progress updates
    /// * `prompter` - Source of repair confirmations and change comments
    pub fn new(config: ValidationConfig, event_bus: EventBus, prompter: Box<dyn Prompter>) -> Result<Self> {
        let (warn_escalator, error_escalator) = config.escalators()?;

        let web_verifier = match &config.web_check_url {
            Some(url) if !url.trim().is_empty() => {
                tracing::info!(url = %url, "Log web verification enabled");
                Some(WebVerifier::new(url.trim(), config.web_check_timeout_secs)?)
            }
            _ => None,
        };

        Ok(Self {
            config,
            warn_escalator,
            error_escalator,
            registry: FormatRegistry::standard(),
            scanner: DirectoryScanner::new(),
            event_bus,
            prompter,
            web_verifier,
            preset_comment: None,
        })
    }

    /// Use `comment` for change entries instead of prompting
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.preset_comment = comment.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Per-format counters accumulated over every directory validated so far
    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Validate one rip directory
    pub fn validate(&mut self, directory: &Path) -> RipUnit {
        let mut rip = RipUnit::new(
            directory,
            self.config.signer.clone(),
            IssueVector::with_escalators(self.warn_escalator, self.error_escalator),
            self.config.digest_format,
        );
        rip.comment = self.preset_comment.clone();

        tracing::info!(
            directory = %directory.display(),
            signer = rip.signer.as_deref().unwrap_or("-"),
            "Validating rip directory"
        );
        self.event_bus.emit_lossy(ValidationEvent::DirectoryStarted {
            directory: directory.to_path_buf(),
            timestamp: Utc::now(),
        });

        let Some(listing) = self.phase_directory_scan(&mut rip) else {
            return self.finish(rip);
        };
        if self.halted(&mut rip) {
            return self.finish(rip);
        }

        self.phase_log_parse(&mut rip, &listing);
        if self.halted(&mut rip) {
            return self.finish(rip);
        }

        self.phase_audio_set(&mut rip, &listing);
        if self.halted(&mut rip) {
            return self.finish(rip);
        }

        self.phase_album_naming(&mut rip);
        if self.halted(&mut rip) {
            return self.finish(rip);
        }

        self.phase_playlist(&mut rip, &listing);
        if self.halted(&mut rip) {
            return self.finish(rip);
        }

        self.phase_digest(&mut rip, &listing);
        if self.halted(&mut rip) {
            return self.finish(rip);
        }

        self.phase_comment_prompt(&mut rip);
        if self.halted(&mut rip) {
            return self.finish(rip);
        }

        self.phase_commit(&mut rip);
        self.finish(rip)
    }

    fn enter(&self, rip: &mut RipUnit, state: ValidationState) {
        rip.transition_to(state);
        tracing::debug!(directory = %rip.directory.display(), state = state.as_str(), "Entering stage");
        self.event_bus.emit_lossy(ValidationEvent::StateChanged {
            directory: rip.directory.clone(),
            state: state.as_str().to_string(),
            timestamp: Utc::now(),
        });
    }

    fn halted(&self, rip: &mut RipUnit) -> bool {
        rip.update_status() >= Severity::Error
    }

    fn file_hashes(&self) -> Hashes {
        Hashes::FILE_MD5 | self.config.digest_format.file_hash()
    }

    /// Record a directory-level issue
    fn add_issue(&self, rip: &mut RipUnit, message: impl Into<String>, severity: Severity, tags: IssueTags) {
        let message = message.into();
        self.emit_issue("directory", severity, &message);
        rip.issues.add(message, severity, tags);
    }

    fn emit_issue(&self, subject: &str, severity: Severity, message: &str) {
        match severity {
            Severity::Fatal | Severity::Error => tracing::warn!(subject, severity = %severity, "{}", message),
            _ => tracing::debug!(subject, severity = %severity, "{}", message),
        }
        self.event_bus.emit_lossy(ValidationEvent::IssueAdded {
            subject: subject.to_string(),
            severity,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn emit_file_started(&self, path: &Path) {
        self.event_bus.emit_lossy(ValidationEvent::FileStarted {
            path: path.to_path_buf(),
            timestamp: Utc::now(),
        });
    }

    /// Escalate a freshly parsed file, offer its repairs and report its issues
    fn adopt(&mut self, rip: &RipUnit, instance: &mut FormatInstance) {
        instance.issues.escalate(self.warn_escalator, self.error_escalator);
        if rip.signer.is_some() && instance.issues.repairable_count() > 0 {
            let repaired = offer_repairs(instance, self.prompter.as_mut());
            tracing::debug!(file = %instance.name, repaired, "Repairs offered");
        }
        instance.close();
        for issue in instance.issues.items() {
            self.emit_issue(&instance.name, instance.issues.effective_severity(issue), issue.message());
        }
    }

    fn finish(&mut self, mut rip: RipUnit) -> RipUnit {
        rip.update_status();
        rip.close_all();
        if rip.status >= Severity::Error {
            rip.transition_to(ValidationState::Failed);
        } else {
            rip.transition_to(ValidationState::Completed);
        }

        let trailer = rip.trailer_sentence();
        rip.trailer = Some(trailer.to_string());

        if rip.status >= Severity::Warning && self.config.write_marker {
            self.write_marker(&rip, trailer);
        }
        if rip.is_failed() && rip.signer.is_some() && self.config.mark_failed_directories {
            match mark_failed_directory(&rip.directory) {
                Ok(marked) => rip.directory = marked,
                Err(e) => tracing::warn!(directory = %rip.directory.display(), error = %e, "Cannot mark failed directory"),
            }
        }

        tracing::info!(
            directory = %rip.directory.display(),
            status = %rip.status,
            trailer,
            "Rip directory finished"
        );
        self.event_bus.emit_lossy(ValidationEvent::DirectoryFinished {
            directory: rip.directory.clone(),
            status: rip.status,
            trailer: trailer.to_string(),
            timestamp: Utc::now(),
        });
        rip
    }

    fn write_marker(&self, rip: &RipUnit, trailer: &str) {
        let mut body = String::new();
        for line in rip.report(self.config.report_threshold) {
            body.push_str(&line);
            body.push('\n');
        }
        body.push_str(trailer);
        body.push('\n');

        let path = rip.directory.join(MARKER_FILE_NAME);
        if let Err(e) = std::fs::write(&path, body) {
            tracing::warn!(file = %path.display(), error = %e, "Cannot write non-compliance marker");
        }
    }
}
