//! LOGPARSE phase: parse the extraction log and optionally verify it online

use super::RipValidator;
use crate::formats::{file_name_of, FormatInstance, FormatPayload};
use crate::models::{RipUnit, ValidationState};
use crate::services::dir_scanner::DirectoryListing;
use crate::services::web_verifier::WebCheckResult;
use ripcheck_common::{Hashes, IssueTags, Severity};

impl RipValidator {
    pub(super) fn phase_log_parse(&mut self, rip: &mut RipUnit, listing: &DirectoryListing) {
        self.enter(rip, ValidationState::LogParse);

        let Some(log_path) = listing.logs.first() else {
            return;
        };
        self.emit_file_started(log_path);

        let mut hashes = self.file_hashes();
        if self.web_verifier.is_some() {
            hashes |= Hashes::WEB_CHECK;
        }

        // A .log that is not an extraction log is never sniffed as another format
        let mut log = match self.registry.create_model(log_path, hashes, false) {
            Some(log) if matches!(log.payload, FormatPayload::Log(_)) => log,
            _ => {
                let message = format!("{} is not a readable EAC extraction log", file_name_of(log_path));
                self.add_issue(rip, message, Severity::Fatal, IssueTags::FAILURE);
                return;
            }
        };

        self.verify_online(rip, &mut log, hashes);
        self.adopt(rip, &mut log);

        if let FormatPayload::Log(data) = &log.payload {
            tracing::info!(
                log = %log.name,
                tracks = data.tracks.len(),
                accurate = data.all_accurate(),
                issues = log.issues.len(),
                "Extraction log parsed"
            );
        }
        rip.log = Some(log);
    }

    fn verify_online(&self, rip: &mut RipUnit, log: &mut FormatInstance, hashes: Hashes) {
        if !hashes.contains(Hashes::WEB_CHECK) {
            return;
        }
        let Some(verifier) = &self.web_verifier else {
            return;
        };
        let Some(bytes) = log.buffer() else {
            return;
        };

        match verifier.verify(bytes) {
            Ok(result) => {
                rip.web_check = Some(result);
                match result {
                    WebCheckResult::Success => {
                        log.issues.add("Log verified online", Severity::Noise, IssueTags::SUCCESS);
                    }
                    WebCheckResult::Mismatch => {
                        log.issues.add(
                            "Online verification reports the log was modified",
                            Severity::Error,
                            IssueTags::FAILURE | IssueTags::PROVE_ERR,
                        );
                    }
                    WebCheckResult::Unknown => {
                        log.issues.add(
                            "Online verification gave no verdict",
                            Severity::Advisory,
                            IssueTags::PROVE_ERR,
                        );
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = verifier.url(), error = %e, "Log verification unavailable");
                log.issues.add(
                    format!("Online verification unavailable: {}", e),
                    Severity::Advisory,
                    IssueTags::PROVE_ERR,
                );
            }
        }
    }
}
