//! DIRECTORYSCAN phase: list files, probe and repair the extras, then check the directory's shape

use super::RipValidator;
use crate::formats::file_name_of;
use crate::models::{RipUnit, ValidationState};
use crate::services::dir_scanner::{has_rip_role, DirectoryListing};
use crate::services::naming::parse_log_name;
use ripcheck_common::{Hashes, IssueTags, Severity};

impl RipValidator {
    /// Returns `None` when the directory could not be listed at all
    pub(super) fn phase_directory_scan(&mut self, rip: &mut RipUnit) -> Option<DirectoryListing> {
        self.enter(rip, ValidationState::DirectoryScan);

        let mut listing = self.list_directory(rip)?;

        for path in &listing.others {
            self.emit_file_started(path);
            match self.registry.create_model(path, Hashes::empty(), self.config.misname_filter) {
                Some(mut instance) => {
                    self.adopt(rip, &mut instance);
                    rip.others.push(instance);
                }
                None => {
                    let message = format!("Ignoring unrecognized file {}", file_name_of(path));
                    self.add_issue(rip, message, Severity::Noise, IssueTags::empty());
                }
            }
        }

        // A misname repair can turn an extra file into a track, log, playlist or digest
        let promoted = rip.others.iter().filter(|other| has_rip_role(&other.path)).count();
        if promoted > 0 {
            rip.others.retain(|other| !has_rip_role(&other.path));
            tracing::info!(directory = %rip.directory.display(), promoted, "Listing again after extension repairs");
            listing = self.list_directory(rip)?;
        }

        match listing.logs.len() {
            0 => self.add_issue(rip, "No extraction log found", Severity::Error, IssueTags::FAILURE),
            1 => {}
            n => self.add_issue(
                rip,
                format!("{} extraction logs found; a rip has exactly one", n),
                Severity::Error,
                IssueTags::FAILURE,
            ),
        }
        if listing.audio.is_empty() {
            self.add_issue(rip, "No FLAC files found", Severity::Error, IssueTags::FAILURE);
        }
        if listing.playlists.len() > 1 {
            self.add_issue(
                rip,
                format!("{} playlists found; a rip has at most one", listing.playlists.len()),
                Severity::Error,
                IssueTags::FAILURE,
            );
        }
        if listing.digests.len() > 1 {
            self.add_issue(
                rip,
                format!("{} digests found; a rip has at most one", listing.digests.len()),
                Severity::Error,
                IssueTags::FAILURE,
            );
        }

        if let [log_path] = listing.logs.as_slice() {
            if let Some(parsed) = parse_log_name(&file_name_of(log_path)) {
                rip.work_name = Some(parsed.work);
                rip.log_signer = parsed.signer;
            }
            if let (Some(signer), true) = (rip.log_signer.clone(), listing.digests.is_empty()) {
                let message = format!("Log is signed by {} but no digest exists", signer);
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE | IssueTags::MISSING_HASH);
            }
        }

        tracing::info!(
            directory = %rip.directory.display(),
            work = rip.work_name.as_deref().unwrap_or("-"),
            tracks = listing.audio.len(),
            others = rip.others.len(),
            "Directory scanned"
        );
        Some(listing)
    }

    fn list_directory(&self, rip: &mut RipUnit) -> Option<DirectoryListing> {
        match self.scanner.list(&rip.directory) {
            Ok(listing) => Some(listing),
            Err(e) => {
                self.add_issue(rip, format!("Cannot scan directory: {}", e), Severity::Fatal, IssueTags::FAILURE);
                None
            }
        }
    }
}
