//! COMMENTPROMPT and COMMIT phases: record the change comment, then write and rename

use super::RipValidator;
use crate::formats::digest::render;
use crate::formats::file_name_of;
use crate::models::history::ACTION_CHANGED_PREFIX;
use crate::models::{RenameTarget, RipUnit, ValidationState};
use crate::services::naming::{change_summary, rename_path, unmark_failed_directory, MARKER_FILE_NAME};
use ripcheck_common::{IssueTags, Severity};
use std::path::{Path, PathBuf};

/// Order in which queued renames are applied
const RENAME_ORDER: [RenameTarget; 4] = [
    RenameTarget::Digest,
    RenameTarget::Playlist,
    RenameTarget::Log,
    RenameTarget::Directory,
];

impl RipValidator {
    pub(super) fn phase_comment_prompt(&mut self, rip: &mut RipUnit) {
        self.enter(rip, ValidationState::CommentPrompt);

        let Some(signer) = rip.signer.clone() else {
            return;
        };
        if rip.is_first_signing || rip.change_count() == 0 {
            return;
        }

        let (summary, prompt) = change_summary(rip.track_edits, rip.track_renames, rip.album_renames);
        tracing::info!(directory = %rip.directory.display(), summary = %summary, "Changes need a comment");

        let answer = match rip.comment.clone() {
            Some(comment) => comment,
            None => self.prompter.request_input(&prompt),
        };
        let comment = answer.trim();
        if comment.is_empty() {
            let message = format!("{}; a comment is required to sign the changes", summary);
            self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            return;
        }

        rip.history.add(&signer, format!("{}{}", ACTION_CHANGED_PREFIX, comment));
        rip.comment = Some(comment.to_string());
        rip.digest_dirty = true;
    }

    pub(super) fn phase_commit(&mut self, rip: &mut RipUnit) {
        self.enter(rip, ValidationState::Commit);

        if rip.signer.is_none() {
            tracing::debug!(directory = %rip.directory.display(), "Verify only; nothing committed");
            return;
        }

        if rip.digest_dirty {
            self.write_digest(rip);
        }

        let mut queued = std::mem::take(&mut rip.pending_renames);
        queued.sort_by_key(|r| RENAME_ORDER.iter().position(|t| *t == r.target));

        for rename in queued.iter().filter(|r| r.target != RenameTarget::Directory) {
            if let Err(message) = apply_file_rename(rip, rename.target, &rename.from, &rename.to) {
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE | IssueTags::NAME_CHANGE);
            }
        }

        let marker = rip.directory.join(MARKER_FILE_NAME);
        if marker.exists() {
            match std::fs::remove_file(&marker) {
                Ok(()) => tracing::debug!(file = %marker.display(), "Removed non-compliance marker"),
                Err(e) => tracing::warn!(file = %marker.display(), error = %e, "Cannot remove non-compliance marker"),
            }
        }

        // The directory moves last and only when nothing above failed
        if rip.update_status() < Severity::Error {
            match queued.iter().find(|r| r.target == RenameTarget::Directory) {
                Some(rename) => self.move_directory(rip, rename.to.clone()),
                None => self.clear_failure_mark(rip),
            }
        }

        rip.pending_renames = queued;
        rip.is_work_in_progress = false;
    }

    fn write_digest(&self, rip: &mut RipUnit) {
        let Some(path) = rip.digest_path.clone() else {
            return;
        };
        let body = render(rip.digest_format, &rip.digest_entries, &rip.history);
        match std::fs::write(&path, body) {
            Ok(()) => {
                tracing::info!(
                    digest = %path.display(),
                    entries = rip.digest_entries.len(),
                    history = rip.history.entries().len(),
                    "Wrote digest"
                );
                rip.digest_dirty = false;
            }
            Err(e) => {
                let message = format!("Cannot write digest {}: {}", file_name_of(&path), e);
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            }
        }
    }

    fn move_directory(&self, rip: &mut RipUnit, target: PathBuf) {
        if target == rip.directory {
            return;
        }
        match rename_path(&rip.directory, &target) {
            Ok(()) => {
                tracing::info!(from = %rip.directory.display(), to = %target.display(), "Renamed rip directory");
                relocate(rip, &target);
            }
            Err(e) => {
                let message = format!(
                    "Cannot rename directory to {}: {}",
                    file_name_of(&target),
                    e
                );
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE | IssueTags::NAME_CHANGE);
            }
        }
    }

    fn clear_failure_mark(&self, rip: &mut RipUnit) {
        match unmark_failed_directory(&rip.directory) {
            Ok(dir) if dir != rip.directory => relocate(rip, &dir),
            Ok(_) => {}
            Err(e) => {
                let message = format!("Cannot clear failure mark from {}: {}", file_name_of(&rip.directory), e);
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE | IssueTags::NAME_CHANGE);
            }
        }
    }
}

fn apply_file_rename(rip: &mut RipUnit, target: RenameTarget, from: &Path, to: &Path) -> Result<(), String> {
    let instance = match target {
        RenameTarget::Playlist => rip.playlist.as_mut(),
        RenameTarget::Log => rip.log.as_mut(),
        RenameTarget::Digest => rip.digest.as_mut(),
        RenameTarget::Directory => None,
    };
    let result = match instance {
        Some(instance) => instance.rename_to(to),
        None => rename_path(from, to),
    };
    result.map_err(|e| format!("Cannot rename {} to {}: {}", file_name_of(from), file_name_of(to), e))?;
    if target == RenameTarget::Digest {
        rip.digest_path = Some(to.to_path_buf());
    }
    Ok(())
}

/// Point every path at the renamed directory
fn relocate(rip: &mut RipUnit, new_dir: &Path) {
    let files = rip
        .log
        .iter_mut()
        .chain(rip.tracks.iter_mut())
        .chain(rip.playlist.iter_mut())
        .chain(rip.digest.iter_mut())
        .chain(rip.others.iter_mut());
    for file in files {
        file.path = new_dir.join(&file.name);
    }
    if let Some(digest_path) = rip.digest_path.as_mut() {
        *digest_path = new_dir.join(file_name_of(digest_path));
    }
    rip.directory = new_dir.to_path_buf();
}
