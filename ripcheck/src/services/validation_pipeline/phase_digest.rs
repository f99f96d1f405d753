//! DIGESTVALIDATE phase: sign a fresh rip or diff a signed one against its digest

use super::RipValidator;
use crate::formats::digest::{DigestData, DigestEntry};
use crate::formats::{extension_of, file_name_of, FormatPayload};
use crate::models::history::{ACTION_CHECKED, ACTION_PROVED, ACTION_RIPPED};
use crate::models::{QueuedRename, RenameTarget, RipUnit, ValidationState};
use crate::services::dir_scanner::DirectoryListing;
use crate::services::naming::{change_summary, digest_name, parse_digest_name, signed_log_name};
use crate::services::web_verifier::WebCheckResult;
use ripcheck_common::{Hashes, IssueTags, Severity};
use std::path::Path;
use std::path::PathBuf;

/// Digest lines grouped by role
struct DigestLayout<'a> {
    log: Vec<&'a DigestEntry>,
    playlist: Vec<&'a DigestEntry>,
    audio: Vec<&'a DigestEntry>,
    audio_contiguous: bool,
}

impl<'a> DigestLayout<'a> {
    fn of(entries: &'a [DigestEntry]) -> Self {
        let mut layout = DigestLayout {
            log: Vec::new(),
            playlist: Vec::new(),
            audio: Vec::new(),
            audio_contiguous: true,
        };
        let mut audio_positions = Vec::new();
        for (position, entry) in entries.iter().enumerate() {
            match extension_of(Path::new(&entry.name)).as_deref() {
                Some("log") => layout.log.push(entry),
                Some("m3u") | Some("m3u8") => layout.playlist.push(entry),
                Some("flac") => {
                    audio_positions.push(position);
                    layout.audio.push(entry);
                }
                _ => {}
            }
        }
        layout.audio_contiguous = audio_positions.windows(2).all(|w| w[1] == w[0] + 1);
        layout
    }
}

impl RipValidator {
    pub(super) fn phase_digest(&mut self, rip: &mut RipUnit, listing: &DirectoryListing) {
        self.enter(rip, ValidationState::DigestValidate);

        match listing.digests.first() {
            Some(path) => self.revalidate(rip, path),
            None => self.first_signing(rip),
        }
    }

    fn first_signing(&mut self, rip: &mut RipUnit) {
        let Some(signer) = rip.signer.clone() else {
            self.add_issue(rip, "Rip is not signed; no digest", Severity::Advisory, IssueTags::MISSING_HASH);
            return;
        };
        let work = rip.work_name.clone().unwrap_or_default();

        rip.digest_format = self.config.digest_format;
        rip.is_first_signing = true;
        rip.history.add(&signer, ACTION_RIPPED);
        self.add_proof_if_earned(rip, &signer);

        let log_name = signed_log_name(&work, &signer);
        if !self.collect_entries(rip, &log_name) {
            return;
        }
        self.queue_log_rename(rip, &log_name);
        rip.digest_path = Some(rip.directory.join(digest_name(&work, &signer, rip.digest_format)));
        rip.digest_dirty = true;

        tracing::info!(
            directory = %rip.directory.display(),
            signer = %signer,
            entries = rip.digest_entries.len(),
            "First signing prepared"
        );
    }

    fn revalidate(&mut self, rip: &mut RipUnit, path: &Path) {
        self.emit_file_started(path);
        let mut digest = match self.registry.create_model(path, Hashes::empty(), false) {
            Some(digest) if matches!(digest.payload, FormatPayload::Digest(_)) => digest,
            _ => {
                let message = format!("{} is not a readable digest", file_name_of(path));
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
                return;
            }
        };
        self.adopt(rip, &mut digest);

        let data: DigestData = match &digest.payload {
            FormatPayload::Digest(data) => data.clone(),
            _ => return,
        };
        let digest_name_parts = parse_digest_name(&digest.name);
        rip.digest_format = data.format;
        rip.history = data.history.clone();
        rip.digest_path = Some(digest.path.clone());
        rip.digest = Some(digest);

        let layout = DigestLayout::of(&data.entries);
        if !self.check_layout(rip, &layout) {
            return;
        }

        self.compare_log(rip, layout.log[0]);
        self.compare_playlist(rip, layout.playlist[0]);
        self.compare_tracks(rip, &layout.audio);
        if rip.issues.has_error() {
            return;
        }

        let work = rip.work_name.clone().unwrap_or_default();
        let (signed_work, name_signer) = match digest_name_parts {
            Some((signed_work, signer)) => (Some(signed_work), Some(signer)),
            None => (None, None),
        };
        if let Some(signed_work) = signed_work.filter(|w| *w != work) {
            rip.album_renames = 1;
            let message = format!("Album renamed from {} to {}", signed_work, work);
            self.add_issue(rip, message, Severity::Trivia, IssueTags::NAME_CHANGE);
        }

        let Some(name_signer) = name_signer
            .or_else(|| rip.log_signer.clone())
            .or_else(|| rip.signer.clone())
        else {
            self.add_issue(rip, "Digest name carries no signer", Severity::Error, IssueTags::FAILURE);
            return;
        };

        let changes = rip.change_count();
        if changes == 0 {
            let by = rip.history.last_signer().unwrap_or(name_signer.as_str()).to_string();
            self.add_issue(rip, format!("No changes since last signing by {}", by), Severity::Trivia, IssueTags::SUCCESS);
            tracing::debug!(last_signer = %by, last_action = rip.history.last_action().unwrap_or("-"), "Digest unchanged");
            if let Some(signer) = rip.signer.clone() {
                if rip.history.last_signer() != Some(signer.as_str()) {
                    rip.history.add(&signer, ACTION_CHECKED);
                }
            }
        } else if rip.signer.is_none() {
            let (summary, _) = change_summary(rip.track_edits, rip.track_renames, rip.album_renames);
            let message = format!("{}; a signer is required to sign the changes", summary);
            self.add_issue(rip, message, Severity::Warning, IssueTags::NAME_CHANGE | IssueTags::META_CHANGE);
        } else {
            // COMMENTPROMPT records the change entry
            rip.digest_dirty = true;
        }

        if let Some(signer) = rip.signer.clone() {
            self.add_proof_if_earned(rip, &signer);
        }

        let needs_rename = rip.digest_path.as_ref().and_then(|p| p.file_name()).map(|n| n.to_string_lossy().to_string())
            != Some(digest_name(&work, &name_signer, rip.digest_format));
        rip.digest_dirty |= rip.history.is_dirty();
        if rip.signer.is_none() || (!rip.digest_dirty && !needs_rename) {
            return;
        }

        let log_name = signed_log_name(&work, &name_signer);
        if !self.collect_entries(rip, &log_name) {
            return;
        }
        self.queue_log_rename(rip, &log_name);
        if needs_rename {
            if let Some(from) = rip.digest_path.clone() {
                let to = from.with_file_name(digest_name(&work, &name_signer, rip.digest_format));
                rip.pending_renames.push(QueuedRename {
                    target: RenameTarget::Digest,
                    from,
                    to,
                });
            }
            rip.digest_dirty = true;
        }
    }

    fn check_layout(&self, rip: &mut RipUnit, layout: &DigestLayout<'_>) -> bool {
        let mut ok = true;
        if layout.log.len() != 1 {
            let message = format!("Digest lists {} logs; expected one", layout.log.len());
            self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            ok = false;
        }
        if layout.playlist.len() != 1 {
            let message = format!("Digest lists {} playlists; expected one", layout.playlist.len());
            self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            ok = false;
        }
        if !layout.audio_contiguous {
            self.add_issue(rip, "Digest audio entries are not contiguous", Severity::Error, IssueTags::FAILURE);
            ok = false;
        }
        if layout.audio.len() != rip.tracks.len() {
            let message = format!(
                "Digest lists {} tracks but the rip has {}",
                layout.audio.len(),
                rip.tracks.len()
            );
            self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            ok = false;
        }
        ok
    }

    fn compare_log(&self, rip: &mut RipUnit, entry: &DigestEntry) {
        let format = rip.digest_format;
        let Some(log) = rip.log.as_mut() else {
            return;
        };
        match log.file_hash_hex(format) {
            Ok(hex) if hex == entry.hex => {}
            Ok(_) => {
                let message = format!("{} was modified since signing", log.name);
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE | IssueTags::PROVE_ERR);
            }
            Err(e) => {
                let message = format!("Cannot hash {}: {}", log.name, e);
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            }
        }
    }

    fn compare_playlist(&self, rip: &mut RipUnit, entry: &DigestEntry) {
        let format = rip.digest_format;
        let rewritten = rip.playlist_rewritten;
        let Some(playlist) = rip.playlist.as_mut() else {
            let message = format!("Playlist {} listed in the digest is missing", entry.name);
            self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            return;
        };
        match playlist.file_hash_hex(format) {
            Ok(hex) if hex == entry.hex => {}
            Ok(_) if rewritten => {
                tracing::debug!(playlist = %playlist.name, "Playlist differs from digest after rewrite");
            }
            Ok(_) => {
                let message = format!("{} was modified since signing", playlist.name);
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            }
            Err(e) => {
                let message = format!("Cannot hash {}: {}", playlist.name, e);
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            }
        }
    }

    /// Count renames and edits per ordinal; audio content was already matched against the log
    fn compare_tracks(&self, rip: &mut RipUnit, entries: &[&DigestEntry]) {
        let format = rip.digest_format;
        let mut renames = 0;
        let mut edits = 0;
        let mut found = Vec::new();

        for (position, (track, entry)) in rip.tracks.iter_mut().zip(entries).enumerate() {
            if track.name != entry.name {
                renames += 1;
                found.push((
                    format!("Track {} renamed from {} to {}", position + 1, entry.name, track.name),
                    Severity::Trivia,
                    IssueTags::NAME_CHANGE,
                ));
            }
            match track.file_hash_hex(format) {
                Ok(hex) if hex == entry.hex => {}
                Ok(_) => {
                    edits += 1;
                    found.push((
                        format!("{} tags changed since signing", track.name),
                        Severity::Trivia,
                        IssueTags::META_CHANGE,
                    ));
                }
                Err(e) => found.push((format!("Cannot hash {}: {}", track.name, e), Severity::Error, IssueTags::FAILURE)),
            }
        }

        rip.track_renames = renames;
        rip.track_edits = edits;
        for (message, severity, tags) in found {
            self.add_issue(rip, message, severity, tags);
        }
    }

    /// Build digest lines in written order: log, playlist, then audio
    ///
    /// `log_name` is the name the log will carry after commit.
    fn collect_entries(&self, rip: &mut RipUnit, log_name: &str) -> bool {
        let format = rip.digest_format;
        let playlist_name = rip
            .pending_renames
            .iter()
            .find(|r| r.target == RenameTarget::Playlist)
            .map(|r| file_name_of(&r.to))
            .or_else(|| rip.playlist.as_ref().map(|p| p.name.clone()));

        let mut entries = Vec::with_capacity(rip.tracks.len() + 2);
        let mut failures = Vec::new();

        if let Some(log) = rip.log.as_mut() {
            match log.file_hash_hex(format) {
                Ok(hex) => entries.push(DigestEntry::new(hex, log_name)),
                Err(e) => failures.push(format!("Cannot hash {}: {}", log.name, e)),
            }
        }
        if let (Some(playlist), Some(name)) = (rip.playlist.as_mut(), playlist_name) {
            match playlist.file_hash_hex(format) {
                Ok(hex) => entries.push(DigestEntry::new(hex, name)),
                Err(e) => failures.push(format!("Cannot hash {}: {}", playlist.name, e)),
            }
        }
        for track in rip.tracks.iter_mut() {
            match track.file_hash_hex(format) {
                Ok(hex) => entries.push(DigestEntry::new(hex, track.name.clone())),
                Err(e) => failures.push(format!("Cannot hash {}: {}", track.name, e)),
            }
        }

        let ok = failures.is_empty();
        for message in failures {
            self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
        }
        rip.digest_entries = entries;
        ok
    }

    fn queue_log_rename(&self, rip: &mut RipUnit, log_name: &str) {
        let Some(log) = rip.log.as_ref() else {
            return;
        };
        if log.name != log_name {
            let from: PathBuf = log.path.clone();
            let to = from.with_file_name(log_name);
            rip.pending_renames.push(QueuedRename {
                target: RenameTarget::Log,
                from,
                to,
            });
        }
    }

    /// Append `proved` once, for a clean log the web channel confirmed
    fn add_proof_if_earned(&self, rip: &mut RipUnit, signer: &str) {
        if rip.history.has_proof() || rip.web_check != Some(WebCheckResult::Success) {
            return;
        }
        let clean = rip.log.as_ref().is_some_and(|log| {
            log.issues.count_at_least(Severity::Warning) == 0
                && matches!(&log.payload, FormatPayload::Log(data) if data.all_accurate())
        });
        if clean {
            rip.history.add(signer, ACTION_PROVED);
            tracing::info!(signer, "Rip proved");
        }
    }
}
