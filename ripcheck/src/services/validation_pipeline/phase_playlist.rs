//! PLAYLISTVALIDATE phase: check the playlist against the tracks, creating it on first signing

use super::RipValidator;
use crate::formats::m3u::{render, PlaylistData};
use crate::formats::{file_name_of, FormatPayload};
use crate::models::{QueuedRename, RenameTarget, RipUnit, ValidationState};
use crate::services::dir_scanner::DirectoryListing;
use crate::services::naming::playlist_name;
use ripcheck_common::{IssueTags, Severity};
use std::path::Path;

impl RipValidator {
    pub(super) fn phase_playlist(&mut self, rip: &mut RipUnit, listing: &DirectoryListing) {
        self.enter(rip, ValidationState::PlaylistValidate);

        let track_names: Vec<String> = rip.tracks.iter().map(|t| t.name.clone()).collect();
        match listing.playlists.first() {
            Some(path) => self.check_playlist(rip, path, &track_names),
            None => self.create_playlist(rip, &track_names),
        }
    }

    fn check_playlist(&mut self, rip: &mut RipUnit, path: &Path, track_names: &[String]) {
        self.emit_file_started(path);
        let mut playlist = match self.registry.create_model(path, self.file_hashes(), false) {
            Some(playlist) if matches!(playlist.payload, FormatPayload::Playlist(_)) => playlist,
            _ => {
                let message = format!("{} is not a readable playlist", file_name_of(path));
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
                return;
            }
        };
        self.adopt(rip, &mut playlist);

        let entries = match &playlist.payload {
            FormatPayload::Playlist(data) => data.entries.clone(),
            _ => Vec::new(),
        };
        let listed: Vec<&str> = entries.iter().map(|e| PlaylistData::entry_file_name(e)).collect();

        if listed != track_names {
            // Entries that only lag behind this run's own track renames are rewritten
            let stale_only = listed.len() == track_names.len()
                && listed.iter().zip(track_names).all(|(entry, track)| {
                    *entry == track.as_str()
                        || rip.renamed_tracks.iter().any(|(old, new)| old == entry && new == track)
                });

            if stale_only && rip.signer.is_some() {
                match playlist.replace_contents(render(track_names).as_bytes()) {
                    Ok(()) => {
                        tracing::info!(playlist = %playlist.name, "Playlist rewritten for renamed tracks");
                        playlist.payload = FormatPayload::Playlist(PlaylistData {
                            extended: false,
                            entries: track_names.to_vec(),
                        });
                        playlist.issues.add("Playlist updated for renamed tracks", Severity::Trivia, IssueTags::NAME_CHANGE);
                        rip.playlist_rewritten = true;
                    }
                    Err(e) => {
                        playlist.issues.add(
                            format!("Cannot rewrite playlist: {}", e),
                            Severity::Error,
                            IssueTags::FAILURE,
                        );
                    }
                }
            } else {
                self.report_playlist_mismatch(rip, &mut playlist.issues, &listed, track_names);
            }
        }

        if let Some(work) = rip.work_name.clone() {
            let canonical = playlist_name(&work);
            if rip.signer.is_some() && playlist.name != canonical {
                rip.pending_renames.push(QueuedRename {
                    target: RenameTarget::Playlist,
                    from: playlist.path.clone(),
                    to: playlist.path.with_file_name(canonical),
                });
            }
        }
        rip.playlist = Some(playlist);
    }

    fn report_playlist_mismatch(
        &self,
        rip: &RipUnit,
        issues: &mut ripcheck_common::IssueVector,
        listed: &[&str],
        track_names: &[String],
    ) {
        let first_new = issues.len();
        if listed.len() != track_names.len() {
            issues.add(
                format!("Playlist lists {} entries for {} tracks", listed.len(), track_names.len()),
                Severity::Error,
                IssueTags::FAILURE,
            );
        }
        for (position, entry) in listed.iter().enumerate() {
            if !rip.directory.join(entry).is_file() {
                issues.add(
                    format!("Playlist entry {} does not exist", entry),
                    Severity::Error,
                    IssueTags::FAILURE,
                );
            } else if track_names.get(position).map(String::as_str) != Some(*entry) {
                issues.add(
                    format!("Playlist entry {} is out of order", entry),
                    Severity::Error,
                    IssueTags::FAILURE,
                );
            }
        }
        for issue in &issues.items()[first_new..] {
            self.emit_issue("playlist", issues.effective_severity(issue), issue.message());
        }
    }

    fn create_playlist(&mut self, rip: &mut RipUnit, track_names: &[String]) {
        if rip.signer.is_none() {
            self.add_issue(rip, "No playlist", Severity::Trivia, IssueTags::empty());
            return;
        }
        let work = rip.work_name.clone().unwrap_or_else(|| {
            rip.directory
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        let path = rip.directory.join(playlist_name(&work));
        if let Err(e) = std::fs::write(&path, render(track_names)) {
            let message = format!("Cannot write playlist {}: {}", path.display(), e);
            self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            return;
        }
        tracing::info!(playlist = %path.display(), entries = track_names.len(), "Created playlist");

        self.emit_file_started(&path);
        match self.registry.create_model(&path, self.file_hashes(), false) {
            Some(mut playlist) => {
                playlist.close();
                rip.playlist = Some(playlist);
            }
            None => {
                let message = format!("Created playlist {} cannot be read back", path.display());
                self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE);
            }
        }
    }
}
