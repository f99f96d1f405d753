//! ALBUMNAMING phase: derive the canonical work name and rename tracks to match

use super::RipValidator;
use crate::formats::flac::VorbisTags;
use crate::formats::FormatPayload;
use crate::models::{QueuedRename, RenameTarget, RipUnit, ValidationState};
use crate::services::naming::{sanitize_file_name, strip_failed_prefix, track_name};
use ripcheck_common::config::NamingStrategy;
use ripcheck_common::{IssueTags, Severity};

/// Outcome of comparing one tag across every track
#[derive(Debug, PartialEq, Eq)]
enum Consensus {
    Agreed(String),
    Missing,
    Conflict(Vec<String>),
}

fn consensus(tags: &[&VorbisTags], key: &str) -> Consensus {
    let mut values: Vec<String> = Vec::new();
    let mut missing = false;
    for track in tags {
        match track.get(key).map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => {
                if !values.iter().any(|v| v == value) {
                    values.push(value.to_string());
                }
            }
            None => missing = true,
        }
    }
    match (values.len(), missing) {
        (0, _) => Consensus::Missing,
        (1, false) => Consensus::Agreed(values.remove(0)),
        (1, true) => Consensus::Missing,
        _ => Consensus::Conflict(values),
    }
}

impl RipValidator {
    pub(super) fn phase_album_naming(&mut self, rip: &mut RipUnit) {
        self.enter(rip, ValidationState::AlbumNaming);

        if rip.signer.is_none() {
            tracing::debug!(directory = %rip.directory.display(), "No signer; naming skipped");
            return;
        }
        if self.config.naming == NamingStrategy::Manual {
            tracing::debug!(directory = %rip.directory.display(), "Manual naming; names left as found");
            return;
        }

        let Some(canonical) = self.canonical_work_name(rip) else {
            return;
        };
        let Some(titles) = self.track_titles(rip) else {
            return;
        };

        self.rename_tracks(rip, &titles);

        if rip.work_name.as_deref() != Some(canonical.as_str()) {
            tracing::info!(
                from = rip.work_name.as_deref().unwrap_or("-"),
                to = %canonical,
                "Work renamed to match tags"
            );
        }

        let dir_name = rip
            .directory
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if strip_failed_prefix(&dir_name) != canonical {
            let to = rip.directory.with_file_name(&canonical);
            rip.pending_renames.push(QueuedRename {
                target: RenameTarget::Directory,
                from: rip.directory.clone(),
                to,
            });
        }
        rip.work_name = Some(canonical);
    }

    /// Work name from album-level tags; records `Error` issues when they disagree
    fn canonical_work_name(&self, rip: &mut RipUnit) -> Option<String> {
        let tags: Vec<&VorbisTags> = rip
            .tracks
            .iter()
            .filter_map(|t| match &t.payload {
                FormatPayload::Flac(data) => Some(&data.tags),
                _ => None,
            })
            .collect();

        let album = consensus(&tags, "ALBUM");
        let artist = match self.config.naming {
            NamingStrategy::ArtistTitle => match consensus(&tags, "ALBUMARTIST") {
                Consensus::Agreed(value) => Some(Consensus::Agreed(value)),
                _ => Some(consensus(&tags, "ARTIST")),
            },
            _ => None,
        };
        if let Consensus::Conflict(values) = consensus(&tags, "DATE") {
            let message = format!("Tracks disagree on DATE: {}", values.join(", "));
            self.add_issue(rip, message, Severity::Warning, IssueTags::BAD_TAG);
        }

        let album = match album {
            Consensus::Agreed(album) => album,
            Consensus::Missing => {
                self.add_issue(rip, "ALBUM tag missing from one or more tracks", Severity::Error, IssueTags::BAD_TAG);
                return None;
            }
            Consensus::Conflict(values) => {
                let message = format!("Tracks disagree on ALBUM: {}", values.join(", "));
                self.add_issue(rip, message, Severity::Error, IssueTags::BAD_TAG);
                return None;
            }
        };

        let name = match artist {
            None => album,
            Some(Consensus::Agreed(artist)) => format!("{} - {}", artist, album),
            Some(Consensus::Missing) => {
                self.add_issue(rip, "ARTIST tag missing from one or more tracks", Severity::Error, IssueTags::BAD_TAG);
                return None;
            }
            Some(Consensus::Conflict(values)) => {
                let message = format!("Tracks disagree on ARTIST and no ALBUMARTIST is set: {}", values.join(", "));
                self.add_issue(rip, message, Severity::Error, IssueTags::BAD_TAG);
                return None;
            }
        };

        let name = sanitize_file_name(&name);
        if name.is_empty() {
            self.add_issue(rip, "Album tags produce an empty name", Severity::Error, IssueTags::BAD_TAG);
            return None;
        }
        Some(name)
    }

    fn track_titles(&self, rip: &mut RipUnit) -> Option<Vec<String>> {
        let mut titles = Vec::with_capacity(rip.tracks.len());
        let mut untitled = Vec::new();
        for track in &rip.tracks {
            let title = match &track.payload {
                FormatPayload::Flac(data) => data.tags.get("TITLE").map(str::trim).filter(|t| !t.is_empty()),
                _ => None,
            };
            match title {
                Some(title) => titles.push(title.to_string()),
                None => untitled.push(track.name.clone()),
            }
        }
        if untitled.is_empty() {
            return Some(titles);
        }
        for name in untitled {
            self.add_issue(rip, format!("{} has no TITLE tag", name), Severity::Error, IssueTags::BAD_TAG);
        }
        None
    }

    fn rename_tracks(&self, rip: &mut RipUnit, titles: &[String]) {
        let mut failures = Vec::new();
        for (position, (track, title)) in rip.tracks.iter_mut().zip(titles).enumerate() {
            let desired = track_name(position + 1, title);
            if track.name == desired {
                continue;
            }
            let old_name = track.name.clone();
            let new_path = track.path.with_file_name(&desired);
            match track.rename_to(&new_path) {
                Ok(()) => {
                    rip.renamed_tracks.push((old_name, desired));
                    rip.track_renames += 1;
                }
                Err(e) => failures.push(format!("Cannot rename {} to {}: {}", old_name, desired, e)),
            }
        }
        for message in failures {
            self.add_issue(rip, message, Severity::Error, IssueTags::FAILURE | IssueTags::NAME_CHANGE);
        }
    }
}
