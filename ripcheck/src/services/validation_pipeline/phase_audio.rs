//! AUDIOSETVALIDATE phase: parse every track and match it against the log

use super::RipValidator;
use crate::formats::{file_name_of, FormatInstance, FormatPayload};
use crate::models::{RipUnit, ValidationState};
use crate::services::dir_scanner::DirectoryListing;
use ripcheck_common::{Hashes, IssueTags, Severity};

fn tag_track_number(track: &FormatInstance) -> Option<u32> {
    match &track.payload {
        FormatPayload::Flac(data) => data.tags.track_number(),
        _ => None,
    }
}

impl RipValidator {
    pub(super) fn phase_audio_set(&mut self, rip: &mut RipUnit, listing: &DirectoryListing) {
        self.enter(rip, ValidationState::AudioSetValidate);

        let hashes = self.file_hashes() | Hashes::INTRINSIC | Hashes::PCM_CRC32 | Hashes::PCM_MD5;
        let mut tracks = Vec::with_capacity(listing.audio.len());

        for path in &listing.audio {
            self.emit_file_started(path);
            match self.registry.create_model(path, hashes, self.config.misname_filter) {
                Some(mut track) if matches!(track.payload, FormatPayload::Flac(_)) => {
                    let offered = track.issues.repairable_count();
                    self.adopt(rip, &mut track);
                    // Repairs change the bytes, so the cached digests are stale
                    if offered > 0 && track.hashes.file_md5.is_none() {
                        if let Err(e) = track.calc_hashes(hashes.difference(Hashes::INTRINSIC)) {
                            track.issues.add(format!("Cannot rehash after repair: {}", e), Severity::Fatal, IssueTags::FAILURE);
                        }
                    }
                    tracks.push(track);
                }
                Some(mut other) => {
                    let message = format!("{} holds {} content, not FLAC", other.name, other.format_name);
                    other.issues.add(message, Severity::Fatal, IssueTags::FAILURE | IssueTags::MISNAMED);
                    self.adopt(rip, &mut other);
                    rip.others.push(other);
                }
                None => {
                    let message = format!("{} is not a readable FLAC file", file_name_of(path));
                    self.add_issue(rip, message, Severity::Fatal, IssueTags::FAILURE);
                }
            }
        }

        // Name order is the fallback; tagged track numbers take precedence
        tracks.sort_by_key(|t| tag_track_number(t).unwrap_or(u32::MAX));
        rip.tracks = tracks;

        if rip.tracks.iter().any(|t| t.issues.has_fatal()) || rip.issues.has_fatal() {
            return;
        }

        let logged: Vec<(u32, Option<u32>)> = match rip.log.as_ref().map(|l| &l.payload) {
            Some(FormatPayload::Log(data)) => data.tracks.iter().map(|t| (t.number, t.copy_crc)).collect(),
            _ => return,
        };

        if rip.tracks.len() != logged.len() {
            let message = format!(
                "{} FLAC files found but the log lists {} tracks",
                rip.tracks.len(),
                logged.len()
            );
            self.add_issue(rip, message, Severity::Fatal, IssueTags::FAILURE);
            return;
        }

        let mut found = Vec::new();
        for (position, (track, &(number, copy_crc))) in rip.tracks.iter_mut().zip(logged.iter()).enumerate() {
            let first_new = track.issues.len();
            let expected_number = position as u32 + 1;
            if let Some(tagged) = tag_track_number(track).filter(|&n| n != expected_number) {
                track.issues.add(
                    format!("{} is tagged track {} but is track {}", track.name, tagged, expected_number),
                    Severity::Warning,
                    IssueTags::BAD_TAG,
                );
            }

            let actual = track.hashes.pcm_crc32;
            match (actual, copy_crc) {
                (Some(actual), Some(expected)) if actual == expected => {
                    tracing::debug!(track = %track.name, number, crc = %format!("{:08X}", actual), "Audio matches log");
                }
                (Some(actual), Some(expected)) => {
                    track.issues.add(
                        format!(
                            "{} audio CRC {:08X} does not match log copy CRC {:08X} for track {}",
                            track.name, actual, expected, number
                        ),
                        Severity::Fatal,
                        IssueTags::FAILURE,
                    );
                }
                (_, None) => {
                    track.issues.add(
                        format!("Log has no copy CRC for track {}; {} cannot be matched", number, track.name),
                        Severity::Fatal,
                        IssueTags::FAILURE | IssueTags::MISSING_HASH,
                    );
                }
                (None, _) => {
                    track.issues.add(
                        format!("{} audio could not be decoded for matching", track.name),
                        Severity::Fatal,
                        IssueTags::FAILURE,
                    );
                }
            }

            for issue in &track.issues.items()[first_new..] {
                found.push((track.name.clone(), track.issues.effective_severity(issue), issue.message().to_string()));
            }
        }

        for (subject, severity, message) in found {
            self.emit_issue(&subject, severity, &message);
        }
        tracing::info!(
            directory = %rip.directory.display(),
            tracks = rip.tracks.len(),
            "Audio set matched against log"
        );
    }
}
