//! Per-directory validation state
//!
//! A [`RipUnit`] is created when the pipeline enters a directory and carries
//! everything later stages need: the parsed files, the change counters, the
//! working history and the renames queued for commit.
//!
//! DIRECTORYSCAN → LOGPARSE → AUDIOSETVALIDATE → ALBUMNAMING →
//! PLAYLISTVALIDATE → DIGESTVALIDATE → COMMENTPROMPT → COMMIT → COMPLETED,
//! with FAILED reachable from every stage.

use crate::formats::digest::DigestEntry;
use crate::formats::FormatInstance;
use crate::models::history::HistoryRecord;
use crate::services::web_verifier::WebCheckResult;
use chrono::{DateTime, Utc};
use ripcheck_common::config::DigestFormat;
use ripcheck_common::{IssueVector, Severity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Trailer for a clean first signing
pub const TRAILER_UBER: &str = "rip is uber";
/// Trailer for a clean re-validation
pub const TRAILER_STILL_UBER: &str = "rip is still uber";
/// Trailer for anything at `Warning` or above
pub const TRAILER_NOT_UBER: &str = "rip is not uber";

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationState {
    DirectoryScan,
    LogParse,
    AudioSetValidate,
    AlbumNaming,
    PlaylistValidate,
    DigestValidate,
    CommentPrompt,
    Commit,
    Completed,
    Failed,
}

impl ValidationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationState::DirectoryScan => "DIRECTORYSCAN",
            ValidationState::LogParse => "LOGPARSE",
            ValidationState::AudioSetValidate => "AUDIOSETVALIDATE",
            ValidationState::AlbumNaming => "ALBUMNAMING",
            ValidationState::PlaylistValidate => "PLAYLISTVALIDATE",
            ValidationState::DigestValidate => "DIGESTVALIDATE",
            ValidationState::CommentPrompt => "COMMENTPROMPT",
            ValidationState::Commit => "COMMIT",
            ValidationState::Completed => "COMPLETED",
            ValidationState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ValidationState::Completed | ValidationState::Failed)
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub old_state: ValidationState,
    pub new_state: ValidationState,
    pub transitioned_at: DateTime<Utc>,
}

/// What a queued rename moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenameTarget {
    Digest,
    Playlist,
    Log,
    Directory,
}

/// A rename applied at commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRename {
    pub target: RenameTarget,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Everything known about one rip directory
#[derive(Debug)]
pub struct RipUnit {
    pub directory: PathBuf,
    pub state: ValidationState,
    /// Stages entered, in order
    pub transitions: Vec<StateTransition>,
    /// Running maximum severity over every issue vector
    pub status: Severity,
    pub signer: Option<String>,

    /// Work name from the log file name, replaced by the canonical name
    pub work_name: Option<String>,
    /// Signer embedded in the log file name
    pub log_signer: Option<String>,
    pub is_work_in_progress: bool,
    pub is_first_signing: bool,

    /// Directory-level issues
    pub issues: IssueVector,
    pub log: Option<FormatInstance>,
    /// Audio files in matched order
    pub tracks: Vec<FormatInstance>,
    pub playlist: Option<FormatInstance>,
    pub digest: Option<FormatInstance>,
    /// Other recognized files
    pub others: Vec<FormatInstance>,

    pub track_edits: usize,
    pub track_renames: usize,
    pub album_renames: usize,
    /// (old, new) names of tracks renamed this run
    pub renamed_tracks: Vec<(String, String)>,
    pub playlist_rewritten: bool,

    pub history: HistoryRecord,
    pub digest_format: DigestFormat,
    pub digest_entries: Vec<DigestEntry>,
    /// Where the digest lives now or will be written
    pub digest_path: Option<PathBuf>,
    pub digest_dirty: bool,
    pub comment: Option<String>,
    pub pending_renames: Vec<QueuedRename>,
    pub web_check: Option<WebCheckResult>,

    pub trailer: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RipUnit {
    pub fn new(directory: &Path, signer: Option<String>, issues: IssueVector, digest_format: DigestFormat) -> Self {
        Self {
            directory: directory.to_path_buf(),
            state: ValidationState::DirectoryScan,
            transitions: Vec::new(),
            status: Severity::NoIssue,
            signer,
            work_name: None,
            log_signer: None,
            is_work_in_progress: true,
            is_first_signing: false,
            issues,
            log: None,
            tracks: Vec::new(),
            playlist: None,
            digest: None,
            others: Vec::new(),
            track_edits: 0,
            track_renames: 0,
            album_renames: 0,
            renamed_tracks: Vec::new(),
            playlist_rewritten: false,
            history: HistoryRecord::new(),
            digest_format,
            digest_entries: Vec::new(),
            digest_path: None,
            digest_dirty: false,
            comment: None,
            pending_renames: Vec::new(),
            web_check: None,
            trailer: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: ValidationState) -> StateTransition {
        let transition = StateTransition {
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        self.transitions.push(transition.clone());
        transition
    }

    /// True when `state` was entered at some point
    pub fn visited(&self, state: ValidationState) -> bool {
        self.transitions.iter().any(|t| t.new_state == state)
    }

    /// Fold every issue vector into `status`; never lowers it
    pub fn update_status(&mut self) -> Severity {
        let current = self.issue_vectors().map(|(_, v)| v.max_severity()).max().unwrap_or_default();
        self.status = self.status.max(current);
        self.status
    }

    /// (subject, issues) for the directory and every parsed file
    pub fn issue_vectors(&self) -> impl Iterator<Item = (&str, &IssueVector)> {
        let files = self
            .log
            .iter()
            .chain(self.tracks.iter())
            .chain(self.playlist.iter())
            .chain(self.digest.iter())
            .chain(self.others.iter())
            .map(|f| (f.name.as_str(), &f.issues));
        std::iter::once(("directory", &self.issues)).chain(files)
    }

    /// Changes found since the last signing
    pub fn change_count(&self) -> usize {
        self.track_edits + self.track_renames + self.album_renames
    }

    /// Itemized report lines at or above `threshold`
    pub fn report(&self, threshold: Severity) -> Vec<String> {
        self.issue_vectors().flat_map(|(_, v)| v.report(threshold)).collect()
    }

    /// Closing sentence for the directory
    pub fn trailer_sentence(&self) -> &'static str {
        if self.status >= Severity::Warning {
            TRAILER_NOT_UBER
        } else if self.is_first_signing || (self.signer.is_none() && self.digest.is_none()) {
            TRAILER_UBER
        } else {
            TRAILER_STILL_UBER
        }
    }

    /// Release every file handle
    pub fn close_all(&mut self) {
        let files = self
            .log
            .iter_mut()
            .chain(self.tracks.iter_mut())
            .chain(self.playlist.iter_mut())
            .chain(self.digest.iter_mut())
            .chain(self.others.iter_mut());
        for file in files {
            file.close();
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == ValidationState::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::FormatPayload;
    use ripcheck_common::IssueTags;

    fn unit() -> RipUnit {
        RipUnit::new(Path::new("/music/rip"), Some("alice".into()), IssueVector::new(), DigestFormat::Md5)
    }

    #[test]
    fn test_transitions_recorded() {
        let mut rip = unit();
        rip.transition_to(ValidationState::LogParse);
        let t = rip.transition_to(ValidationState::Failed);
        assert_eq!(t.old_state, ValidationState::LogParse);
        assert!(rip.visited(ValidationState::LogParse));
        assert!(!rip.visited(ValidationState::Commit));
        assert!(rip.ended_at.is_some());
        assert!(rip.is_failed());
    }

    #[test]
    fn test_status_never_decreases() {
        let mut rip = unit();
        let mut track = FormatInstance::new(Path::new("01 - A.flac"), "FLAC", 10, FormatPayload::Ogg);
        track.issues.add("bad", Severity::Error, IssueTags::FAILURE);
        rip.tracks.push(track);
        assert_eq!(rip.update_status(), Severity::Error);

        rip.tracks.clear();
        assert_eq!(rip.update_status(), Severity::Error);
    }

    #[test]
    fn test_trailer_sentences() {
        let mut rip = unit();
        rip.is_first_signing = true;
        assert_eq!(rip.trailer_sentence(), TRAILER_UBER);
        rip.is_first_signing = false;
        assert_eq!(rip.trailer_sentence(), TRAILER_STILL_UBER);
        rip.status = Severity::Warning;
        assert_eq!(rip.trailer_sentence(), TRAILER_NOT_UBER);
    }
}
