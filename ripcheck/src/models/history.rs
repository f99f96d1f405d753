//! Signing history carried inside a digest file
//!
//! Each entry records who did what to the rip and when. Entries are appended,
//! never edited; `proved` appears at most once.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in digest history lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const ACTION_RIPPED: &str = "ripped";
pub const ACTION_CHECKED: &str = "checked";
pub const ACTION_PROVED: &str = "proved";
pub const ACTION_CHANGED_PREFIX: &str = "changed: ";

/// One history line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: NaiveDateTime,
    pub signer: String,
    pub action: String,
}

impl HistoryEntry {
    /// Parse the body of a history comment: `YYYY-MM-DD HH:MM:SS: signer: action`
    pub fn parse(body: &str) -> Option<HistoryEntry> {
        let body = body.trim();
        // The timestamp itself contains colons, so it is split by length
        let stamp = body.get(..19)?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        let rest = body.get(19..)?.strip_prefix(':')?.trim_start();
        let (signer, action) = rest.split_once(": ")?;
        if signer.is_empty() || action.is_empty() {
            return None;
        }
        Some(HistoryEntry {
            timestamp,
            signer: signer.to_string(),
            action: action.to_string(),
        })
    }

    /// Render without the leading comment marker
    pub fn render(&self) -> String {
        format!("{}: {}: {}", self.timestamp.format(TIMESTAMP_FORMAT), self.signer, self.action)
    }

    pub fn is_proof(&self) -> bool {
        self.action == ACTION_PROVED
    }
}

/// Ordered history of a rip
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    entries: Vec<HistoryEntry>,
    #[serde(skip)]
    dirty: bool,
}

impl HistoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry read back from disk; does not mark the record dirty
    pub fn push_loaded(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Append a new entry stamped now
    pub fn add(&mut self, signer: &str, action: impl Into<String>) {
        let entry = HistoryEntry {
            timestamp: Utc::now().naive_utc(),
            signer: signer.to_string(),
            action: action.into(),
        };
        tracing::debug!(signer, action = %entry.action, "History entry added");
        self.entries.push(entry);
        self.dirty = true;
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_signer(&self) -> Option<&str> {
        self.entries.last().map(|e| e.signer.as_str())
    }

    pub fn last_action(&self) -> Option<&str> {
        self.entries.last().map(|e| e.action.as_str())
    }

    /// Signer of the `proved` entry, if any
    pub fn prover(&self) -> Option<&str> {
        self.entries.iter().find(|e| e.is_proof()).map(|e| e.signer.as_str())
    }

    pub fn has_proof(&self) -> bool {
        self.prover().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let entry = HistoryEntry::parse("2026-10-17 09:30:00: bob: changed: fixed title").unwrap();
        assert_eq!(entry.signer, "bob");
        assert_eq!(entry.action, "changed: fixed title");
        assert_eq!(entry.render(), "2026-10-17 09:30:00: bob: changed: fixed title");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(HistoryEntry::parse("self-check abcdef").is_none());
        assert!(HistoryEntry::parse("2026-10-17 09:30:00: nobody").is_none());
    }

    #[test]
    fn test_record_tracks_dirty_and_proof() {
        let mut record = HistoryRecord::new();
        record.push_loaded(HistoryEntry::parse("2026-10-16 12:00:00: alice: ripped").unwrap());
        assert!(!record.is_dirty());
        assert!(!record.has_proof());

        record.add("bob", ACTION_PROVED);
        assert!(record.is_dirty());
        assert_eq!(record.prover(), Some("bob"));
        assert_eq!(record.last_signer(), Some("bob"));
        assert_eq!(record.last_action(), Some(ACTION_PROVED));
        assert_eq!(record.entries().len(), 2);
    }
}
