//! Digest file parser and writer
//!
//! A digest lists `<hex> *<name>` lines followed by comment lines carrying the
//! signing history. The last comment is a self-check: the digest of every byte
//! before it, computed with the file's own algorithm.

use super::{looks_like_text, read_capped, FormatInstance, FormatPayload, ReadSeek};
use crate::models::history::{HistoryEntry, HistoryRecord};
use ripcheck_common::config::DigestFormat;
use ripcheck_common::hashing::{to_hex, Hasher};
use ripcheck_common::{IssueTags, Severity};
use std::path::Path;

const MAX_DIGEST_SIZE: u64 = 1024 * 1024;
const SELF_CHECK_LABEL: &str = "self-check ";

/// First line of every digest this tool writes
pub fn header_line() -> String {
    format!("; ripcheck {} digest", env!("CARGO_PKG_VERSION"))
}

/// One hashed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub hex: String,
    pub name: String,
}

impl DigestEntry {
    pub fn new(hex: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hex: hex.into().to_ascii_lowercase(),
            name: name.into(),
        }
    }
}

/// Parsed digest contents
#[derive(Debug, Clone)]
pub struct DigestData {
    pub format: DigestFormat,
    pub entries: Vec<DigestEntry>,
    pub history: HistoryRecord,
    /// `None` when the file carries no self-check line
    pub self_check_ok: Option<bool>,
}

pub fn parse_md5(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    parse_with(DigestFormat::Md5, source, header, path)
}

pub fn parse_sha1(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    parse_with(DigestFormat::Sha1, source, header, path)
}

pub fn parse_sha256(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    parse_with(DigestFormat::Sha256, source, header, path)
}

fn display_name(format: DigestFormat) -> &'static str {
    match format {
        DigestFormat::Md5 => "MD5",
        DigestFormat::Sha1 => "SHA1",
        DigestFormat::Sha256 => "SHA256",
    }
}

fn parse_with(format: DigestFormat, source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    if !looks_like_text(header) {
        return None;
    }
    match header.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b';') => {}
        Some(b) if b.is_ascii_hexdigit() => {}
        _ => return None,
    }
    let bytes = read_capped(source, MAX_DIGEST_SIZE)?;
    let data = parse_bytes(format, &bytes)?;

    let mut instance = FormatInstance::new(path, display_name(format), bytes.len() as u64, FormatPayload::Digest(data.clone()))
        .with_buffer(bytes);
    match data.self_check_ok {
        Some(true) => {}
        Some(false) => {
            instance.issues.add(
                format!("{}: self-check failed; the digest was edited by hand", instance.name),
                Severity::Error,
                IssueTags::FAILURE,
            );
        }
        None => {
            instance.issues.add(
                format!("{}: digest has no self-check", instance.name),
                Severity::Noise,
                IssueTags::MISSING_HASH,
            );
        }
    }
    Some(instance)
}

/// Parse digest bytes; `None` when any non-comment line is not a hash line of `format`
pub(crate) fn parse_bytes(format: DigestFormat, bytes: &[u8]) -> Option<DigestData> {
    let mut entries = Vec::new();
    let mut history = HistoryRecord::new();
    let mut self_check_ok = None;
    let mut offset = 0usize;

    for raw in bytes.split_inclusive(|&b| b == b'\n') {
        let line_start = offset;
        offset += raw.len();
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix(';') {
            let comment = comment.trim();
            if let Some(stored) = comment.strip_prefix(SELF_CHECK_LABEL) {
                let mut hasher = format.new_hasher();
                hasher.append(&bytes[..line_start]);
                self_check_ok = Some(stored.trim().eq_ignore_ascii_case(&to_hex(&hasher.finish())));
            } else if let Some(entry) = HistoryEntry::parse(comment) {
                history.push_loaded(entry);
            }
            continue;
        }

        let (hex, rest) = line.split_once(' ')?;
        if hex.len() != format.hex_len() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let name = rest.strip_prefix('*').unwrap_or(rest.trim_start());
        if name.is_empty() {
            return None;
        }
        entries.push(DigestEntry::new(hex, name));
    }

    if entries.is_empty() {
        return None;
    }
    Some(DigestData {
        format,
        entries,
        history,
        self_check_ok,
    })
}

/// Render a complete digest body ending with its self-check
pub fn render(format: DigestFormat, entries: &[DigestEntry], history: &HistoryRecord) -> String {
    let mut body = header_line();
    body.push('\n');
    for entry in entries {
        body.push_str(&format!("{} *{}\n", entry.hex, entry.name));
    }
    for entry in history.entries() {
        body.push_str(&format!("; {}\n", entry.render()));
    }

    let mut hasher = format.new_hasher();
    hasher.append(body.as_bytes());
    body.push_str(&format!("; {}{}\n", SELF_CHECK_LABEL, to_hex(&hasher.finish())));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_entries() -> Vec<DigestEntry> {
        vec![
            DigestEntry::new("0123456789abcdef0123456789abcdef", "Work.FLAC.alice.log"),
            DigestEntry::new("fedcba9876543210fedcba9876543210", "Work.m3u"),
            DigestEntry::new("00112233445566778899aabbccddeeff", "01 - Intro.flac"),
        ]
    }

    fn sample_history() -> HistoryRecord {
        let mut history = HistoryRecord::new();
        history.push_loaded(HistoryEntry::parse("2026-10-16 12:00:00: alice: ripped").unwrap());
        history
    }

    fn parse_str(format: DigestFormat, text: &str) -> Option<FormatInstance> {
        let bytes = text.as_bytes().to_vec();
        let header = bytes[..bytes.len().min(44)].to_vec();
        parse_with(format, &mut Cursor::new(bytes), &header, Path::new("Work.FLAC.alice.md5"))
    }

    #[test]
    fn test_rendered_digest_parses_clean() {
        let body = render(DigestFormat::Md5, &sample_entries(), &sample_history());
        assert!(body.starts_with("; ripcheck "));

        let instance = parse_str(DigestFormat::Md5, &body).unwrap();
        assert!(instance.issues.is_empty());
        let FormatPayload::Digest(data) = &instance.payload else {
            panic!("expected digest payload");
        };
        assert_eq!(data.entries, sample_entries());
        assert_eq!(data.history, sample_history());
        assert_eq!(data.self_check_ok, Some(true));
    }

    #[test]
    fn test_hand_edit_breaks_self_check() {
        let body = render(DigestFormat::Md5, &sample_entries(), &sample_history()).replace("Intro", "Outro");
        let instance = parse_str(DigestFormat::Md5, &body).unwrap();
        assert_eq!(instance.issues.max_severity(), Severity::Error);
    }

    #[test]
    fn test_wrong_hash_length_is_rejected() {
        let body = render(DigestFormat::Md5, &sample_entries(), &sample_history());
        assert!(parse_str(DigestFormat::Sha1, &body).is_none());
    }

    #[test]
    fn test_plain_md5sum_output() {
        let instance = parse_str(
            DigestFormat::Md5,
            "00112233445566778899aabbccddeeff  01 - Intro.flac\r\n",
        )
        .unwrap();
        let FormatPayload::Digest(data) = &instance.payload else {
            panic!("expected digest payload");
        };
        assert_eq!(data.entries[0].name, "01 - Intro.flac");
        assert_eq!(data.self_check_ok, None);
        assert_eq!(instance.issues.max_severity(), Severity::Noise);
    }

    #[test]
    fn test_prose_is_not_a_digest() {
        assert!(parse_str(DigestFormat::Md5, "; just a comment\n").is_none());
        assert!(parse_str(DigestFormat::Md5, "abc def\n").is_none());
    }
}
