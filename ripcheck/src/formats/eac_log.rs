//! Exact Audio Copy extraction log parser
//!
//! Logs are small, so the whole file is kept in memory. Parsing is a single
//! pass over trimmed lines with a coarse section state; anything the log does
//! not report is left as `None` rather than guessed.

use super::{decode_text, looks_like_text, read_capped, FormatInstance, FormatPayload, ReadSeek};
use ripcheck_common::{IssueTags, Severity};
use std::path::Path;

/// Larger files are not treated as logs
const MAX_LOG_SIZE: u64 = 4 * 1024 * 1024;
/// Lines searched for the EAC banner
const BANNER_LINES: usize = 8;

/// One row of the TOC table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub track: u32,
    pub start_sector: u32,
    pub end_sector: u32,
}

/// One extracted track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogTrack {
    pub number: u32,
    pub filename: Option<String>,
    pub peak_level: Option<f32>,
    pub quality: Option<f32>,
    pub test_crc: Option<u32>,
    pub copy_crc: Option<u32>,
    /// AccurateRip confidence when the track was accurately ripped
    pub ar_confidence: Option<u32>,
    /// The log says the track could not be verified by AccurateRip
    pub ar_unverified: bool,
    pub copy_ok: bool,
    pub suspicious_positions: usize,
}

/// Parsed log contents
#[derive(Debug, Clone, Default)]
pub struct LogData {
    pub eac_version: Option<String>,
    pub rip_date: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub drive: Option<String>,
    pub read_mode: Option<String>,
    pub accurate_stream: Option<bool>,
    pub defeat_cache: Option<bool>,
    pub c2_pointers: Option<bool>,
    pub read_offset: Option<i32>,
    pub null_samples_in_crc: Option<bool>,
    pub gap_handling: Option<String>,
    pub toc: Vec<TocEntry>,
    pub tracks: Vec<LogTrack>,
    pub is_range_rip: bool,
    pub no_errors: bool,
    pub had_errors: bool,
    pub end_of_report: bool,
    pub checksum: Option<String>,
}

impl LogData {
    /// Every track was confirmed by AccurateRip
    pub fn all_accurate(&self) -> bool {
        !self.tracks.is_empty() && self.tracks.iter().all(|t| t.ar_confidence.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Settings,
    Toc,
    Tracks,
}

/// Parse an EAC log
pub fn parse(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    if !looks_like_text(header) {
        return None;
    }
    let bytes = read_capped(source, MAX_LOG_SIZE)?;
    let text = decode_text(&bytes);
    let is_eac = text
        .lines()
        .take(BANNER_LINES)
        .any(|l| l.contains("Exact Audio Copy") || l.contains("EAC extraction logfile"));
    if !is_eac {
        return None;
    }

    let data = parse_text(&text);
    let mut instance = FormatInstance::new(path, "LOG", bytes.len() as u64, FormatPayload::Log(LogData::default()))
        .with_buffer(bytes);
    report_issues(&mut instance, &data);

    tracing::debug!(
        file = %path.display(),
        tracks = data.tracks.len(),
        toc = data.toc.len(),
        "Parsed extraction log"
    );
    instance.payload = FormatPayload::Log(data);
    Some(instance)
}

fn yes_no(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

fn hex_u32(value: &str) -> Option<u32> {
    u32::from_str_radix(value.trim(), 16).ok()
}

fn percent(value: &str) -> Option<f32> {
    value.trim().trim_end_matches('%').trim().parse().ok()
}

/// Split `Key   : value` settings lines
fn setting(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(" : ").or_else(|| line.split_once(':'))?;
    Some((key.trim(), value.trim()))
}

fn parse_toc_row(line: &str) -> Option<TocEntry> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() < 5 {
        return None;
    }
    Some(TocEntry {
        track: fields[0].parse().ok()?,
        start_sector: fields[3].parse().ok()?,
        end_sector: fields[4].parse().ok()?,
    })
}

pub(crate) fn parse_text(text: &str) -> LogData {
    let mut data = LogData::default();
    let mut section = Section::Preamble;
    let mut expect_album_line = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("Exact Audio Copy") {
            data.eac_version = Some(line.to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("EAC extraction logfile from") {
            data.rip_date = Some(rest.trim().to_string());
            expect_album_line = true;
            continue;
        }
        if expect_album_line {
            expect_album_line = false;
            if let Some((artist, album)) = line.split_once(" / ") {
                data.artist = Some(artist.trim().to_string());
                data.album = Some(album.trim().to_string());
                continue;
            }
        }

        if line.starts_with("Used drive") {
            section = Section::Settings;
            data.drive = line.split_once(':').map(|(_, v)| v.trim().to_string());
            continue;
        }
        if line.starts_with("TOC of the extracted CD") {
            section = Section::Toc;
            continue;
        }
        if line.starts_with("Range status and errors") {
            data.is_range_rip = true;
            section = Section::Tracks;
            continue;
        }
        if let Some(rest) = line.strip_prefix("Track") {
            if !line.contains('|') {
                if let Ok(number) = rest.trim().parse::<u32>() {
                    section = Section::Tracks;
                    data.tracks.push(LogTrack {
                        number,
                        ..Default::default()
                    });
                    continue;
                }
            }
        }

        if line.starts_with("No errors occurred") || line.starts_with("No errors occured") {
            data.no_errors = true;
            continue;
        }
        if line.starts_with("There were errors") {
            data.had_errors = true;
            continue;
        }
        if line.starts_with("End of status report") {
            data.end_of_report = true;
            continue;
        }
        if let Some(rest) = line.strip_prefix("==== Log checksum") {
            data.checksum = Some(rest.trim_end_matches('=').trim().to_string());
            continue;
        }

        match section {
            Section::Preamble => {}
            Section::Settings => parse_setting_line(&mut data, line),
            Section::Toc => {
                if let Some(entry) = parse_toc_row(line) {
                    data.toc.push(entry);
                }
            }
            Section::Tracks => {
                if let Some(track) = data.tracks.last_mut() {
                    parse_track_line(track, line);
                }
            }
        }
    }
    data
}

fn parse_setting_line(data: &mut LogData, line: &str) {
    let Some((key, value)) = setting(line) else {
        return;
    };
    match key {
        "Read mode" => {
            // EAC 0.99 folds the secure-mode options into this one line
            let lower = value.to_ascii_lowercase();
            if lower.contains("accurate stream") {
                data.accurate_stream = Some(true);
            }
            if lower.contains("disable cache") {
                data.defeat_cache = Some(true);
            }
            if lower.contains("no c2") {
                data.c2_pointers = Some(false);
            }
            data.read_mode = Some(value.to_string());
        }
        "Utilize accurate stream" => data.accurate_stream = yes_no(value),
        "Defeat audio cache" => data.defeat_cache = yes_no(value),
        "Make use of C2 pointers" => data.c2_pointers = yes_no(value),
        "Read offset correction" => data.read_offset = value.parse().ok(),
        "Null samples used in CRC calculations" => data.null_samples_in_crc = yes_no(value),
        "Gap handling" => data.gap_handling = Some(value.to_string()),
        _ => {}
    }
}

fn parse_track_line(track: &mut LogTrack, line: &str) {
    if let Some(rest) = line.strip_prefix("Filename") {
        track.filename = Some(rest.trim().to_string());
    } else if let Some(rest) = line.strip_prefix("Peak level") {
        track.peak_level = percent(rest);
    } else if let Some(rest) = line.strip_prefix("Track quality") {
        track.quality = percent(rest);
    } else if let Some(rest) = line.strip_prefix("Test CRC") {
        track.test_crc = hex_u32(rest);
    } else if let Some(rest) = line.strip_prefix("Copy CRC") {
        track.copy_crc = hex_u32(rest);
    } else if let Some(rest) = line.strip_prefix("Accurately ripped") {
        // "(confidence 5)  [ABCD1234]  (AR v2)"
        track.ar_confidence = rest
            .split_once("confidence")
            .and_then(|(_, tail)| tail.trim().split(')').next())
            .and_then(|n| n.trim().parse().ok());
    } else if line.starts_with("Cannot be verified as accurate") {
        track.ar_unverified = true;
    } else if line.starts_with("Copy OK") {
        track.copy_ok = true;
    } else if line.starts_with("Suspicious position") {
        track.suspicious_positions += 1;
    }
}

fn report_issues(instance: &mut FormatInstance, data: &LogData) {
    let issues = &mut instance.issues;

    if data.tracks.is_empty() {
        issues.add("Log lists no extracted tracks", Severity::Fatal, IssueTags::FAILURE);
        return;
    }
    if data.is_range_rip {
        issues.add(
            "Range rip; tracks cannot be matched individually",
            Severity::Error,
            IssueTags::STRICT_ERR,
        );
    }

    match &data.read_mode {
        Some(mode) if mode.to_ascii_lowercase().starts_with("secure") => {}
        Some(mode) => {
            issues.add(format!("Read mode is {}, not Secure", mode), Severity::Warning, IssueTags::STRICT_ERR);
        }
        None => {
            issues.add("Log does not report the read mode", Severity::Warning, IssueTags::STRICT_ERR);
        }
    }
    if data.accurate_stream == Some(false) {
        issues.add("Accurate stream was not used", Severity::Warning, IssueTags::STRICT_ERR);
    }
    if data.defeat_cache == Some(false) {
        issues.add("Audio cache was not defeated", Severity::Warning, IssueTags::STRICT_ERR);
    }
    if data.null_samples_in_crc == Some(false) {
        issues.add(
            "Null samples were excluded from CRC calculations",
            Severity::Warning,
            IssueTags::STRICT_ERR,
        );
    }

    if !data.toc.is_empty() && data.toc.len() != data.tracks.len() {
        issues.add(
            format!("Log extracted {} tracks but the TOC lists {}", data.tracks.len(), data.toc.len()),
            Severity::Error,
            IssueTags::FAILURE,
        );
    }

    for track in &data.tracks {
        let n = track.number;
        match (track.test_crc, track.copy_crc) {
            (_, None) => {
                issues.add(format!("Track {} has no copy CRC", n), Severity::Error, IssueTags::MISSING_HASH);
            }
            (None, Some(_)) => {
                issues.add(
                    format!("Track {} was not test ripped", n),
                    Severity::Warning,
                    IssueTags::MISSING_HASH,
                );
            }
            (Some(test), Some(copy)) if test != copy => {
                issues.add(
                    format!("Track {} test CRC {:08X} differs from copy CRC {:08X}", n, test, copy),
                    Severity::Error,
                    IssueTags::FAILURE,
                );
            }
            _ => {}
        }
        if track.suspicious_positions > 0 {
            issues.add(
                format!("Track {} has {} suspicious positions", n, track.suspicious_positions),
                Severity::Error,
                IssueTags::FAILURE,
            );
        }
        if !track.copy_ok {
            issues.add(format!("Track {} copy is not OK", n), Severity::Error, IssueTags::FAILURE);
        }
        if track.ar_unverified {
            issues.add(
                format!("Track {} cannot be verified by AccurateRip", n),
                Severity::Advisory,
                IssueTags::PROVE_ERR,
            );
        }
    }

    if data.had_errors {
        issues.add("Log reports errors", Severity::Error, IssueTags::FAILURE);
    } else if !data.no_errors || !data.end_of_report {
        issues.add("Log has no complete status report", Severity::Warning, IssueTags::FAILURE);
    }
    if data.checksum.is_none() {
        issues.add("Log has no checksum", Severity::Advisory, IssueTags::PROVE_ERR);
    }
}
