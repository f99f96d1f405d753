//! M3U playlist parser and writer

use super::{decode_text, extension_of, looks_like_text, read_capped, FormatInstance, FormatPayload, ReadSeek};
use ripcheck_common::{IssueTags, Severity};
use std::path::Path;

const MAX_PLAYLIST_SIZE: u64 = 1024 * 1024;
const EXTENDED_HEADER: &str = "#EXTM3U";
const AUDIO_EXTENSIONS: [&str; 5] = ["flac", "wav", "mp3", "ogg", "m4a"];

/// Playlist entries in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistData {
    pub extended: bool,
    pub entries: Vec<String>,
}

impl PlaylistData {
    /// Entry reduced to its file name, accepting either path separator
    pub fn entry_file_name(entry: &str) -> &str {
        entry.rsplit(['/', '\\']).next().unwrap_or(entry)
    }
}

/// Parse a playlist
///
/// Without a playlist extension the content must carry its own signature:
/// an `#EXTM3U` header or entries that all name audio files.
pub fn parse(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    if !looks_like_text(header) {
        return None;
    }
    let bytes = read_capped(source, MAX_PLAYLIST_SIZE)?;
    if bytes.contains(&0) && !matches!(bytes.as_slice(), [0xFF, 0xFE, ..]) {
        return None;
    }
    let data = parse_text(&decode_text(&bytes));

    let declared = matches!(extension_of(path).as_deref(), Some("m3u") | Some("m3u8"));
    let self_evident = data.extended
        || (!data.entries.is_empty()
            && data.entries.iter().all(|e| {
                extension_of(Path::new(PlaylistData::entry_file_name(e)))
                    .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
            }));
    if !declared && !self_evident {
        return None;
    }

    let mut instance = FormatInstance::new(path, "M3U", bytes.len() as u64, FormatPayload::Playlist(data.clone()))
        .with_buffer(bytes);
    if data.entries.is_empty() {
        instance.issues.add(
            format!("{}: playlist has no entries", instance.name),
            Severity::Warning,
            IssueTags::FAILURE,
        );
    }
    Some(instance)
}

pub(crate) fn parse_text(text: &str) -> PlaylistData {
    let mut data = PlaylistData::default();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if i == 0 && line.eq_ignore_ascii_case(EXTENDED_HEADER) {
            data.extended = true;
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        data.entries.push(line.to_string());
    }
    data
}

/// Render a plain playlist listing `entries` in order
pub fn render(entries: &[String]) -> String {
    let mut body = String::new();
    for entry in entries {
        body.push_str(entry);
        body.push('\n');
    }
    body
}
