//! RIFF WAVE parser

use super::{stream_len, FormatInstance, FormatPayload, ReadSeek};
use ripcheck_common::{IssueTags, Severity};
use std::path::Path;

/// Parse a WAV file; the RIFF size gives the valid size
pub fn parse(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    if header.len() < 12 || &header[..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return None;
    }
    let file_size = stream_len(source).ok()?;
    let mut instance = FormatInstance::new(path, "WAV", file_size, FormatPayload::Wav);

    let riff_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
    // Chunk data is padded to an even length
    let valid_size = 8 + riff_size + (riff_size & 1);
    if valid_size > file_size {
        instance.issues.add(
            format!(
                "{}: RIFF declares {} bytes but the file has {}",
                instance.name, valid_size, file_size
            ),
            Severity::Error,
            IssueTags::FAILURE,
        );
        return Some(instance);
    }
    instance.media_offset = 12;
    instance.media_count = valid_size - 12;
    instance.set_valid_size(valid_size, source);
    Some(instance)
}
