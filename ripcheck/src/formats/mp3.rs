//! MP3 parser
//!
//! Only the tag framing is inspected: the ID3v2 header at the front and the
//! ID3v1 block at the end. Two tag defects are common enough to repair:
//! a phantom ID3v2 tag with no frames, and a tag size one byte short of
//! where the audio actually starts.

use super::{read_at, stream_len, FormatInstance, FormatPayload, ReadSeek};
use ripcheck_common::{IssueTags, RepairKind, Severity};
use std::path::Path;

const ID3V2_HEADER_LEN: u64 = 10;
const ID3V1_LEN: u64 = 128;
/// Byte offset of the syncsafe size field in an ID3v2 header
pub const ID3V2_SIZE_OFFSET: u64 = 6;

/// MP3-specific fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mp3Data {
    pub id3v2_version: Option<(u8, u8)>,
    /// Total ID3v2 length including header and footer
    pub id3v2_len: u64,
    pub has_id3v1: bool,
}

fn decode_syncsafe(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 4 || bytes.iter().take(4).any(|b| b & 0x80 != 0) {
        return None;
    }
    Some(((bytes[0] as u32) << 21) | ((bytes[1] as u32) << 14) | ((bytes[2] as u32) << 7) | bytes[3] as u32)
}

/// Syncsafe encoding of a 28-bit size
pub fn encode_syncsafe(size: u32) -> [u8; 4] {
    [
        ((size >> 21) & 0x7f) as u8,
        ((size >> 14) & 0x7f) as u8,
        ((size >> 7) & 0x7f) as u8,
        (size & 0x7f) as u8,
    ]
}

fn is_frame_sync(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0 && (bytes[1] >> 1) & 0x03 != 0
}

/// Parse an MP3 file
pub fn parse(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    let has_id3v2 = header.starts_with(b"ID3");
    if !has_id3v2 && !is_frame_sync(header) {
        return None;
    }
    let file_size = stream_len(source).ok()?;
    let mut data = Mp3Data::default();
    let mut instance = FormatInstance::new(path, "MP3", file_size, FormatPayload::Mp3(Mp3Data::default()));
    let name = instance.name.clone();

    if has_id3v2 {
        let Some(size) = header.get(6..10).and_then(decode_syncsafe) else {
            instance.issues.add(
                format!("{}: ID3v2 header has an invalid size", name),
                Severity::Fatal,
                IssueTags::BAD_TAG | IssueTags::HAS_ID3,
            );
            instance.payload = FormatPayload::Mp3(data);
            return Some(instance);
        };
        let flags = header.get(5).copied().unwrap_or(0);
        let footer = if flags & 0x10 != 0 { ID3V2_HEADER_LEN } else { 0 };
        data.id3v2_version = Some((header[3], header[4]));
        data.id3v2_len = ID3V2_HEADER_LEN + size as u64 + footer;

        if data.id3v2_len >= file_size {
            instance.issues.add(
                format!("{}: ID3v2 tag extends past end of file", name),
                Severity::Fatal,
                IssueTags::BAD_TAG | IssueTags::HAS_ID3,
            );
            instance.payload = FormatPayload::Mp3(data);
            return Some(instance);
        }

        let tag_end = data.id3v2_len;
        let first_frame = read_at(source, ID3V2_HEADER_LEN, 1).ok();
        let phantom = size == 0 || first_frame.is_some_and(|b| b[0] == 0);
        let after_tag = read_at(source, tag_end, 3).unwrap_or_default();

        if phantom && is_frame_sync(&after_tag) {
            instance.issues.add_repairable(
                format!("{}: ID3v2 tag of {} bytes holds no frames", name, tag_end),
                Severity::Warning,
                IssueTags::BAD_TAG | IssueTags::HAS_ID3,
                format!("Remove the empty {} byte tag from {}?", tag_end, name),
                RepairKind::RemovePhantomTag { length: tag_end },
                false,
            );
        } else if !is_frame_sync(&after_tag) {
            if after_tag.first() == Some(&0) && is_frame_sync(&after_tag[1..]) {
                instance.issues.add_repairable(
                    format!("{}: ID3v2 size is one byte short of the audio", name),
                    Severity::Warning,
                    IssueTags::BAD_TAG | IssueTags::HAS_ID3,
                    format!("Correct the ID3v2 size in {}?", name),
                    RepairKind::PatchTagSizeOffByOne { correct_size: size + 1 },
                    false,
                );
            } else {
                instance.issues.add(
                    format!("{}: no MPEG audio follows the ID3v2 tag", name),
                    Severity::Error,
                    IssueTags::FAILURE,
                );
            }
        }
    }

    let mut valid_size = file_size;
    if file_size >= data.id3v2_len + ID3V1_LEN {
        if let Ok(tag) = read_at(source, file_size - ID3V1_LEN, 3) {
            if tag == b"TAG" {
                data.has_id3v1 = true;
                valid_size -= ID3V1_LEN;
            }
        }
    }
    instance.media_offset = data.id3v2_len;
    instance.media_count = valid_size - data.id3v2_len;

    instance.payload = FormatPayload::Mp3(data);
    Some(instance)
}
