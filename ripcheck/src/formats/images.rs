//! PNG and JPEG parsers
//!
//! Both only locate the logical end of the image so trailing junk can be
//! reported as a watermark.

use super::{read_at, stream_len, FormatInstance, FormatPayload, ReadSeek};
use ripcheck_common::{IssueTags, Severity};
use std::path::Path;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
/// Tail searched backwards for the JPEG end-of-image marker
const JPEG_EOI_SEARCH: u64 = 64 * 1024;

/// Parse a PNG by walking chunks up to `IEND`
pub fn parse_png(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    if !header.starts_with(&PNG_MAGIC) {
        return None;
    }
    let file_size = stream_len(source).ok()?;
    let mut instance = FormatInstance::new(path, "PNG", file_size, FormatPayload::Png);

    let mut offset = PNG_MAGIC.len() as u64;
    loop {
        let Ok(chunk_header) = read_at(source, offset, 8) else {
            instance.issues.add(
                format!("{}: PNG truncated before IEND", instance.name),
                Severity::Error,
                IssueTags::FAILURE,
            );
            return Some(instance);
        };
        let length = u32::from_be_bytes([chunk_header[0], chunk_header[1], chunk_header[2], chunk_header[3]]) as u64;
        // length, type, data, crc
        let chunk_end = offset + 8 + length + 4;
        if chunk_end > file_size {
            instance.issues.add(
                format!("{}: PNG chunk at offset {} extends past end of file", instance.name, offset),
                Severity::Error,
                IssueTags::FAILURE,
            );
            return Some(instance);
        }
        offset = chunk_end;
        if &chunk_header[4..8] == b"IEND" {
            break;
        }
    }

    instance.set_valid_size(offset, source);
    Some(instance)
}

/// Parse a JPEG by locating the last end-of-image marker
pub fn parse_jpeg(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    if !header.starts_with(&JPEG_MAGIC) {
        return None;
    }
    let file_size = stream_len(source).ok()?;
    let mut instance = FormatInstance::new(path, "JPEG", file_size, FormatPayload::Jpeg);

    let window = file_size.min(JPEG_EOI_SEARCH);
    let start = file_size - window;
    let Ok(tail) = read_at(source, start, window as usize) else {
        instance.issues.add(
            format!("{}: unreadable JPEG", instance.name),
            Severity::Fatal,
            IssueTags::FAILURE,
        );
        return Some(instance);
    };

    match tail.windows(2).rposition(|w| w == [0xFF, 0xD9]) {
        Some(pos) => instance.set_valid_size(start + pos as u64 + 2, source),
        None => {
            instance.issues.add(
                format!("{}: JPEG has no end-of-image marker", instance.name),
                Severity::Error,
                IssueTags::FAILURE,
            );
        }
    }
    Some(instance)
}
