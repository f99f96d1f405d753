//! Signature-only parsers

use super::{stream_len, FormatInstance, FormatPayload, ReadSeek};
use std::path::Path;

const OGG_MAGIC: &[u8; 4] = b"OggS";
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub fn parse_ogg(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    if !header.starts_with(OGG_MAGIC) {
        return None;
    }
    let file_size = stream_len(source).ok()?;
    Some(FormatInstance::new(path, "OGG", file_size, FormatPayload::Ogg))
}

/// Windows thumbnail cache, an OLE compound document
pub fn parse_thumbs_db(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    if !header.starts_with(&OLE_MAGIC) {
        return None;
    }
    let file_size = stream_len(source).ok()?;
    let mut instance = FormatInstance::new(path, "DB", file_size, FormatPayload::ThumbsDb);
    instance.media_count = 0;
    Some(instance)
}

/// Parser for shadow descriptors; never accepts anything
pub fn parse_nothing(_source: &mut dyn ReadSeek, _header: &[u8], _path: &Path) -> Option<FormatInstance> {
    None
}
