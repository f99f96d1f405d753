//! FLAC container parser
//!
//! Walks the metadata block chain, decodes STREAMINFO and the Vorbis comment
//! block, then checks that audio frames begin where metadata ends. PCM digests
//! are computed on demand by [`super::FormatInstance::calc_hashes`].

use super::{read_at, stream_len, FormatInstance, FormatPayload, HashCache, ReadSeek};
use ripcheck_common::{IssueTags, Severity};
use std::path::Path;

const MAGIC: &[u8; 4] = b"fLaC";
const BLOCK_STREAMINFO: u8 = 0;
const BLOCK_VORBIS_COMMENT: u8 = 4;
const STREAMINFO_LEN: u32 = 34;
/// Samples per CD sector per channel
const CD_SECTOR_FRAMES: u64 = 588;
const ID3V1_LEN: u64 = 128;

/// Decoded STREAMINFO block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub total_samples: u64,
    pub md5: [u8; 16],
}

impl StreamInfo {
    pub fn parse(data: &[u8]) -> Option<StreamInfo> {
        if data.len() < STREAMINFO_LEN as usize {
            return None;
        }
        let sample_rate = ((data[10] as u32) << 12) | ((data[11] as u32) << 4) | ((data[12] as u32) >> 4);
        let channels = ((data[12] >> 1) & 0x07) + 1;
        let bits_per_sample = (((data[12] & 0x01) << 4) | (data[13] >> 4)) + 1;
        let total_samples = ((data[13] as u64 & 0x0f) << 32)
            | ((data[14] as u64) << 24)
            | ((data[15] as u64) << 16)
            | ((data[16] as u64) << 8)
            | data[17] as u64;
        let mut md5 = [0u8; 16];
        md5.copy_from_slice(&data[18..34]);

        Some(StreamInfo {
            min_block_size: u16::from_be_bytes([data[0], data[1]]),
            max_block_size: u16::from_be_bytes([data[2], data[3]]),
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
            md5,
        })
    }

    pub fn is_cd_audio(&self) -> bool {
        self.sample_rate == 44100 && self.channels == 2 && self.bits_per_sample == 16
    }

    pub fn has_md5(&self) -> bool {
        self.md5.iter().any(|&b| b != 0)
    }
}

/// Vorbis comment fields in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisTags {
    pub vendor: String,
    pub entries: Vec<(String, String)>,
}

impl VorbisTags {
    pub fn parse(data: &[u8]) -> Option<VorbisTags> {
        let mut pos = 0usize;
        let take_u32 = |pos: &mut usize| -> Option<u32> {
            let bytes = data.get(*pos..*pos + 4)?;
            *pos += 4;
            Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        };

        let vendor_len = take_u32(&mut pos)? as usize;
        let vendor = String::from_utf8_lossy(data.get(pos..pos + vendor_len)?).to_string();
        pos += vendor_len;

        let count = take_u32(&mut pos)?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let len = take_u32(&mut pos)? as usize;
            let field = String::from_utf8_lossy(data.get(pos..pos + len)?).to_string();
            pos += len;
            let (key, value) = field.split_once('=')?;
            entries.push((key.to_ascii_uppercase(), value.to_string()));
        }
        Some(VorbisTags { vendor, entries })
    }

    /// First value for a field, case-insensitive
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Leading number of a `TRACKNUMBER` value such as `3` or `3/12`
    pub fn track_number(&self) -> Option<u32> {
        let value = self.get("TRACKNUMBER")?;
        value.split('/').next()?.trim().parse().ok()
    }
}

/// FLAC-specific fields
#[derive(Debug, Clone, Default)]
pub struct FlacData {
    pub stream_info: Option<StreamInfo>,
    /// (block type, length) in file order
    pub blocks: Vec<(u8, u32)>,
    pub tags: VorbisTags,
    pub has_id3v1: bool,
}

/// Parse a FLAC file
pub fn parse(source: &mut dyn ReadSeek, header: &[u8], path: &Path) -> Option<FormatInstance> {
    if header.len() < 4 || &header[..4] != MAGIC {
        return None;
    }
    let file_size = stream_len(source).ok()?;
    let mut data = FlacData::default();
    let mut instance = FormatInstance::new(path, "FLAC", file_size, FormatPayload::Flac(FlacData::default()));
    let name = instance.name.clone();

    let mut offset: u64 = 4;
    loop {
        let Ok(block_header) = read_at(source, offset, 4) else {
            instance.issues.add(
                format!("{}: metadata truncated at offset {}", name, offset),
                Severity::Fatal,
                IssueTags::FAILURE,
            );
            instance.payload = FormatPayload::Flac(data);
            return Some(instance);
        };
        let is_last = block_header[0] & 0x80 != 0;
        let block_type = block_header[0] & 0x7f;
        let length = u32::from_be_bytes([0, block_header[1], block_header[2], block_header[3]]);
        let body_offset = offset + 4;

        if body_offset + length as u64 > file_size {
            instance.issues.add(
                format!("{}: metadata block {} extends past end of file", name, block_type),
                Severity::Fatal,
                IssueTags::FAILURE,
            );
            instance.payload = FormatPayload::Flac(data);
            return Some(instance);
        }

        if data.blocks.is_empty() && block_type != BLOCK_STREAMINFO {
            instance.issues.add(
                format!("{}: first metadata block is not STREAMINFO", name),
                Severity::Fatal,
                IssueTags::FAILURE,
            );
            instance.payload = FormatPayload::Flac(data);
            return Some(instance);
        }

        match block_type {
            BLOCK_STREAMINFO => {
                data.stream_info = read_at(source, body_offset, length as usize)
                    .ok()
                    .and_then(|bytes| StreamInfo::parse(&bytes));
                if data.stream_info.is_none() {
                    instance.issues.add(
                        format!("{}: unreadable STREAMINFO", name),
                        Severity::Fatal,
                        IssueTags::FAILURE,
                    );
                }
            }
            BLOCK_VORBIS_COMMENT => match read_at(source, body_offset, length as usize)
                .ok()
                .and_then(|bytes| VorbisTags::parse(&bytes))
            {
                Some(tags) => data.tags = tags,
                None => {
                    instance.issues.add(
                        format!("{}: malformed Vorbis comment block", name),
                        Severity::Error,
                        IssueTags::BAD_TAG,
                    );
                }
            },
            _ => {}
        }

        data.blocks.push((block_type, length));
        offset = body_offset + length as u64;
        if is_last {
            break;
        }
    }

    if instance.issues.has_fatal() {
        instance.payload = FormatPayload::Flac(data);
        return Some(instance);
    }

    instance.media_offset = offset;
    match read_at(source, offset, 2) {
        Ok(sync) if sync[0] == 0xFF && (sync[1] & 0xFE) == 0xF8 => {}
        _ => {
            instance.issues.add(
                format!("{}: no audio frame at offset {}", name, offset),
                Severity::Fatal,
                IssueTags::FAILURE,
            );
        }
    }

    let mut valid_size = file_size;
    if file_size >= offset + ID3V1_LEN {
        if let Ok(tag) = read_at(source, file_size - ID3V1_LEN, 3) {
            if tag == b"TAG" {
                data.has_id3v1 = true;
                valid_size = file_size - ID3V1_LEN;
                instance.issues.add(
                    format!("{}: has an ID3v1 tag", name),
                    Severity::Warning,
                    IssueTags::HAS_ID3 | IssueTags::BAD_TAG,
                );
            }
        }
    }
    instance.media_count = valid_size - offset;
    if valid_size < file_size {
        instance.set_valid_size(valid_size, source);
    }

    if let Some(info) = &data.stream_info {
        if !info.is_cd_audio() {
            instance.issues.add(
                format!(
                    "{}: {} Hz, {}-bit, {} channel audio is not CD audio",
                    name, info.sample_rate, info.bits_per_sample, info.channels
                ),
                Severity::Warning,
                IssueTags::STRICT_ERR,
            );
        } else if info.total_samples % CD_SECTOR_FRAMES != 0 {
            instance.issues.add(
                format!("{}: {} samples is not a whole number of CD sectors", name, info.total_samples),
                Severity::Advisory,
                IssueTags::STRICT_ERR,
            );
        }
    }

    tracing::trace!(
        file = %path.display(),
        blocks = data.blocks.len(),
        tags = data.tags.entries.len(),
        "Parsed FLAC metadata"
    );

    instance.payload = FormatPayload::Flac(data);
    Some(instance)
}

/// Compare decoded PCM against what STREAMINFO promises
pub(crate) fn verify_intrinsic(data: &FlacData, hashes: &HashCache) -> Vec<(String, Severity, IssueTags)> {
    let mut findings = Vec::new();
    let Some(info) = &data.stream_info else {
        return findings;
    };

    if !info.has_md5() {
        findings.push((
            "STREAMINFO has no audio MD5".to_string(),
            Severity::Warning,
            IssueTags::MISSING_HASH,
        ));
    } else if let Some(pcm_md5) = &hashes.pcm_md5 {
        if pcm_md5 != &info.md5 {
            findings.push((
                "decoded audio does not match STREAMINFO MD5".to_string(),
                Severity::Fatal,
                IssueTags::FAILURE,
            ));
        }
    }

    if let Some(frames) = hashes.pcm_frames {
        if info.total_samples != 0 && frames != info.total_samples {
            findings.push((
                format!("decoded {} samples, STREAMINFO declares {}", frames, info.total_samples),
                Severity::Error,
                IssueTags::FAILURE,
            ));
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn streaminfo_block(total_samples: u64, md5: [u8; 16]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&4096u16.to_be_bytes());
        b.extend_from_slice(&4096u16.to_be_bytes());
        b.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        // 44100 Hz, 2 channels, 16 bits
        let packed: u64 = (44100u64 << 44) | (1u64 << 41) | (15u64 << 36) | total_samples;
        b.extend_from_slice(&packed.to_be_bytes());
        b.extend_from_slice(&md5);
        b
    }

    fn vorbis_block(fields: &[&str]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&4u32.to_le_bytes());
        b.extend_from_slice(b"test");
        b.extend_from_slice(&(fields.len() as u32).to_le_bytes());
        for field in fields {
            b.extend_from_slice(&(field.len() as u32).to_le_bytes());
            b.extend_from_slice(field.as_bytes());
        }
        b
    }

    fn flac_bytes(fields: &[&str], trailer: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        let info = streaminfo_block(1176, [7u8; 16]);
        out.push(BLOCK_STREAMINFO);
        out.extend_from_slice(&(info.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&info);
        let comments = vorbis_block(fields);
        out.push(0x80 | BLOCK_VORBIS_COMMENT);
        out.extend_from_slice(&(comments.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&comments);
        out.extend_from_slice(&[0xFF, 0xF8, 0x79, 0x18, 0x00]);
        out.extend_from_slice(trailer);
        out
    }

    fn parse_bytes(bytes: Vec<u8>) -> Option<FormatInstance> {
        let header = bytes[..bytes.len().min(44)].to_vec();
        parse(&mut Cursor::new(bytes), &header, Path::new("01 - Intro.flac"))
    }

    #[test]
    fn test_rejects_other_signatures() {
        assert!(parse_bytes(b"ID3\x03\x00\x00\x00\x00\x00\x00".to_vec()).is_none());
    }

    #[test]
    fn test_parses_streaminfo_and_tags() {
        let instance = parse_bytes(flac_bytes(&["TITLE=Intro", "tracknumber=1/9"], &[])).unwrap();
        assert!(instance.issues.is_empty(), "{:?}", instance.issues.report(Severity::Noise));

        let FormatPayload::Flac(data) = &instance.payload else {
            panic!("expected FLAC payload");
        };
        let info = data.stream_info.as_ref().unwrap();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.total_samples, 1176);
        assert_eq!(data.tags.get("title"), Some("Intro"));
        assert_eq!(data.tags.track_number(), Some(1));
        assert_eq!(instance.media_offset, instance.file_size - 5);
    }

    #[test]
    fn test_truncated_block_is_fatal() {
        let mut bytes = flac_bytes(&["TITLE=Intro"], &[]);
        bytes.truncate(30);
        let instance = parse_bytes(bytes).unwrap();
        assert!(instance.issues.has_fatal());
    }

    #[test]
    fn test_id3v1_trailer_is_flagged() {
        let mut trailer = b"TAG".to_vec();
        trailer.resize(128, b' ');
        let instance = parse_bytes(flac_bytes(&[], &trailer)).unwrap();

        assert!(instance.issues.has_tag(IssueTags::HAS_ID3));
        assert_eq!(instance.valid_size, instance.file_size - 128);
        assert_eq!(instance.issues.repairable_count(), 1);
    }

    #[test]
    fn test_intrinsic_md5_mismatch_is_fatal() {
        let data = FlacData {
            stream_info: StreamInfo::parse(&streaminfo_block(1176, [7u8; 16])),
            ..Default::default()
        };
        let hashes = HashCache {
            pcm_md5: Some([8u8; 16]),
            pcm_frames: Some(1176),
            ..Default::default()
        };
        let findings = verify_intrinsic(&data, &hashes);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].1, Severity::Fatal);
    }
}
