//! Format instances and the parser contract
//!
//! A parser is a plain function that receives a seekable byte source, a short
//! header probe and the declared path. It returns `None` when the probe does not
//! match its signature; otherwise a [`FormatInstance`] whose issue vector already
//! holds any fatal structural finding. Format-specific fields live in the
//! [`FormatPayload`] variant so every instance shares one struct.
//!
//! Instances own their file handle while a repair may still need it; hashing
//! reads from the in-memory buffer when the parser kept one, else streams pages
//! from the handle (re-opening by path once the handle has been released).

pub mod digest;
pub mod eac_log;
pub mod flac;
pub mod images;
pub mod m3u;
pub mod mp3;
pub mod registry;
pub mod riff;
pub mod simple;

use ripcheck_common::config::DigestFormat;
use ripcheck_common::hashing::{
    to_hex, Hasher, Hashes, Md5Hasher, Sha1Hasher, Sha256Hasher, PAGE_SIZE,
};
use ripcheck_common::{IssueTags, IssueVector, RepairKind, Severity};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub use registry::{FormatDescriptor, FormatRegistry, FormatTotals};

/// Number of leading bytes handed to every parser as a signature probe
pub const HEADER_PROBE_LEN: usize = 44;

/// Largest trailing region inspected when classifying a watermark
const WATERMARK_SCAN_LIMIT: u64 = 4096;

/// Seekable byte source accepted by parsers
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Parser contract: `None` when the header does not match the signature
pub type ParseFn = fn(&mut dyn ReadSeek, &[u8], &Path) -> Option<FormatInstance>;

/// Classification of bytes beyond the valid region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Likeliness {
    #[default]
    None,
    /// Binary trailing data, possibly legitimate
    Possible,
    /// Mostly printable text, almost certainly junk appended by a tool
    Probable,
}

/// Classify trailing bytes by the share of printable ASCII they contain
pub fn classify_watermark(tail: &[u8]) -> Likeliness {
    if tail.is_empty() {
        return Likeliness::None;
    }
    let printable = tail
        .iter()
        .filter(|&&b| (0x20..0x7f).contains(&b) || matches!(b, b'\r' | b'\n' | b'\t'))
        .count();
    if printable * 4 >= tail.len() * 3 {
        Likeliness::Probable
    } else {
        Likeliness::Possible
    }
}

/// Digests computed so far for one instance
#[derive(Debug, Clone, Default)]
pub struct HashCache {
    pub file_md5: Option<Vec<u8>>,
    pub file_sha1: Option<Vec<u8>>,
    pub file_sha256: Option<Vec<u8>>,
    pub media_sha1: Option<Vec<u8>>,
    pub meta_sha1: Option<Vec<u8>>,
    pub pcm_crc32: Option<u32>,
    pub pcm_md5: Option<[u8; 16]>,
    /// Decoded sample frames, recorded with the PCM digests
    pub pcm_frames: Option<u64>,
    intrinsic_done: bool,
}

/// Format-specific data
#[derive(Debug, Clone)]
pub enum FormatPayload {
    Flac(flac::FlacData),
    Log(eac_log::LogData),
    Playlist(m3u::PlaylistData),
    Digest(digest::DigestData),
    Mp3(mp3::Mp3Data),
    Png,
    Jpeg,
    Wav,
    Ogg,
    ThumbsDb,
}

/// A parsed file
#[derive(Debug)]
pub struct FormatInstance {
    pub path: PathBuf,
    pub name: String,
    /// Display name of the format, e.g. `FLAC`
    pub format_name: &'static str,
    pub file_size: u64,
    pub valid_size: u64,
    pub media_offset: u64,
    pub media_count: u64,
    pub watermark: Likeliness,
    pub issues: IssueVector,
    pub hashes: HashCache,
    pub payload: FormatPayload,
    /// Canonical extension when content and extension disagree
    pub misnamed_as: Option<String>,
    buffer: Option<Vec<u8>>,
    source: Option<File>,
    writable: bool,
}

impl FormatInstance {
    /// Create an instance whose whole file is media and valid
    pub fn new(path: &Path, format_name: &'static str, file_size: u64, payload: FormatPayload) -> Self {
        Self {
            path: path.to_path_buf(),
            name: file_name_of(path),
            format_name,
            file_size,
            valid_size: file_size,
            media_offset: 0,
            media_count: file_size,
            watermark: Likeliness::None,
            issues: IssueVector::new(),
            hashes: HashCache::default(),
            payload,
            misnamed_as: None,
            buffer: None,
            source: None,
            writable: false,
        }
    }

    /// Keep the whole file in memory; hashing then reads from the buffer
    pub fn with_buffer(mut self, buffer: Vec<u8>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// Hand the open file to the instance
    pub fn attach_source(&mut self, file: File, writable: bool) {
        self.source = Some(file);
        self.writable = writable;
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Release the file handle
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            tracing::trace!(file = %self.path.display(), "Closed file handle");
        }
    }

    /// Set the end of the logically valid region and classify anything beyond it
    ///
    /// Trailing bytes get a repairable watermark issue.
    pub fn set_valid_size(&mut self, valid_size: u64, source: &mut dyn ReadSeek) {
        self.valid_size = valid_size.min(self.file_size);
        let excess = self.file_size - self.valid_size;
        if excess == 0 {
            self.watermark = Likeliness::None;
            return;
        }

        let scan = excess.min(WATERMARK_SCAN_LIMIT) as usize;
        let mut tail = vec![0u8; scan];
        let read_ok = source
            .seek(SeekFrom::Start(self.valid_size))
            .and_then(|_| source.read_exact(&mut tail))
            .is_ok();
        self.watermark = if read_ok {
            classify_watermark(&tail)
        } else {
            Likeliness::Possible
        };

        let qualifier = match self.watermark {
            Likeliness::Probable => "probable watermark",
            _ => "possible watermark",
        };
        self.issues.add_repairable(
            format!(
                "{} has {} bytes of trailing data after offset {} ({})",
                self.name, excess, self.valid_size, qualifier
            ),
            Severity::Warning,
            IssueTags::WATERMARK,
            format!("Trim {} trailing bytes from {}?", excess, self.name),
            RepairKind::TrimWatermark,
            false,
        );
    }

    /// Compute every requested digest not already cached
    pub fn calc_hashes(&mut self, hashes: Hashes) -> io::Result<()> {
        if hashes.contains(Hashes::FILE_MD5) && self.hashes.file_md5.is_none() {
            self.hashes.file_md5 = Some(self.hash_ranges(Box::new(Md5Hasher::new()), &[(0, self.file_size)])?);
        }
        if hashes.contains(Hashes::FILE_SHA256) && self.hashes.file_sha256.is_none() {
            self.hashes.file_sha256 =
                Some(self.hash_ranges(Box::new(Sha256Hasher::new()), &[(0, self.file_size)])?);
        }

        let needs_sha1 = hashes.contains(Hashes::FILE_SHA1)
            || (hashes.contains(Hashes::MEDIA_SHA1) && self.media_spans_file())
            || (hashes.contains(Hashes::META_SHA1) && self.media_count == 0);
        if needs_sha1 && self.hashes.file_sha1.is_none() {
            self.hashes.file_sha1 = Some(self.hash_ranges(Box::new(Sha1Hasher::new()), &[(0, self.file_size)])?);
        }

        if hashes.contains(Hashes::MEDIA_SHA1) && self.hashes.media_sha1.is_none() {
            self.hashes.media_sha1 = if self.media_spans_file() {
                self.hashes.file_sha1.clone()
            } else {
                Some(self.hash_ranges(
                    Box::new(Sha1Hasher::new()),
                    &[(self.media_offset, self.media_count)],
                )?)
            };
        }

        if hashes.contains(Hashes::META_SHA1) && self.hashes.meta_sha1.is_none() {
            self.hashes.meta_sha1 = if self.media_count == 0 {
                self.hashes.file_sha1.clone()
            } else {
                let media_end = self.media_offset + self.media_count;
                let ranges = [(0, self.media_offset), (media_end, self.file_size - media_end)];
                Some(self.hash_ranges(Box::new(Sha1Hasher::new()), &ranges)?)
            };
        }

        if hashes.intersects(Hashes::PCM_CRC32 | Hashes::PCM_MD5 | Hashes::INTRINSIC) {
            self.calc_format_hashes(hashes)?;
        }
        Ok(())
    }

    fn media_spans_file(&self) -> bool {
        self.media_offset == 0 && self.media_count == self.file_size
    }

    fn calc_format_hashes(&mut self, hashes: Hashes) -> io::Result<()> {
        if !matches!(self.payload, FormatPayload::Flac(_)) {
            self.hashes.intrinsic_done = true;
            return Ok(());
        }

        let wants_pcm = hashes.intersects(Hashes::PCM_CRC32 | Hashes::PCM_MD5 | Hashes::INTRINSIC);
        if wants_pcm && self.hashes.pcm_crc32.is_none() {
            let digests = crate::utils::pcm_decoder::digest_pcm(&self.path)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{:#}", e)))?;
            self.hashes.pcm_crc32 = Some(digests.crc32);
            self.hashes.pcm_md5 = Some(digests.md5);
            self.hashes.pcm_frames = Some(digests.frames);
        }

        if hashes.contains(Hashes::INTRINSIC) && !self.hashes.intrinsic_done {
            self.hashes.intrinsic_done = true;
            if let FormatPayload::Flac(data) = &self.payload {
                let findings = flac::verify_intrinsic(data, &self.hashes);
                for (message, severity, tags) in findings {
                    self.issues.add(format!("{}: {}", self.name, message), severity, tags);
                }
            }
        }
        Ok(())
    }

    fn hash_ranges(&mut self, mut hasher: Box<dyn Hasher>, ranges: &[(u64, u64)]) -> io::Result<Vec<u8>> {
        if let Some(buffer) = &self.buffer {
            for &(offset, count) in ranges {
                let start = offset as usize;
                let slice = buffer.get(start..start + count as usize).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "Hash range beyond buffered data")
                })?;
                hasher.append(slice);
            }
            return Ok(hasher.finish());
        }

        let mut reopened;
        let file: &mut File = match self.source.as_mut() {
            Some(file) => file,
            None => {
                reopened = File::open(&self.path)?;
                &mut reopened
            }
        };
        for &(offset, count) in ranges {
            ripcheck_common::hashing::append_range(hasher.as_mut(), file, offset, count)?;
        }
        Ok(hasher.finish())
    }

    /// Cached whole-file digest for a digest flavor
    pub fn file_hash(&self, format: DigestFormat) -> Option<&[u8]> {
        match format {
            DigestFormat::Md5 => self.hashes.file_md5.as_deref(),
            DigestFormat::Sha1 => self.hashes.file_sha1.as_deref(),
            DigestFormat::Sha256 => self.hashes.file_sha256.as_deref(),
        }
    }

    /// Whole-file digest as hex, computing it on demand
    pub fn file_hash_hex(&mut self, format: DigestFormat) -> io::Result<String> {
        self.calc_hashes(format.file_hash())?;
        self.file_hash(format)
            .map(to_hex)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Digest not computed"))
    }

    fn writable_handle(&mut self) -> io::Result<&mut File> {
        if self.source.is_none() || !self.writable {
            let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
            self.source = Some(file);
            self.writable = true;
        }
        self.source
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "File handle unavailable"))
    }

    /// Truncate the file to its valid size
    pub fn trim_to_valid_size(&mut self) -> io::Result<()> {
        let valid_size = self.valid_size;
        self.writable_handle()?.set_len(valid_size)?;
        tracing::info!(file = %self.path.display(), valid_size, "Trimmed trailing data");
        self.file_size = valid_size;
        self.media_count = self.media_count.min(valid_size.saturating_sub(self.media_offset));
        self.watermark = Likeliness::None;
        self.hashes = HashCache::default();
        self.buffer = None;
        Ok(())
    }

    /// Rename within the same directory, releasing the handle first
    ///
    /// Cached digests survive a rename since content is unchanged.
    pub fn rename_to(&mut self, new_path: &Path) -> io::Result<()> {
        self.close();
        crate::services::naming::rename_path(&self.path, new_path)?;
        tracing::info!(from = %self.path.display(), to = %new_path.display(), "Renamed file");
        self.path = new_path.to_path_buf();
        self.name = file_name_of(new_path);
        Ok(())
    }

    /// Replace the extension so it matches the content
    pub fn rename_extension(&mut self, extension: &str) -> io::Result<()> {
        let new_path = self.path.with_extension(extension);
        if new_path.exists() && !same_ignoring_case(&new_path, &self.path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", new_path.display()),
            ));
        }
        self.rename_to(&new_path)?;
        self.misnamed_as = None;
        Ok(())
    }

    /// Drop `length` leading bytes by rewriting the file through a sibling temp file
    pub fn remove_leading(&mut self, length: u64) -> io::Result<()> {
        if length >= self.file_size {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "Removal would empty the file"));
        }
        self.close();

        let temp_path = self.path.with_extension("ripcheck-tmp");
        {
            let mut input = File::open(&self.path)?;
            input.seek(SeekFrom::Start(length))?;
            let mut output = File::create(&temp_path)?;
            let mut page = vec![0u8; PAGE_SIZE];
            loop {
                let n = input.read(&mut page)?;
                if n == 0 {
                    break;
                }
                output.write_all(&page[..n])?;
            }
            output.sync_all()?;
        }
        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        tracing::info!(file = %self.path.display(), removed = length, "Removed leading bytes");
        self.file_size -= length;
        self.valid_size = self.valid_size.saturating_sub(length);
        self.media_offset = self.media_offset.saturating_sub(length);
        self.hashes = HashCache::default();
        self.buffer = None;
        Ok(())
    }

    /// Overwrite bytes in place
    pub fn patch_bytes(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let file = self.writable_handle()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        file.flush()?;
        self.hashes = HashCache::default();
        self.buffer = None;
        Ok(())
    }

    /// Overwrite the whole file; cached digests are dropped
    pub fn replace_contents(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.close();
        std::fs::write(&self.path, bytes)?;
        let size = bytes.len() as u64;
        self.file_size = size;
        self.valid_size = size;
        self.media_offset = 0;
        self.media_count = size;
        self.watermark = Likeliness::None;
        self.hashes = HashCache::default();
        if self.buffer.is_some() {
            self.buffer = Some(bytes.to_vec());
        }
        Ok(())
    }

    /// File extension, lowercase, without the dot
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }
}

/// Lowercase extension of a path
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn same_ignoring_case(a: &Path, b: &Path) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

/// Length of a seekable source; leaves the position at the start
pub(crate) fn stream_len(source: &mut dyn ReadSeek) -> io::Result<u64> {
    let len = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;
    Ok(len)
}

/// Read the whole source when it is no larger than `limit`
pub(crate) fn read_capped(source: &mut dyn ReadSeek, limit: u64) -> Option<Vec<u8>> {
    let len = stream_len(source).ok()?;
    if len > limit {
        return None;
    }
    let mut data = Vec::with_capacity(len as usize);
    source.read_to_end(&mut data).ok()?;
    Some(data)
}

/// Decode text with an optional UTF-16 or UTF-8 byte order mark
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    let utf16 = |body: &[u8], big_endian: bool| -> String {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|c| if big_endian { u16::from_be_bytes([c[0], c[1]]) } else { u16::from_le_bytes([c[0], c[1]]) })
            .collect();
        String::from_utf16_lossy(&units)
    };
    match bytes {
        [0xFF, 0xFE, rest @ ..] => utf16(rest, false),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, true),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).to_string(),
        _ => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// True when a probe looks like text rather than binary data
pub(crate) fn looks_like_text(header: &[u8]) -> bool {
    matches!(header, [0xFF, 0xFE, ..] | [0xFE, 0xFF, ..]) || !header.contains(&0)
}

/// Read exactly `count` bytes at `offset`
pub(crate) fn read_at(source: &mut dyn ReadSeek, offset: u64, count: usize) -> io::Result<Vec<u8>> {
    source.seek(SeekFrom::Start(offset))?;
    let mut data = vec![0u8; count];
    source.read_exact(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_text_boms() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFabc"), "abc");
        assert_eq!(decode_text(&[0xFF, 0xFE, b'h', 0, b'i', 0]), "hi");
        assert_eq!(decode_text(&[0xFE, 0xFF, 0, b'h', 0, b'i']), "hi");
        assert!(looks_like_text(&[0xFF, 0xFE, b'E', 0]));
        assert!(!looks_like_text(&[0x89, b'P', b'N', b'G', 0, 0]));
    }

    #[test]
    fn test_classify_watermark() {
        assert_eq!(classify_watermark(b""), Likeliness::None);
        assert_eq!(classify_watermark(b"Ripped by SomeTool v1.2\r\n"), Likeliness::Probable);
        assert_eq!(classify_watermark(&[0u8, 1, 2, 3, 200, 201, b'a']), Likeliness::Possible);
    }

    #[test]
    fn test_set_valid_size_flags_trailing_text() {
        let mut data = vec![0u8; 100];
        data.extend_from_slice(b"www.example.com");
        let len = data.len() as u64;
        let mut source = Cursor::new(data);

        let mut instance = FormatInstance::new(Path::new("x.png"), "PNG", len, FormatPayload::Png);
        instance.set_valid_size(100, &mut source);

        assert_eq!(instance.valid_size, 100);
        assert_eq!(instance.watermark, Likeliness::Probable);
        assert_eq!(instance.issues.repairable_count(), 1);
        assert!(instance.issues.has_tag(IssueTags::WATERMARK));
    }

    #[test]
    fn test_buffered_hashes_and_aliases() {
        let data = b"hello world".to_vec();
        let mut instance = FormatInstance::new(Path::new("a.m3u"), "M3U", data.len() as u64, FormatPayload::Ogg)
            .with_buffer(data);

        instance
            .calc_hashes(Hashes::FILE_MD5 | Hashes::MEDIA_SHA1 | Hashes::META_SHA1)
            .unwrap();

        assert_eq!(
            to_hex(instance.hashes.file_md5.as_ref().unwrap()),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        // Media spans the whole file, so media SHA-1 is the file SHA-1
        assert_eq!(instance.hashes.media_sha1, instance.hashes.file_sha1);
        assert!(instance.hashes.meta_sha1.is_some());
        assert_ne!(instance.hashes.meta_sha1, instance.hashes.file_sha1);
    }

    #[test]
    fn test_empty_media_region_aliases_meta() {
        let data = b"metadata only".to_vec();
        let mut instance = FormatInstance::new(Path::new("a.db"), "DB", data.len() as u64, FormatPayload::ThumbsDb)
            .with_buffer(data);
        instance.media_count = 0;
        instance.calc_hashes(Hashes::META_SHA1).unwrap();
        assert_eq!(instance.hashes.meta_sha1, instance.hashes.file_sha1);
    }

    #[test]
    fn test_streamed_short_read_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        std::fs::write(&path, vec![1u8; 10]).unwrap();

        let mut instance = FormatInstance::new(&path, "WAV", 1000, FormatPayload::Wav);
        let err = instance.calc_hashes(Hashes::FILE_MD5).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
