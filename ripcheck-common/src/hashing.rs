//! Incremental digest accumulators
//!
//! Every digest family implements [`Hasher`]: feed bytes with `append`, read the
//! digest with `finish`, which also resets the state for reuse. Callers choose
//! which digests a file needs with the [`Hashes`] flag set.
//!
//! Range helpers read from any seekable source in fixed pages so large audio
//! files never have to be resident in memory.

use sha1::Digest as _;
use std::io::{self, Read, Seek, SeekFrom};

/// Page size for streamed hashing
pub const PAGE_SIZE: usize = 64 * 1024;

bitflags::bitflags! {
    /// Digests a caller wants computed for a file
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Hashes: u32 {
        /// Format-specific self checks (stored checksums, self-check lines)
        const INTRINSIC = 1;
        const FILE_MD5 = 1 << 1;
        const FILE_SHA1 = 1 << 2;
        const FILE_SHA256 = 1 << 3;
        /// SHA-1 over everything outside the media region
        const META_SHA1 = 1 << 4;
        /// SHA-1 over the media region only
        const MEDIA_SHA1 = 1 << 5;
        /// CRC-32 over decoded PCM (extraction log "Copy CRC")
        const PCM_CRC32 = 1 << 6;
        /// MD5 over decoded PCM
        const PCM_MD5 = 1 << 7;
        /// Submit to the external verification service
        const WEB_CHECK = 1 << 8;
    }
}

/// Stateful digest accumulator
pub trait Hasher {
    /// Feed bytes into the digest
    fn append(&mut self, data: &[u8]);

    /// Return the digest and reset internal state
    fn finish(&mut self) -> Vec<u8>;

    /// Digest length in bytes
    fn hash_len(&self) -> usize;
}

/// MD5 over content
pub struct Md5Hasher {
    ctx: md5::Context,
}

impl Md5Hasher {
    pub fn new() -> Self {
        Self { ctx: md5::Context::new() }
    }
}

impl Default for Md5Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Md5Hasher {
    fn append(&mut self, data: &[u8]) {
        self.ctx.consume(data);
    }

    fn finish(&mut self) -> Vec<u8> {
        let ctx = std::mem::replace(&mut self.ctx, md5::Context::new());
        ctx.compute().0.to_vec()
    }

    fn hash_len(&self) -> usize {
        16
    }
}

/// SHA-1 over content
#[derive(Default)]
pub struct Sha1Hasher {
    inner: sha1::Sha1,
}

impl Sha1Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hasher for Sha1Hasher {
    fn append(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn finish(&mut self) -> Vec<u8> {
        self.inner.finalize_reset().to_vec()
    }

    fn hash_len(&self) -> usize {
        20
    }
}

/// SHA-256 over content
#[derive(Default)]
pub struct Sha256Hasher {
    inner: sha2::Sha256,
}

impl Sha256Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hasher for Sha256Hasher {
    fn append(&mut self, data: &[u8]) {
        sha2::Digest::update(&mut self.inner, data);
    }

    fn finish(&mut self) -> Vec<u8> {
        sha2::Digest::finalize_reset(&mut self.inner).to_vec()
    }

    fn hash_len(&self) -> usize {
        32
    }
}

/// CRC-32 (IEEE), big-endian digest bytes
#[derive(Default)]
pub struct Crc32Hasher {
    inner: crc32fast::Hasher,
}

impl Crc32Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish as an integer
    pub fn finish_u32(&mut self) -> u32 {
        std::mem::take(&mut self.inner).finalize()
    }
}

impl Hasher for Crc32Hasher {
    fn append(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn finish(&mut self) -> Vec<u8> {
        self.finish_u32().to_be_bytes().to_vec()
    }

    fn hash_len(&self) -> usize {
        4
    }
}

/// CRC-16 as used by FLAC frame footers (polynomial 0x8005, initial 0)
#[derive(Default)]
pub struct Crc16Hasher {
    crc: u16,
}

const CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

impl Crc16Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish_u16(&mut self) -> u16 {
        std::mem::take(&mut self.crc)
    }
}

impl Hasher for Crc16Hasher {
    fn append(&mut self, data: &[u8]) {
        for &byte in data {
            self.crc = (self.crc << 8) ^ CRC16_TABLE[((self.crc >> 8) as u8 ^ byte) as usize];
        }
    }

    fn finish(&mut self) -> Vec<u8> {
        self.finish_u16().to_be_bytes().to_vec()
    }

    fn hash_len(&self) -> usize {
        2
    }
}

/// Feed `count` bytes starting at `offset` of `source` into `hasher`
///
/// Reads in [`PAGE_SIZE`] pages. A source shorter than the requested range
/// fails with `UnexpectedEof`.
pub fn append_range<R>(hasher: &mut dyn Hasher, source: &mut R, offset: u64, count: u64) -> io::Result<()>
where
    R: Read + Seek + ?Sized,
{
    source.seek(SeekFrom::Start(offset))?;
    let mut page = vec![0u8; PAGE_SIZE];
    let mut remaining = count;
    while remaining > 0 {
        let want = remaining.min(PAGE_SIZE as u64) as usize;
        source.read_exact(&mut page[..want]).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Short read at offset {}: {}", offset + (count - remaining), e),
            )
        })?;
        hasher.append(&page[..want]);
        remaining -= want as u64;
    }
    Ok(())
}

/// Hash a byte range with a fresh hasher and return the digest
pub fn digest_range<R>(mut hasher: Box<dyn Hasher>, source: &mut R, offset: u64, count: u64) -> io::Result<Vec<u8>>
where
    R: Read + Seek + ?Sized,
{
    append_range(hasher.as_mut(), source, offset, count)?;
    Ok(hasher.finish())
}

/// Lowercase hex encoding
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decode lowercase or uppercase hex; `None` on odd length or bad digit
pub fn from_hex(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_md5_known_vector() {
        let mut hasher = Md5Hasher::new();
        hasher.append(b"abc");
        assert_eq!(to_hex(&hasher.finish()), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_finish_resets_state() {
        let mut hasher = Sha1Hasher::new();
        hasher.append(b"abc");
        let first = hasher.finish();
        hasher.append(b"abc");
        assert_eq!(first, hasher.finish());
        assert_eq!(to_hex(&first), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_sha256_known_vector() {
        let mut hasher = Sha256Hasher::new();
        hasher.append(b"abc");
        assert_eq!(
            to_hex(&hasher.finish()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_crc32_check_value() {
        let mut hasher = Crc32Hasher::new();
        hasher.append(b"123456789");
        assert_eq!(hasher.finish_u32(), 0xCBF4_3926);
        hasher.append(b"123456789");
        assert_eq!(hasher.finish_u32(), 0xCBF4_3926);
    }

    #[test]
    fn test_crc16_check_value() {
        // CRC-16/UMTS (a.k.a. BUYPASS) check value
        let mut hasher = Crc16Hasher::new();
        hasher.append(b"123456789");
        assert_eq!(hasher.finish_u16(), 0xFEE8);
    }

    #[test]
    fn test_append_range_spans_pages() {
        let data: Vec<u8> = (0..(PAGE_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let mut source = Cursor::new(data.clone());

        let mut ranged = Sha1Hasher::new();
        append_range(&mut ranged, &mut source, 5, (data.len() - 5) as u64).unwrap();

        let mut direct = Sha1Hasher::new();
        direct.append(&data[5..]);
        assert_eq!(ranged.finish(), direct.finish());
    }

    #[test]
    fn test_append_range_short_read_fails() {
        let mut source = Cursor::new(vec![0u8; 10]);
        let mut hasher = Md5Hasher::new();
        let err = append_range(&mut hasher, &mut source, 4, 20).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_hex_roundtrip_rejects_garbage() {
        assert_eq!(from_hex("00ff10").unwrap(), vec![0x00, 0xff, 0x10]);
        assert!(from_hex("abc").is_none());
        assert!(from_hex("zz").is_none());
    }
}
