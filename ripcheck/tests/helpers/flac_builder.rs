//! FLAC Test Fixture Generator
//!
//! Writes small but fully decodable FLAC files: 44.1 kHz, 16-bit stereo,
//! VERBATIM subframes, correct frame CRCs and a STREAMINFO MD5.

use ripcheck_common::hashing::{Crc16Hasher, Crc32Hasher, Hasher, Md5Hasher};
use std::path::Path;

/// Samples per channel in one frame (one CD sector)
pub const BLOCK_SIZE: usize = 588;

/// Configuration for a generated track
#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Varies the generated waveform so tracks differ
    pub seed: u32,
    /// Whole sectors of audio
    pub sectors: usize,
    /// `KEY=value` Vorbis comments
    pub tags: Vec<String>,
}

impl TrackConfig {
    pub fn new(seed: u32, tags: &[&str]) -> Self {
        Self {
            seed,
            sectors: 2,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Interleaved stereo samples for a track
pub fn samples(config: &TrackConfig) -> Vec<i16> {
    let frames = config.sectors * BLOCK_SIZE;
    (0..frames * 2)
        .map(|i| {
            let v = (i as u32).wrapping_mul(37).wrapping_add(config.seed.wrapping_mul(101)) % 2000;
            v as i16 - 1000
        })
        .collect()
}

/// Little-endian PCM bytes, as hashed by EAC and by STREAMINFO MD5
pub fn pcm_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// CRC-32 of the PCM, matching an EAC copy CRC with null samples included
pub fn pcm_crc32(config: &TrackConfig) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.append(&pcm_le_bytes(&samples(config)));
    hasher.finish_u32()
}

fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
    }
    crc
}

fn streaminfo(total_frames: u64, md5: &[u8]) -> Vec<u8> {
    let mut b = Vec::with_capacity(34);
    b.extend_from_slice(&(BLOCK_SIZE as u16).to_be_bytes());
    b.extend_from_slice(&(BLOCK_SIZE as u16).to_be_bytes());
    // Unknown min/max frame size
    b.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    let packed: u64 = (44100u64 << 44) | (1u64 << 41) | (15u64 << 36) | total_frames;
    b.extend_from_slice(&packed.to_be_bytes());
    b.extend_from_slice(md5);
    b
}

fn vorbis_comment(tags: &[String]) -> Vec<u8> {
    let vendor = b"ripcheck tests";
    let mut b = Vec::new();
    b.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    b.extend_from_slice(vendor);
    b.extend_from_slice(&(tags.len() as u32).to_le_bytes());
    for tag in tags {
        b.extend_from_slice(&(tag.len() as u32).to_le_bytes());
        b.extend_from_slice(tag.as_bytes());
    }
    b
}

fn frame(number: usize, left: &[i16], right: &[i16]) -> Vec<u8> {
    assert!(number < 128, "single-byte frame numbers only");
    let mut f = vec![
        0xFF,
        0xF8,
        // Block size from header end (16-bit), 44.1 kHz
        0x79,
        // Independent stereo, 16 bits per sample
        0x18,
        number as u8,
    ];
    f.extend_from_slice(&((left.len() - 1) as u16).to_be_bytes());
    let header_crc = crc8(&f);
    f.push(header_crc);

    for channel in [left, right] {
        // VERBATIM, no wasted bits
        f.push(0x02);
        for sample in channel {
            f.extend_from_slice(&sample.to_be_bytes());
        }
    }

    let mut crc = Crc16Hasher::new();
    crc.append(&f);
    f.extend_from_slice(&crc.finish_u16().to_be_bytes());
    f
}

/// Encode a complete FLAC file
pub fn flac_bytes(config: &TrackConfig) -> Vec<u8> {
    let pcm = samples(config);
    let mut md5 = Md5Hasher::new();
    md5.append(&pcm_le_bytes(&pcm));
    let md5 = md5.finish();

    let total_frames = (pcm.len() / 2) as u64;
    let mut out = b"fLaC".to_vec();

    let info = streaminfo(total_frames, &md5);
    out.push(0x00);
    out.extend_from_slice(&(info.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&info);

    let comments = vorbis_comment(&config.tags);
    out.push(0x80 | 0x04);
    out.extend_from_slice(&(comments.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&comments);

    for (number, block) in pcm.chunks(BLOCK_SIZE * 2).enumerate() {
        let left: Vec<i16> = block.iter().step_by(2).copied().collect();
        let right: Vec<i16> = block.iter().skip(1).step_by(2).copied().collect();
        out.extend_from_slice(&frame(number, &left, &right));
    }
    out
}

/// Write a FLAC file to `path`
pub fn write_flac(path: &Path, config: &TrackConfig) -> std::io::Result<()> {
    std::fs::write(path, flac_bytes(config))
}

