//! PCM digest computation
//!
//! Decodes a lossless file with symphonia and hashes the interleaved samples
//! as 16-bit little-endian bytes, the same byte stream an extraction log CRC
//! and the FLAC STREAMINFO MD5 are computed over.

use anyhow::{Context, Result};
use ripcheck_common::hashing::{Crc32Hasher, Hasher, Md5Hasher};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Digests of a decoded sample stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmDigests {
    /// CRC-32 of the sample bytes
    pub crc32: u32,
    /// MD5 of the sample bytes
    pub md5: [u8; 16],
    /// Sample frames decoded (one frame = one sample per channel)
    pub frames: u64,
    pub sample_rate: u32,
    pub channels: usize,
}

/// Decode `file_path` and digest its PCM
///
/// # Errors
/// * File I/O errors
/// * Unsupported format
/// * Corrupt audio data
pub fn digest_pcm(file_path: &Path) -> Result<PcmDigests> {
    tracing::debug!(path = %file_path.display(), "Decoding for PCM digests");

    let file = std::fs::File::open(file_path)
        .with_context(|| format!("Failed to open audio file: {}", file_path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio file: {}", file_path.display()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found in file")?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.context("Sample rate unknown")?;
    let channels = track.codec_params.channels.context("Channels unknown")?.count();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create decoder for: {}", file_path.display()))?;

    let mut crc = Crc32Hasher::new();
    let mut md5 = Md5Hasher::new();
    let mut frames: u64 = 0;
    let mut sample_buf: Option<SampleBuffer<i16>> = None;
    let mut bytes: Vec<u8> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(anyhow::anyhow!("Error reading packet: {}", e));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .with_context(|| format!("Failed to decode packet in: {}", file_path.display()))?;

        let needed = decoded.frames() * decoded.spec().channels.count();
        if sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
            sample_buf = Some(SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec()));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        bytes.clear();
        for sample in buf.samples() {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        crc.append(&bytes);
        md5.append(&bytes);
        frames += (buf.samples().len() / channels.max(1)) as u64;
    }

    let mut md5_bytes = [0u8; 16];
    md5_bytes.copy_from_slice(&md5.finish());

    let digests = PcmDigests {
        crc32: crc.finish_u32(),
        md5: md5_bytes,
        frames,
        sample_rate,
        channels,
    };

    tracing::debug!(
        path = %file_path.display(),
        frames = digests.frames,
        crc32 = %format!("{:08X}", digests.crc32),
        "PCM digest complete"
    );

    Ok(digests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_error() {
        let result = digest_pcm(Path::new("/nonexistent/track.flac"));
        assert!(result.is_err());
    }

    #[test]
    fn test_non_audio_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.flac");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(digest_pcm(&path).is_err());
    }
}
