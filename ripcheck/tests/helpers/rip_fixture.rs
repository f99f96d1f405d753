//! Rip Directory Fixtures
//!
//! Builds an unsigned two-track rip `Artist - Album/` inside a temp dir:
//! `Artist - Album.log`, `01 - Intro.flac` and `02 - Outro.flac`, with tags
//! and log CRCs that agree.

use super::eac_log::{clean_log, LoggedTrack};
use super::flac_builder::{write_flac, TrackConfig};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ARTIST: &str = "Artist";
pub const ALBUM: &str = "Album";
pub const WORK: &str = "Artist - Album";

/// A rip directory on disk
///
/// The TempDir must be kept alive for the duration of the test.
pub struct RipFixture {
    pub root: TempDir,
    pub dir: PathBuf,
    pub tracks: Vec<(String, TrackConfig)>,
}

/// Tags for one track of the standard album
pub fn album_tags(number: usize, title: &str) -> TrackConfig {
    let tags = [
        format!("ARTIST={}", ARTIST),
        format!("ALBUM={}", ALBUM),
        format!("TITLE={}", title),
        format!("TRACKNUMBER={}", number),
    ];
    let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
    TrackConfig::new(number as u32, &tags)
}

impl RipFixture {
    /// Standard two-track rip
    pub fn new() -> Result<Self> {
        Self::with_tracks(&[("01 - Intro", album_tags(1, "Intro")), ("02 - Outro", album_tags(2, "Outro"))])
    }

    /// Rip with the given `(file stem, track)` pairs, all of them logged
    pub fn with_tracks(tracks: &[(&str, TrackConfig)]) -> Result<Self> {
        let root = TempDir::new()?;
        let dir = root.path().join(WORK);
        std::fs::create_dir(&dir)?;

        let fixture = Self {
            root,
            dir,
            tracks: tracks.iter().map(|(stem, c)| (stem.to_string(), c.clone())).collect(),
        };
        for (stem, config) in &fixture.tracks {
            write_flac(&fixture.dir.join(format!("{}.flac", stem)), config)?;
        }
        let logged: Vec<LoggedTrack> = fixture
            .tracks
            .iter()
            .map(|(stem, config)| LoggedTrack::matching(stem, config))
            .collect();
        fixture.write_log(&logged)?;
        Ok(fixture)
    }

    /// Replace the log with one describing `tracks`
    pub fn write_log(&self, tracks: &[LoggedTrack]) -> Result<()> {
        std::fs::write(self.dir.join(format!("{}.log", WORK)), clean_log(ARTIST, ALBUM, tracks))?;
        Ok(())
    }

    /// Path inside the temp root, for directories that were renamed
    pub fn in_root(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Sorted file names directly inside `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
