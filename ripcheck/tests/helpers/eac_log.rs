//! EAC Log Test Fixture Generator
//!
//! Produces a secure-mode extraction log that parses without issues.

use super::flac_builder::{pcm_crc32, TrackConfig};

/// One logged track
#[derive(Debug, Clone)]
pub struct LoggedTrack {
    pub file_stem: String,
    pub sectors: usize,
    pub copy_crc: u32,
}

impl LoggedTrack {
    /// Log entry matching a generated FLAC track
    pub fn matching(file_stem: &str, config: &TrackConfig) -> Self {
        Self {
            file_stem: file_stem.to_string(),
            sectors: config.sectors,
            copy_crc: pcm_crc32(config),
        }
    }
}

/// Render a complete log
pub fn clean_log(artist: &str, album: &str, tracks: &[LoggedTrack]) -> String {
    let mut log = String::new();
    log.push_str("Exact Audio Copy V1.6 from 23. October 2020\n\n");
    log.push_str("EAC extraction logfile from 16. October 2026, 12:00\n\n");
    log.push_str(&format!("{} / {}\n\n", artist, album));
    log.push_str("Used drive  : PLEXTOR DVDR   PX-716A   Adapter: 0  ID: 1\n\n");
    log.push_str("Read mode               : Secure\n");
    log.push_str("Utilize accurate stream : Yes\n");
    log.push_str("Defeat audio cache      : Yes\n");
    log.push_str("Make use of C2 pointers : No\n\n");
    log.push_str("Read offset correction                      : 30\n");
    log.push_str("Null samples used in CRC calculations       : Yes\n");
    log.push_str("Gap handling                                : Appended to previous track\n\n");

    log.push_str("TOC of the extracted CD\n\n");
    log.push_str("     Track |   Start  |  Length  | Start sector | End sector\n");
    log.push_str("    ---------------------------------------------------------\n");
    let mut start = 0;
    for (i, track) in tracks.iter().enumerate() {
        let end = start + track.sectors - 1;
        log.push_str(&format!(
            "       {:>2}  |  0:00.00 |  0:00.02 |    {:>6}    |   {:>6}\n",
            i + 1,
            start,
            end
        ));
        start = end + 1;
    }
    log.push('\n');

    for (i, track) in tracks.iter().enumerate() {
        log.push_str(&format!("Track {:>2}\n\n", i + 1));
        log.push_str(&format!("     Filename C:\\Rips\\{}.wav\n\n", track.file_stem));
        log.push_str("     Peak level 98.2 %\n");
        log.push_str("     Track quality 100.0 %\n");
        log.push_str(&format!("     Test CRC {:08X}\n", track.copy_crc));
        log.push_str(&format!("     Copy CRC {:08X}\n", track.copy_crc));
        log.push_str("     Accurately ripped (confidence 5)  [ABCD1234]  (AR v2)\n");
        log.push_str("     Copy OK\n\n");
    }

    log.push_str("No errors occurred\n\n");
    log.push_str("End of status report\n\n");
    log.push_str("==== Log checksum 0123456789ABCDEF ====\n");
    log
}
