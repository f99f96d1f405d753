//! File and directory naming conventions
//!
//! - Log: `<Work>.log`, `<Work>.FLAC.log` or `<Work>.FLAC.<Signer>.log`
//! - Digest: `<Work>.FLAC.<Signer>.<md5|sha1|sha256>`
//! - Playlist: `<Work>.m3u`
//! - Track: `NN - Title.flac`
//! - Failed directory: `!!_ERRORS_!!<name>`

use ripcheck_common::config::DigestFormat;
use std::io;
use std::path::{Path, PathBuf};

/// Audio format tag embedded in signed names
pub const FORMAT_TAG: &str = "FLAC";
/// Prefix marking a directory that failed validation
pub const FAILED_PREFIX: &str = "!!_ERRORS_!!";
/// Itemized report left in failing directories
pub const MARKER_FILE_NAME: &str = "ripcheck.noncompliant.txt";
/// Decoration for the intermediate name of a case-only rename
const CASE_RENAME_SUFFIX: &str = ".ripcheck-rename";

/// Parts of a log file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogName {
    pub work: String,
    pub format_tag: Option<String>,
    pub signer: Option<String>,
}

/// Split a log file name into work name, format tag and signer
///
/// The work name may itself contain dots, so fields are taken from the right.
pub fn parse_log_name(file_name: &str) -> Option<LogName> {
    let stem = strip_suffix_ignore_case(file_name, ".log")?;
    if stem.is_empty() {
        return None;
    }

    if let Some((rest, last)) = stem.rsplit_once('.') {
        if last.eq_ignore_ascii_case(FORMAT_TAG) && !rest.is_empty() {
            return Some(LogName {
                work: rest.to_string(),
                format_tag: Some(last.to_string()),
                signer: None,
            });
        }
        if let Some((work, tag)) = rest.rsplit_once('.') {
            if tag.eq_ignore_ascii_case(FORMAT_TAG) && !work.is_empty() && !last.is_empty() {
                return Some(LogName {
                    work: work.to_string(),
                    format_tag: Some(tag.to_string()),
                    signer: Some(last.to_string()),
                });
            }
        }
    }

    Some(LogName {
        work: stem.to_string(),
        format_tag: None,
        signer: None,
    })
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    let (stem, tail) = (name.get(..split)?, name.get(split..)?);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}

pub fn signed_log_name(work: &str, signer: &str) -> String {
    format!("{}.{}.{}.log", work, FORMAT_TAG, signer)
}

pub fn digest_name(work: &str, signer: &str, format: DigestFormat) -> String {
    format!("{}.{}.{}.{}", work, FORMAT_TAG, signer, format.extension())
}

/// Work name and signer from a digest file name
pub fn parse_digest_name(file_name: &str) -> Option<(String, String)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    DigestFormat::from_extension(ext)?;
    let (rest, signer) = stem.rsplit_once('.')?;
    let (work, tag) = rest.rsplit_once('.')?;
    (tag.eq_ignore_ascii_case(FORMAT_TAG) && !work.is_empty() && !signer.is_empty())
        .then(|| (work.to_string(), signer.to_string()))
}

pub fn playlist_name(work: &str) -> String {
    format!("{}.m3u", work)
}

pub fn track_name(number: usize, title: &str) -> String {
    format!("{:02} - {}.flac", number, sanitize_file_name(title))
}

/// Replace characters that are unsafe in file names on common filesystems
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    // Windows rejects names ending in a dot or space
    cleaned.trim().trim_end_matches('.').to_string()
}

/// Summary line and comment prompt for changes found since the last signing
pub fn change_summary(edits: usize, renames: usize, album_renames: usize) -> (String, String) {
    fn plural(n: usize, one: &str, many: &str) -> String {
        format!("{} {}", n, if n == 1 { one } else { many })
    }

    let mut parts = Vec::new();
    if edits > 0 {
        parts.push(plural(edits, "track edit", "track edits"));
    }
    if renames > 0 {
        parts.push(plural(renames, "track rename", "track renames"));
    }
    if album_renames > 0 {
        parts.push(plural(album_renames, "album rename", "album renames"));
    }

    let summary = if parts.is_empty() {
        "No changes".to_string()
    } else {
        format!("Changed since last signing: {}", parts.join(", "))
    };
    let prompt = format!("{}. Enter a comment describing the change:", summary);
    (summary, prompt)
}

pub fn strip_failed_prefix(name: &str) -> &str {
    name.strip_prefix(FAILED_PREFIX).unwrap_or(name)
}

/// Prefix a failed directory so it stands out; returns the new path
pub fn mark_failed_directory(dir: &Path) -> io::Result<PathBuf> {
    let name = dir_name(dir)?;
    if name.starts_with(FAILED_PREFIX) {
        return Ok(dir.to_path_buf());
    }
    let target = dir.with_file_name(format!("{}{}", FAILED_PREFIX, name));
    rename_path(dir, &target)?;
    tracing::info!(from = %dir.display(), to = %target.display(), "Marked failed directory");
    Ok(target)
}

/// Remove the failure prefix after a later success; returns the new path
pub fn unmark_failed_directory(dir: &Path) -> io::Result<PathBuf> {
    let name = dir_name(dir)?;
    let stripped = strip_failed_prefix(&name);
    if stripped.len() == name.len() {
        return Ok(dir.to_path_buf());
    }
    let target = dir.with_file_name(stripped);
    rename_path(dir, &target)?;
    tracing::info!(from = %dir.display(), to = %target.display(), "Cleared failed directory mark");
    Ok(target)
}

fn dir_name(dir: &Path) -> io::Result<String> {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{} has no name", dir.display())))
}

/// Rename a file or directory
///
/// Renames that differ only in case go through a decorated intermediate name
/// so case-insensitive filesystems see two distinct renames. An existing
/// target is never overwritten.
pub fn rename_path(from: &Path, to: &Path) -> io::Result<()> {
    if from == to {
        return Ok(());
    }
    let case_only = from.to_string_lossy().to_lowercase() == to.to_string_lossy().to_lowercase();
    if case_only {
        // On a case-sensitive filesystem the target can be a distinct file
        if lists_exact_name(to)? {
            return Err(already_exists(to));
        }
        let mut temp = to.as_os_str().to_owned();
        temp.push(CASE_RENAME_SUFFIX);
        let temp = PathBuf::from(temp);
        if temp.exists() {
            return Err(already_exists(&temp));
        }
        std::fs::rename(from, &temp)?;
        return std::fs::rename(&temp, to);
    }
    if to.exists() {
        return Err(already_exists(to));
    }
    std::fs::rename(from, to)
}

/// True when the parent directory lists the name of `path` byte for byte
fn lists_exact_name(path: &Path) -> io::Result<bool> {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(false);
    };
    let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
    for entry in std::fs::read_dir(parent)? {
        if entry?.file_name() == name {
            return Ok(true);
        }
    }
    Ok(false)
}

fn already_exists(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, format!("{} already exists", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_names() {
        assert_eq!(
            parse_log_name("Artist - Album.FLAC.alice.log"),
            Some(LogName {
                work: "Artist - Album".to_string(),
                format_tag: Some("FLAC".to_string()),
                signer: Some("alice".to_string()),
            })
        );
        assert_eq!(parse_log_name("Vol. 2.FLAC.log").unwrap().work, "Vol. 2");
        assert_eq!(parse_log_name("Vol. 2.FLAC.log").unwrap().signer, None);

        let plain = parse_log_name("Greatest Hits Vol. 2.LOG").unwrap();
        assert_eq!(plain.work, "Greatest Hits Vol. 2");
        assert_eq!(plain.format_tag, None);
        assert!(parse_log_name("cover.jpg").is_none());
        assert!(parse_log_name(".log").is_none());
    }

    #[test]
    fn test_signed_names_round_trip() {
        let log = signed_log_name("Work", "bob");
        assert_eq!(log, "Work.FLAC.bob.log");
        assert_eq!(parse_log_name(&log).unwrap().signer.as_deref(), Some("bob"));

        let digest = digest_name("Work", "bob", DigestFormat::Sha256);
        assert_eq!(digest, "Work.FLAC.bob.sha256");
        assert_eq!(parse_digest_name(&digest), Some(("Work".to_string(), "bob".to_string())));
        assert_eq!(parse_digest_name("Work.md5"), None);
    }

    #[test]
    fn test_track_names() {
        assert_eq!(track_name(3, "Who? What: Why"), "03 - Who_ What_ Why.flac");
        assert_eq!(track_name(12, "Ends with dot."), "12 - Ends with dot.flac");
    }

    #[test]
    fn test_change_summary() {
        let (summary, prompt) = change_summary(1, 2, 0);
        assert_eq!(summary, "Changed since last signing: 1 track edit, 2 track renames");
        assert!(prompt.starts_with(&summary));
        assert_eq!(change_summary(0, 0, 0).0, "No changes");
    }

    #[test]
    fn test_mark_and_unmark() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("Artist - Album");
        std::fs::create_dir(&dir).unwrap();

        let marked = mark_failed_directory(&dir).unwrap();
        assert_eq!(marked.file_name().unwrap(), "!!_ERRORS_!!Artist - Album");
        assert!(marked.is_dir());
        assert_eq!(mark_failed_directory(&marked).unwrap(), marked);

        let unmarked = unmark_failed_directory(&marked).unwrap();
        assert_eq!(unmarked, dir);
        assert!(dir.is_dir());
    }

    #[test]
    fn test_rename_path_case_only_and_collision() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("track.flac");
        let b = root.path().join("Track.flac");
        let c = root.path().join("other.flac");
        std::fs::write(&a, b"1").unwrap();
        std::fs::write(&c, b"2").unwrap();

        rename_path(&a, &b).unwrap();
        assert!(b.exists());
        assert!(rename_path(&b, &c).is_err());
        assert_eq!(std::fs::read(&c).unwrap(), b"2");
    }

    #[test]
    fn test_case_only_rename_keeps_distinct_target() {
        let root = tempfile::tempdir().unwrap();
        let lower = root.path().join("notes.txt");
        let upper = root.path().join("Notes.txt");
        std::fs::write(&lower, b"lower").unwrap();
        std::fs::write(&upper, b"upper").unwrap();
        if std::fs::read_dir(root.path()).unwrap().count() < 2 {
            // Case-insensitive filesystem: both names are one file
            return;
        }

        let err = rename_path(&lower, &upper).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&lower).unwrap(), b"lower");
        assert_eq!(std::fs::read(&upper).unwrap(), b"upper");
    }

    #[test]
    fn test_case_only_rename_refuses_busy_temp_name() {
        let root = tempfile::tempdir().unwrap();
        let from = root.path().join("cover.JPG");
        let to = root.path().join("cover.jpg");
        let temp = root.path().join(format!("cover.jpg{}", CASE_RENAME_SUFFIX));
        std::fs::write(&from, b"image").unwrap();
        std::fs::write(&temp, b"left over").unwrap();

        assert!(rename_path(&from, &to).is_err());
        assert_eq!(std::fs::read(&from).unwrap(), b"image");
        assert_eq!(std::fs::read(&temp).unwrap(), b"left over");
    }
}
