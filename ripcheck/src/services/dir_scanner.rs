//! Rip directory discovery and listing
//!
//! A rip directory is any directory holding an extraction log. Listing is
//! flat: files are sorted by name and grouped by extension for the pipeline.

use crate::formats::extension_of;
use crate::services::naming::MARKER_FILE_NAME;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Directory scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot read a directory
    #[error("Directory access error {0}: {1}")]
    AccessError(PathBuf, String),
}

/// Files of one directory grouped by role
#[derive(Debug, Clone, Default)]
pub struct DirectoryListing {
    pub logs: Vec<PathBuf>,
    pub audio: Vec<PathBuf>,
    pub playlists: Vec<PathBuf>,
    pub digests: Vec<PathBuf>,
    pub others: Vec<PathBuf>,
}

impl DirectoryListing {
    pub fn file_count(&self) -> usize {
        self.logs.len() + self.audio.len() + self.playlists.len() + self.digests.len() + self.others.len()
    }
}

/// Rip directory scanner
pub struct DirectoryScanner {
    ignore_names: Vec<String>,
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryScanner {
    /// Create a scanner ignoring desktop clutter and our own marker file
    pub fn new() -> Self {
        Self {
            ignore_names: vec![
                ".DS_Store".to_string(),
                "desktop.ini".to_string(),
                MARKER_FILE_NAME.to_string(),
            ],
        }
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignore_names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// List the files directly inside `dir`
    pub fn list(&self, dir: &Path) -> Result<DirectoryListing, ScanError> {
        check_directory(dir)?;
        let entries = std::fs::read_dir(dir).map_err(|e| ScanError::AccessError(dir.to_path_buf(), e.to_string()))?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => {
                    let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                    let name = entry.file_name().to_string_lossy().to_string();
                    if is_file && !self.is_ignored(&name) {
                        files.push(entry.path());
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }
        files.sort();

        let mut listing = DirectoryListing::default();
        for path in files {
            match role_of(&path) {
                FileRole::Log => listing.logs.push(path),
                FileRole::Audio => listing.audio.push(path),
                FileRole::Playlist => listing.playlists.push(path),
                FileRole::Digest => listing.digests.push(path),
                FileRole::Other => listing.others.push(path),
            }
        }

        tracing::debug!(
            directory = %dir.display(),
            files = listing.file_count(),
            audio = listing.audio.len(),
            "Listed directory"
        );
        Ok(listing)
    }

    /// Find rip directories at or below `root`
    ///
    /// Without `recursive` only `root` and its immediate subdirectories are
    /// considered.
    pub fn find_rip_directories(&self, root: &Path, recursive: bool) -> Result<Vec<PathBuf>, ScanError> {
        check_directory(root)?;

        let mut symlink_visited = HashSet::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| should_descend(e, &mut symlink_visited));

        let mut found = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => {
                    if contains_log(entry.path()) {
                        found.push(entry.path().to_path_buf());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        tracing::info!(root = %root.display(), found = found.len(), "Rip directory discovery complete");
        Ok(found)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileRole {
    Log,
    Audio,
    Playlist,
    Digest,
    Other,
}

fn role_of(path: &Path) -> FileRole {
    match extension_of(path).as_deref() {
        Some("log") => FileRole::Log,
        Some("flac") => FileRole::Audio,
        Some("m3u") | Some("m3u8") => FileRole::Playlist,
        Some("md5") | Some("sha1") | Some("sha256") => FileRole::Digest,
        _ => FileRole::Other,
    }
}

/// True when the extension places the file in one of the rip's own groups
pub fn has_rip_role(path: &Path) -> bool {
    role_of(path) != FileRole::Other
}

fn check_directory(dir: &Path) -> Result<(), ScanError> {
    if !dir.exists() {
        return Err(ScanError::PathNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }
    Ok(())
}

fn should_descend(entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
    if !entry.file_type().is_dir() && !entry.file_type().is_symlink() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if entry.depth() > 0 && name.starts_with('.') {
        return false;
    }
    if entry.file_type().is_symlink() {
        if let Ok(canonical) = entry.path().canonicalize() {
            if !symlink_visited.insert(canonical) {
                tracing::warn!("Symlink loop detected: {}", entry.path().display());
                return false;
            }
        }
    }
    true
}

fn contains_log(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.path().is_file() && extension_of(&e.path()).as_deref() == Some("log"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_list_groups_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.flac", "a.flac", "x.log", "x.m3u", "x.FLAC.alice.md5", "cover.jpg", ".DS_Store"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::write(dir.path().join(MARKER_FILE_NAME), b"x").unwrap();

        let listing = DirectoryScanner::new().list(dir.path()).unwrap();
        assert_eq!(listing.logs.len(), 1);
        assert_eq!(listing.audio.len(), 2);
        assert!(listing.audio[0].ends_with("a.flac"));
        assert_eq!(listing.playlists.len(), 1);
        assert_eq!(listing.digests.len(), 1);
        assert_eq!(listing.others.len(), 1);
    }

    #[test]
    fn test_rip_roles() {
        assert!(has_rip_role(Path::new("bonus.FLAC")));
        assert!(has_rip_role(Path::new("x.sha256")));
        assert!(has_rip_role(Path::new("x.m3u8")));
        assert!(!has_rip_role(Path::new("bonus.wav")));
        assert!(!has_rip_role(Path::new("README")));
    }

    #[test]
    fn test_list_rejects_missing_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"x").unwrap();

        let scanner = DirectoryScanner::new();
        assert!(matches!(scanner.list(&dir.path().join("nope")), Err(ScanError::PathNotFound(_))));
        assert!(matches!(scanner.list(&file), Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_find_rip_directories_depth() {
        let root = tempfile::tempdir().unwrap();
        let rip_a = root.path().join("Artist - A");
        let rip_b = root.path().join("Various").join("Artist - B");
        fs::create_dir_all(&rip_a).unwrap();
        fs::create_dir_all(&rip_b).unwrap();
        fs::write(rip_a.join("A.log"), b"x").unwrap();
        fs::write(rip_b.join("B.log"), b"x").unwrap();

        let scanner = DirectoryScanner::new();
        let shallow = scanner.find_rip_directories(root.path(), false).unwrap();
        assert_eq!(shallow, vec![rip_a.clone()]);

        let deep = scanner.find_rip_directories(root.path(), true).unwrap();
        assert_eq!(deep, vec![rip_a, rip_b]);
    }
}
