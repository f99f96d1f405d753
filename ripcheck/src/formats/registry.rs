//! Format registry
//!
//! An ordered list of descriptors. A file is offered first to the descriptors
//! claiming its extension; when none accepts it, every other descriptor gets a
//! try and a hit is reported as a misnamed file. Shadow descriptors claim an
//! extension only to keep unrelated files that share it (`cover.db` next to
//! `Thumbs.db`) out of the misname scan.

use super::{digest, eac_log, extension_of, flac, images, m3u, mp3, riff, simple};
use super::{FormatInstance, ParseFn, HEADER_PROBE_LEN};
use ripcheck_common::{Hashes, IssueTags, RepairKind, Severity};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Marks a descriptor subname as a shadow
pub const SHADOW_MARKER: char = '*';

/// Running counters per descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FormatTotals {
    /// Files accepted, whatever their name
    pub true_total: u32,
    /// Files accepted through the misname scan
    pub misnamed_total: u32,
    /// Files accepted with issues at `Error` or above
    pub error_total: u32,
    /// Files accepted with repairs outstanding
    pub repairable_total: u32,
}

/// One recognizable format
#[derive(Debug, Clone)]
pub struct FormatDescriptor {
    /// Extensions without the dot; the first is canonical
    pub names: &'static [&'static str],
    /// `Some("*...")` for a shadow
    pub subname: Option<&'static str>,
    pub parser: ParseFn,
    pub totals: FormatTotals,
}

impl FormatDescriptor {
    pub fn new(names: &'static [&'static str], parser: ParseFn) -> Self {
        Self {
            names,
            subname: None,
            parser,
            totals: FormatTotals::default(),
        }
    }

    /// A descriptor that claims `names` but never parses anything
    pub fn shadow(names: &'static [&'static str], subname: &'static str) -> Self {
        Self {
            names,
            subname: Some(subname),
            parser: simple::parse_nothing,
            totals: FormatTotals::default(),
        }
    }

    pub fn is_shadow(&self) -> bool {
        self.subname.is_some_and(|s| s.starts_with(SHADOW_MARKER))
    }

    pub fn canonical_extension(&self) -> &'static str {
        self.names.first().copied().unwrap_or("")
    }

    pub fn claims(&self, extension: Option<&str>) -> bool {
        extension.is_some_and(|ext| self.names.iter().any(|n| n.eq_ignore_ascii_case(ext)))
    }
}

/// Ordered descriptor list with per-format counters
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    descriptors: Vec<FormatDescriptor>,
}

impl FormatRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// All formats this tool understands, in probe order
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(FormatDescriptor::new(&["flac"], flac::parse));
        registry.register(FormatDescriptor::new(&["log"], eac_log::parse));
        registry.register(FormatDescriptor::new(&["m3u", "m3u8"], m3u::parse));
        registry.register(FormatDescriptor::new(&["md5"], digest::parse_md5));
        registry.register(FormatDescriptor::new(&["sha1"], digest::parse_sha1));
        registry.register(FormatDescriptor::new(&["sha256"], digest::parse_sha256));
        registry.register(FormatDescriptor::new(&["mp3"], mp3::parse));
        registry.register(FormatDescriptor::new(&["ogg"], simple::parse_ogg));
        registry.register(FormatDescriptor::new(&["wav"], riff::parse));
        registry.register(FormatDescriptor::new(&["png"], images::parse_png));
        registry.register(FormatDescriptor::new(&["jpg", "jpeg"], images::parse_jpeg));
        registry.register(FormatDescriptor::new(&["db"], simple::parse_thumbs_db));
        registry.register(FormatDescriptor::shadow(&["db"], "*shadow"));
        registry
    }

    pub fn register(&mut self, descriptor: FormatDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[FormatDescriptor] {
        &self.descriptors
    }

    /// First non-shadow descriptor claiming `extension`
    pub fn descriptor(&self, extension: &str) -> Option<&FormatDescriptor> {
        self.descriptors
            .iter()
            .find(|d| !d.is_shadow() && d.claims(Some(extension)))
    }

    /// Identify, parse and hash a file
    ///
    /// Returns `None` for unreadable or unrecognized files. Hash failures become
    /// `Fatal` issues on the returned instance. The file handle stays open only
    /// when it is writable, the file has no error and a repair is pending.
    pub fn create_model(&mut self, path: &Path, hashes: Hashes, misname_filter: bool) -> Option<FormatInstance> {
        let (mut file, writable) = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => (file, true),
            Err(_) => match File::open(path) {
                Ok(file) => (file, false),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Cannot open file");
                    return None;
                }
            },
        };

        let header = match read_header(&mut file) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Cannot read header");
                return None;
            }
        };
        let extension = extension_of(path);

        let mut accepted = None;
        let mut shadowed = false;
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            if !descriptor.claims(extension.as_deref()) {
                continue;
            }
            if descriptor.is_shadow() {
                shadowed = true;
                continue;
            }
            if let Some(instance) = try_parse(descriptor.parser, &mut file, &header, path) {
                accepted = Some((i, instance, false));
                break;
            }
        }

        if accepted.is_none() && misname_filter && !shadowed {
            for (i, descriptor) in self.descriptors.iter().enumerate() {
                if descriptor.is_shadow() || descriptor.claims(extension.as_deref()) {
                    continue;
                }
                if let Some(instance) = try_parse(descriptor.parser, &mut file, &header, path) {
                    accepted = Some((i, instance, true));
                    break;
                }
            }
        }

        let Some((index, mut instance, misnamed)) = accepted else {
            tracing::debug!(file = %path.display(), shadowed, "Unrecognized file");
            return None;
        };

        let descriptor = &mut self.descriptors[index];
        descriptor.totals.true_total += 1;
        if misnamed {
            descriptor.totals.misnamed_total += 1;
            let canonical = descriptor.canonical_extension().to_string();
            let message = format!(
                "{} is {} content and should have extension .{}",
                instance.name, instance.format_name, canonical
            );
            let prompt = format!("Rename {} to .{}?", instance.name, canonical);
            instance.issues.add_repairable(
                message,
                Severity::Warning,
                IssueTags::MISNAMED,
                prompt,
                RepairKind::RenameToCanonicalExtension {
                    extension: canonical.clone(),
                },
                false,
            );
            instance.misnamed_as = Some(canonical);
        }

        instance.attach_source(file, writable);
        if !instance.issues.has_fatal() {
            if let Err(e) = instance.calc_hashes(hashes) {
                instance.issues.add(
                    format!("{}: read failure while hashing: {}", instance.name, e),
                    Severity::Fatal,
                    IssueTags::FAILURE,
                );
            }
        }

        if instance.issues.has_error() {
            descriptor.totals.error_total += 1;
        }
        if instance.issues.repairable_count() > 0 {
            descriptor.totals.repairable_total += 1;
        }
        if !(writable && !instance.issues.has_error() && instance.issues.repairable_count() > 0) {
            instance.close();
        }

        tracing::debug!(
            file = %path.display(),
            format = instance.format_name,
            misnamed,
            severity = %instance.issues.max_severity(),
            "Recognized file"
        );
        Some(instance)
    }
}

fn read_header(file: &mut File) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_PROBE_LEN);
    file.by_ref().take(HEADER_PROBE_LEN as u64).read_to_end(&mut header)?;
    Ok(header)
}

fn try_parse(parser: ParseFn, file: &mut File, header: &[u8], path: &Path) -> Option<FormatInstance> {
    file.seek(SeekFrom::Start(0)).ok()?;
    parser(file, header, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn ogg_bytes() -> Vec<u8> {
        let mut b = b"OggS".to_vec();
        b.resize(64, 0);
        b
    }

    fn totals(registry: &FormatRegistry, ext: &str) -> FormatTotals {
        registry.descriptor(ext).unwrap().totals
    }

    #[test]
    fn test_standard_order_and_shadow() {
        let registry = FormatRegistry::standard();
        assert_eq!(registry.descriptors()[0].canonical_extension(), "flac");
        let last = registry.descriptors().last().unwrap();
        assert!(last.is_shadow());
        assert!(!registry.descriptor("db").unwrap().is_shadow());
    }

    #[test]
    fn test_exact_match_skips_misname_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.ogg", &ogg_bytes());
        let mut registry = FormatRegistry::standard();

        let instance = registry.create_model(&path, Hashes::FILE_MD5, true).unwrap();
        assert!(instance.misnamed_as.is_none());
        assert!(instance.issues.is_empty());
        assert!(instance.hashes.file_md5.is_some());
        assert!(!instance.is_open());
        assert_eq!(totals(&registry, "ogg").true_total, 1);
        assert_eq!(totals(&registry, "ogg").misnamed_total, 0);
    }

    #[test]
    fn test_misnamed_file_found_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.wav", &ogg_bytes());
        let mut registry = FormatRegistry::standard();

        let instance = registry.create_model(&path, Hashes::empty(), true).unwrap();
        assert_eq!(instance.misnamed_as.as_deref(), Some("ogg"));
        assert!(instance.issues.has_tag(IssueTags::MISNAMED));
        assert_eq!(instance.issues.repairable_count(), 1);
        // Writable with a repair pending: handle kept for the repair
        assert!(instance.is_open());
        assert_eq!(totals(&registry, "ogg").misnamed_total, 1);
        assert_eq!(totals(&registry, "ogg").true_total, 1);
        assert_eq!(totals(&registry, "wav").true_total, 0);
    }

    #[test]
    fn test_misname_filter_off() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.wav", &ogg_bytes());
        let mut registry = FormatRegistry::standard();
        assert!(registry.create_model(&path, Hashes::empty(), false).is_none());
    }

    #[test]
    fn test_shadow_suppresses_misname_scan() {
        let dir = tempfile::tempdir().unwrap();
        let mut thumbs = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        thumbs.resize(512, 0);
        let thumbs_path = write(dir.path(), "Thumbs.db", &thumbs);
        // Ogg content would be found by a misname scan if it ran
        let cover_path = write(dir.path(), "cover.db", &ogg_bytes());
        let mut registry = FormatRegistry::standard();

        let instance = registry.create_model(&thumbs_path, Hashes::empty(), true).unwrap();
        assert!(instance.misnamed_as.is_none());
        assert!(registry.create_model(&cover_path, Hashes::empty(), true).is_none());

        for descriptor in registry.descriptors() {
            assert_eq!(descriptor.totals.misnamed_total, 0);
        }
        assert_eq!(totals(&registry, "db").true_total, 1);
    }

    #[test]
    fn test_unknown_extension_unrecognized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "notes.txt", b"shopping list\nmilk\n");
        let mut registry = FormatRegistry::standard();
        assert!(registry.create_model(&path, Hashes::FILE_MD5, true).is_none());
    }

    #[test]
    fn test_missing_file() {
        let mut registry = FormatRegistry::standard();
        assert!(registry
            .create_model(Path::new("/nonexistent/a.flac"), Hashes::empty(), true)
            .is_none());
    }
}
