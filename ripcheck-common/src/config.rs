//! Configuration loading and config file resolution
//!
//! Settings come from a TOML file. The file location follows this priority:
//! 1. Command-line argument (highest priority)
//! 2. `RIPCHECK_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/ripcheck/config.toml` on Linux)
//! 4. Built-in defaults when no file exists

use crate::hashing::{Hasher, Hashes, Md5Hasher, Sha1Hasher, Sha256Hasher};
use crate::issues::IssueTags;
use crate::severity::Severity;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "RIPCHECK_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Validation behavior (optional)
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// How canonical album names are derived from tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingStrategy {
    /// `Artist - Album`
    #[default]
    ArtistTitle,
    /// `Album`
    ShortTitle,
    /// Keep existing names, never rename
    Manual,
}

impl std::str::FromStr for NamingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist-title" => Ok(NamingStrategy::ArtistTitle),
            "short-title" => Ok(NamingStrategy::ShortTitle),
            "manual" => Ok(NamingStrategy::Manual),
            other => Err(Error::InvalidInput(format!("Unknown naming strategy: {}", other))),
        }
    }
}

/// Digest file flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestFormat {
    #[default]
    Md5,
    Sha1,
    Sha256,
}

impl DigestFormat {
    pub const ALL: [DigestFormat; 3] = [DigestFormat::Md5, DigestFormat::Sha1, DigestFormat::Sha256];

    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            DigestFormat::Md5 => "md5",
            DigestFormat::Sha1 => "sha1",
            DigestFormat::Sha256 => "sha256",
        }
    }

    pub fn from_extension(ext: &str) -> Option<DigestFormat> {
        DigestFormat::ALL
            .iter()
            .copied()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    /// Whole-file hash flag matching this flavor
    pub fn file_hash(&self) -> Hashes {
        match self {
            DigestFormat::Md5 => Hashes::FILE_MD5,
            DigestFormat::Sha1 => Hashes::FILE_SHA1,
            DigestFormat::Sha256 => Hashes::FILE_SHA256,
        }
    }

    pub fn new_hasher(&self) -> Box<dyn Hasher> {
        match self {
            DigestFormat::Md5 => Box::new(Md5Hasher::new()),
            DigestFormat::Sha1 => Box::new(Sha1Hasher::new()),
            DigestFormat::Sha256 => Box::new(Sha256Hasher::new()),
        }
    }

    /// Hex digest length
    pub fn hex_len(&self) -> usize {
        match self {
            DigestFormat::Md5 => 32,
            DigestFormat::Sha1 => 40,
            DigestFormat::Sha256 => 64,
        }
    }
}

impl std::str::FromStr for DigestFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DigestFormat::from_extension(s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("Unknown digest format: {}", s)))
    }
}

/// Validation pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Identity authorizing renames and signing; absent means verify only
    #[serde(default)]
    pub signer: Option<String>,

    #[serde(default)]
    pub naming: NamingStrategy,

    #[serde(default)]
    pub digest_format: DigestFormat,

    /// Issue tag names promoted to at least Warning
    #[serde(default)]
    pub warn_escalator: Vec<String>,

    /// Issue tag names promoted to Error
    #[serde(default)]
    pub error_escalator: Vec<String>,

    /// Sniff unrecognized files for content matching other formats
    #[serde(default = "default_true")]
    pub misname_filter: bool,

    /// Write the non-compliance marker file when a directory fails
    #[serde(default = "default_true")]
    pub write_marker: bool,

    /// Prefix failed directory names so they stand out
    #[serde(default = "default_true")]
    pub mark_failed_directories: bool,

    /// Lowest severity included in reports
    #[serde(default = "default_report_threshold")]
    pub report_threshold: Severity,

    /// Optional log verification endpoint
    #[serde(default)]
    pub web_check_url: Option<String>,

    #[serde(default = "default_web_timeout")]
    pub web_check_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_report_threshold() -> Severity {
    Severity::Advisory
}

fn default_web_timeout() -> u64 {
    10
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            signer: None,
            naming: NamingStrategy::default(),
            digest_format: DigestFormat::default(),
            warn_escalator: Vec::new(),
            error_escalator: Vec::new(),
            misname_filter: true,
            write_marker: true,
            mark_failed_directories: true,
            report_threshold: default_report_threshold(),
            web_check_url: None,
            web_check_timeout_secs: default_web_timeout(),
        }
    }
}

impl ValidationConfig {
    /// Parsed (warn, error) escalator tag sets
    pub fn escalators(&self) -> Result<(IssueTags, IssueTags)> {
        Ok((
            IssueTags::parse_names(&self.warn_escalator)?,
            IssueTags::parse_names(&self.error_escalator)?,
        ))
    }
}

/// Resolve which config file to read, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("ripcheck").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load configuration, falling back to defaults when no file is found
///
/// An explicitly named file that is missing or malformed is an error; the
/// implicit platform file is only read when it exists.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        tracing::debug!("No config file found, using defaults");
        return Ok(TomlConfig::default());
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    // Surface unknown tag names at load time rather than mid-run
    config.validation.escalators()?;

    tracing::info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.validation.naming, NamingStrategy::ArtistTitle);
        assert_eq!(config.validation.digest_format, DigestFormat::Md5);
        assert!(config.validation.misname_filter);
        assert!(config.validation.signer.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[logging]
level = "debug"

[validation]
signer = "alice"
naming = "short-title"
digest_format = "sha256"
warn_escalator = ["name_change"]
error_escalator = ["strict_err", "prove_err"]
report_threshold = "WARNING"
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.validation.signer.as_deref(), Some("alice"));
        assert_eq!(config.validation.naming, NamingStrategy::ShortTitle);
        assert_eq!(config.validation.digest_format, DigestFormat::Sha256);
        assert_eq!(config.validation.report_threshold, Severity::Warning);

        let (warn, error) = config.validation.escalators().unwrap();
        assert_eq!(warn, IssueTags::NAME_CHANGE);
        assert_eq!(error, IssueTags::STRICT_ERR | IssueTags::PROVE_ERR);
    }

    #[test]
    fn test_unknown_tag_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[validation]\nerror_escalator = [\"bogus\"]").unwrap();
        assert!(matches!(load_config(Some(file.path())), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = load_config(Some(Path::new("/nonexistent/ripcheck.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_digest_format_extensions() {
        assert_eq!(DigestFormat::from_extension("SHA1"), Some(DigestFormat::Sha1));
        assert_eq!(DigestFormat::from_extension("crc"), None);
        assert_eq!("sha256".parse::<DigestFormat>().unwrap().hex_len(), 64);
    }
}
