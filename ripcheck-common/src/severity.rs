//! Issue severity ranks
//!
//! Ranks are totally ordered and double as report verbosity thresholds:
//! a report at threshold `Warning` shows everything ranked `Warning` or above.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a diagnostic, from harmless to abort-the-file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Nothing to report
    NoIssue,
    /// Diagnostic chatter, shown only at the most verbose threshold
    Noise,
    /// Informational
    Trivia,
    /// Recommended but harmless
    Advisory,
    /// Recommended; escalatable to `Error` by tag
    Warning,
    /// Halts destructive actions for the current directory
    Error,
    /// Halts parsing of the current file or stage immediately
    Fatal,
}

impl Severity {
    /// All ranks in ascending order
    pub const ALL: [Severity; 7] = [
        Severity::NoIssue,
        Severity::Noise,
        Severity::Trivia,
        Severity::Advisory,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::NoIssue => "NoIssue",
            Severity::Noise => "Noise",
            Severity::Trivia => "Trivia",
            Severity::Advisory => "Advisory",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Fatal => "Fatal",
        }
    }

    /// Single-character prefix used in itemized reports
    pub fn report_prefix(&self) -> char {
        match self {
            Severity::NoIssue | Severity::Noise => ' ',
            Severity::Trivia => '.',
            Severity::Advisory => '~',
            Severity::Warning => '-',
            Severity::Error => '*',
            Severity::Fatal => '!',
        }
    }

    /// True for `Error` and `Fatal`
    pub fn is_failure(&self) -> bool {
        *self >= Severity::Error
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::NoIssue
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .iter()
            .copied()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown severity: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for pair in Severity::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should rank below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!(" FATAL ".parse::<Severity>().unwrap(), Severity::Fatal);
        assert!("severe".parse::<Severity>().is_err());
    }

    #[test]
    fn test_failure_threshold() {
        assert!(!Severity::Warning.is_failure());
        assert!(Severity::Error.is_failure());
        assert!(Severity::Fatal.is_failure());
    }
}
