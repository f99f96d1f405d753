//! Per-subject diagnostic collections
//!
//! An [`IssueVector`] is an append-only list of [`Issue`] records kept by every
//! parsed file and by every rip directory. Each issue carries a base severity and
//! a set of [`IssueTags`]; the vector owns two escalator tag sets that promote
//! matching issues to `Warning` or `Error` after the fact. The cached maximum is
//! recomputed on every add and every escalation, so escalation is retroactive.
//!
//! Repairs are described by [`RepairKind`] rather than stored callbacks. The
//! caller supplies the action when invoking [`IssueVector::repair`].

use crate::severity::Severity;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Category flags attached to issues; inputs to escalation only
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct IssueTags: u32 {
        /// Positive outcome worth reporting
        const SUCCESS = 1;
        /// Negative outcome
        const FAILURE = 1 << 1;
        /// A tracked file was renamed since signing
        const NAME_CHANGE = 1 << 2;
        /// A tracked file's tag bytes changed since signing
        const META_CHANGE = 1 << 3;
        /// An expected checksum is absent
        const MISSING_HASH = 1 << 4;
        /// Violates strict ripping rules
        const STRICT_ERR = 1 << 5;
        /// Prevents proving the rip
        const PROVE_ERR = 1 << 6;
        /// Malformed or inconsistent tag values
        const BAD_TAG = 1 << 7;
        /// ID3 tag where none belongs
        const HAS_ID3 = 1 << 8;
        /// Trailing bytes beyond the valid region
        const WATERMARK = 1 << 9;
        /// Declared extension does not match content
        const MISNAMED = 1 << 10;
    }
}

impl IssueTags {
    /// Parse a list of tag names such as `["strict_err", "PROVE_ERR"]`
    ///
    /// Unknown names are returned as an error so configuration typos surface.
    pub fn parse_names<S: AsRef<str>>(names: &[S]) -> crate::Result<IssueTags> {
        let mut tags = IssueTags::empty();
        for name in names {
            let upper = name.as_ref().trim().to_ascii_uppercase();
            let tag = IssueTags::from_name(&upper).ok_or_else(|| {
                crate::Error::Config(format!("Unknown issue tag: {}", name.as_ref()))
            })?;
            tags |= tag;
        }
        Ok(tags)
    }
}

/// A repair the pipeline knows how to perform on the issue's subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairKind {
    /// Truncate the file to its valid size
    TrimWatermark,
    /// Rename the file so its extension matches its content
    RenameToCanonicalExtension { extension: String },
    /// Remove a tag prefix of `length` bytes that holds no frames
    RemovePhantomTag { length: u64 },
    /// Rewrite an ID3v2 size field that is one byte short
    PatchTagSizeOffByOne { correct_size: u32 },
}

/// Outcome of a repair attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairOutcome {
    /// Issue carries no repair
    NotRepairable,
    /// Repair offered, not yet invoked
    Pending,
    /// Repair succeeded
    Repaired,
    /// Repair failed with the given reason
    Failed(String),
    /// Subsumed by a final repair on the same subject
    Moot,
}

/// One diagnostic record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    index: usize,
    message: String,
    base_severity: Severity,
    tags: IssueTags,
    repair_prompt: Option<String>,
    repair_kind: Option<RepairKind>,
    is_final_repairer: bool,
    repair_outcome: RepairOutcome,
}

impl Issue {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn base_severity(&self) -> Severity {
        self.base_severity
    }

    pub fn tags(&self) -> IssueTags {
        self.tags
    }

    pub fn repair_prompt(&self) -> Option<&str> {
        self.repair_prompt.as_deref()
    }

    pub fn repair_kind(&self) -> Option<&RepairKind> {
        self.repair_kind.as_ref()
    }

    pub fn is_final_repairer(&self) -> bool {
        self.is_final_repairer
    }

    pub fn repair_outcome(&self) -> &RepairOutcome {
        &self.repair_outcome
    }

    /// True while a repair is offered and has not been invoked or subsumed
    pub fn is_repairable(&self) -> bool {
        self.repair_outcome == RepairOutcome::Pending
    }

    /// Severity after applying the given escalators
    pub fn effective_severity(&self, warn_escalator: IssueTags, error_escalator: IssueTags) -> Severity {
        if self.base_severity < Severity::Error && self.tags.intersects(error_escalator) {
            Severity::Error
        } else if self.base_severity < Severity::Warning && self.tags.intersects(warn_escalator) {
            Severity::Warning
        } else {
            self.base_severity
        }
    }
}

/// Ordered, append-only issue collection with a cached maximum severity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueVector {
    items: Vec<Issue>,
    warn_escalator: IssueTags,
    error_escalator: IssueTags,
    max_severity: Severity,
    severest: Option<usize>,
    repairable_count: usize,
}

impl IssueVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a vector that escalates from the start
    pub fn with_escalators(warn_escalator: IssueTags, error_escalator: IssueTags) -> Self {
        Self {
            warn_escalator,
            error_escalator,
            ..Self::default()
        }
    }

    /// Append a non-repairable issue
    pub fn add(&mut self, message: impl Into<String>, severity: Severity, tags: IssueTags) -> &Issue {
        self.push(message.into(), severity, tags, None, None, false)
    }

    /// Append an issue that offers a repair
    ///
    /// The base severity is raised to at least `Warning`.
    pub fn add_repairable(
        &mut self,
        message: impl Into<String>,
        severity: Severity,
        tags: IssueTags,
        prompt: impl Into<String>,
        kind: RepairKind,
        is_final_repairer: bool,
    ) -> &Issue {
        self.push(
            message.into(),
            severity.max(Severity::Warning),
            tags,
            Some(prompt.into()),
            Some(kind),
            is_final_repairer,
        )
    }

    fn push(
        &mut self,
        message: String,
        base_severity: Severity,
        tags: IssueTags,
        repair_prompt: Option<String>,
        repair_kind: Option<RepairKind>,
        is_final_repairer: bool,
    ) -> &Issue {
        let index = self.items.len();
        let repair_outcome = if repair_kind.is_some() {
            self.repairable_count += 1;
            RepairOutcome::Pending
        } else {
            RepairOutcome::NotRepairable
        };

        let issue = Issue {
            index,
            message,
            base_severity,
            tags,
            repair_prompt,
            repair_kind,
            is_final_repairer,
            repair_outcome,
        };

        let effective = issue.effective_severity(self.warn_escalator, self.error_escalator);
        if self.severest.is_none() || effective > self.max_severity {
            self.max_severity = effective;
            self.severest = Some(index);
        }

        tracing::trace!(index, severity = %effective, message = %issue.message, "Issue added");
        self.items.push(issue);
        &self.items[index]
    }

    /// Merge tag sets into the escalators and recompute the maximum over all issues
    pub fn escalate(&mut self, warn_tags: IssueTags, error_tags: IssueTags) {
        self.warn_escalator |= warn_tags;
        self.error_escalator |= error_tags;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.max_severity = Severity::NoIssue;
        self.severest = None;
        for issue in &self.items {
            let effective = issue.effective_severity(self.warn_escalator, self.error_escalator);
            if self.severest.is_none() || effective > self.max_severity {
                self.max_severity = effective;
                self.severest = Some(issue.index);
            }
        }
    }

    /// Invoke the repair offered by the issue at `index`
    ///
    /// `action` receives the repair kind and whether this is the last repair
    /// outstanding on the subject; it returns `None` on success or a failure
    /// reason. Returns the failure reason, if any.
    pub fn repair<F>(&mut self, index: usize, action: F) -> Option<String>
    where
        F: FnOnce(&RepairKind, bool) -> Option<String>,
    {
        let Some(issue) = self.items.get(index) else {
            return Some(format!("No issue at index {}", index));
        };
        if !issue.is_repairable() {
            return Some(format!("Issue {} is not awaiting repair", index));
        }
        let Some(kind) = issue.repair_kind.clone() else {
            return Some(format!("Issue {} has no repair", index));
        };
        let is_final = issue.is_final_repairer;

        self.repairable_count = self.repairable_count.saturating_sub(1);
        let is_last = is_final || self.repairable_count == 0;

        let issue = &mut self.items[index];
        issue.base_severity = issue.base_severity.max(Severity::Warning);

        let failure = action(&kind, is_last);
        issue.repair_outcome = match &failure {
            None => RepairOutcome::Repaired,
            Some(reason) => RepairOutcome::Failed(reason.clone()),
        };

        if is_final {
            self.repairable_count = 0;
            for other in self.items.iter_mut() {
                if other.index != index && other.repair_outcome == RepairOutcome::Pending {
                    other.repair_outcome = RepairOutcome::Moot;
                }
            }
        }

        self.recompute();
        failure
    }

    pub fn items(&self) -> &[Issue] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&Issue> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_severity(&self) -> Severity {
        self.max_severity
    }

    /// First issue holding the maximum effective severity
    pub fn severest(&self) -> Option<&Issue> {
        self.severest.and_then(|i| self.items.get(i))
    }

    pub fn repairable_count(&self) -> usize {
        self.repairable_count
    }

    pub fn warn_escalator(&self) -> IssueTags {
        self.warn_escalator
    }

    pub fn error_escalator(&self) -> IssueTags {
        self.error_escalator
    }

    pub fn effective_severity(&self, issue: &Issue) -> Severity {
        issue.effective_severity(self.warn_escalator, self.error_escalator)
    }

    /// Indices of issues whose repair is still pending
    pub fn pending_repairs(&self) -> Vec<usize> {
        self.items
            .iter()
            .filter(|i| i.is_repairable())
            .map(|i| i.index)
            .collect()
    }

    pub fn has_fatal(&self) -> bool {
        self.max_severity >= Severity::Fatal
    }

    pub fn has_error(&self) -> bool {
        self.max_severity >= Severity::Error
    }

    /// True when any issue carries one of `tags`
    pub fn has_tag(&self, tags: IssueTags) -> bool {
        self.items.iter().any(|i| i.tags.intersects(tags))
    }

    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.items
            .iter()
            .filter(|i| self.effective_severity(i) >= severity)
            .count()
    }

    /// Prefixed report lines for issues at or above `threshold`
    pub fn report(&self, threshold: Severity) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|issue| {
                let severity = self.effective_severity(issue);
                (severity >= threshold && severity > Severity::NoIssue)
                    .then(|| format!("{} {}", severity.report_prefix(), issue.message))
            })
            .collect()
    }
}
