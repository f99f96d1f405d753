//! Repair dispatch
//!
//! Maps an issue's [`RepairKind`] onto the file primitives of
//! [`FormatInstance`] and walks the pending repairs of one file, asking the
//! prompter before each.

use crate::formats::mp3::{encode_syncsafe, ID3V2_SIZE_OFFSET};
use crate::formats::FormatInstance;
use crate::services::prompter::Prompter;
use ripcheck_common::RepairKind;

/// Perform one repair; `None` on success, else the failure reason
///
/// The handle is released after the last outstanding repair on the file.
pub fn apply_repair(instance: &mut FormatInstance, kind: &RepairKind, is_last: bool) -> Option<String> {
    let result = match kind {
        RepairKind::TrimWatermark => instance.trim_to_valid_size(),
        RepairKind::RenameToCanonicalExtension { extension } => instance.rename_extension(extension),
        RepairKind::RemovePhantomTag { length } => instance.remove_leading(*length),
        RepairKind::PatchTagSizeOffByOne { correct_size } => {
            instance.patch_bytes(ID3V2_SIZE_OFFSET, &encode_syncsafe(*correct_size))
        }
    };
    if is_last {
        instance.close();
    }
    match result {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(file = %instance.path.display(), repair = ?kind, error = %e, "Repair failed");
            Some(e.to_string())
        }
    }
}

/// Offer every pending repair on `instance`; returns the number performed
pub fn offer_repairs(instance: &mut FormatInstance, prompter: &mut dyn Prompter) -> usize {
    let mut repaired = 0;
    for index in instance.issues.pending_repairs() {
        // A final repair earlier in the loop may have made this one moot
        let Some(prompt) = instance
            .issues
            .get(index)
            .filter(|issue| issue.is_repairable())
            .and_then(|issue| issue.repair_prompt())
            .map(str::to_string)
        else {
            continue;
        };
        if !prompter.confirm(&prompt) {
            continue;
        }

        let mut issues = std::mem::take(&mut instance.issues);
        let failure = issues.repair(index, |kind, is_last| apply_repair(instance, kind, is_last));
        instance.issues = issues;
        if failure.is_none() {
            repaired += 1;
        }
    }
    instance.close();
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::FormatRegistry;
    use crate::services::prompter::ScriptedPrompter;
    use ripcheck_common::{Hashes, RepairOutcome, Severity};

    fn png_with_trailer(trailer: &[u8]) -> Vec<u8> {
        let mut b = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        b.extend_from_slice(&[0, 0, 0, 0]);
        b.extend_from_slice(b"IEND");
        b.extend_from_slice(&[0xAE, 0x42, 0x60, 0x82]);
        b.extend_from_slice(trailer);
        b
    }

    #[test]
    fn test_trim_watermark_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        std::fs::write(&path, png_with_trailer(b"ripped by someone")).unwrap();

        let mut registry = FormatRegistry::standard();
        let mut instance = registry.create_model(&path, Hashes::empty(), true).unwrap();
        let mut prompter = ScriptedPrompter::new(["y"]);

        assert_eq!(offer_repairs(&mut instance, &mut prompter), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 20);
        assert_eq!(instance.issues.items()[0].repair_outcome(), &RepairOutcome::Repaired);
        assert_eq!(instance.issues.repairable_count(), 0);
        assert!(!instance.is_open());
    }

    #[test]
    fn test_declined_repair_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        std::fs::write(&path, png_with_trailer(b"junk")).unwrap();

        let mut registry = FormatRegistry::standard();
        let mut instance = registry.create_model(&path, Hashes::empty(), true).unwrap();
        let mut prompter = ScriptedPrompter::new(["n"]);

        assert_eq!(offer_repairs(&mut instance, &mut prompter), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 24);
        assert_eq!(instance.issues.items()[0].repair_outcome(), &RepairOutcome::Pending);
    }

    #[test]
    fn test_misnamed_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.jpg");
        std::fs::write(&path, png_with_trailer(b"")).unwrap();

        let mut registry = FormatRegistry::standard();
        let mut instance = registry.create_model(&path, Hashes::FILE_MD5, true).unwrap();
        let md5 = instance.hashes.file_md5.clone();
        let mut prompter = ScriptedPrompter::new(["yes"]);

        assert_eq!(offer_repairs(&mut instance, &mut prompter), 1);
        assert!(dir.path().join("cover.png").exists());
        assert!(!path.exists());
        assert_eq!(instance.name, "cover.png");
        // Content is unchanged, so cached digests are kept
        assert_eq!(instance.hashes.file_md5, md5);
        assert_eq!(instance.issues.max_severity(), Severity::Warning);
    }

    #[test]
    fn test_failed_rename_reports_reason() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.jpg");
        std::fs::write(&path, png_with_trailer(b"")).unwrap();
        std::fs::write(dir.path().join("cover.png"), b"taken").unwrap();

        let mut registry = FormatRegistry::standard();
        let mut instance = registry.create_model(&path, Hashes::empty(), true).unwrap();
        let mut prompter = ScriptedPrompter::new(["y"]);

        assert_eq!(offer_repairs(&mut instance, &mut prompter), 0);
        assert!(matches!(instance.issues.items()[0].repair_outcome(), RepairOutcome::Failed(_)));
        assert!(path.exists());
    }
}
