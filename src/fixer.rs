//! Fix generation and hash-verified application.
//!
//! The applicator never mutates on uncertain input: upstream failures
//! short-circuit before any file I/O, the backup is written before the file
//! is touched, and a write that does not take effect on disk is rolled back.

use crate::llm::{prompts, recover, strip_code_fences, LlmClient, Model};
use crate::report::{BugReport, FixPlan};
use crate::util::fingerprint_str;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to the original path for the pre-write backup.
const BACKUP_SUFFIX: &str = ".bak";

/// Outcome of one fix attempt. Exactly one per file per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FixOutcome {
    /// Fix written and verified on disk.
    Patched {
        file_path: String,
        backup_path: String,
        before_hash: String,
        after_hash: String,
    },
    /// Proposed body is byte-identical to the original; nothing written.
    NoChange { file_path: String, reason: String },
    /// The write did not take effect; original restored from backup.
    WriteFailed {
        file_path: String,
        backup_path: String,
        reason: String,
    },
    /// Fix not attempted (gate disabled, no bug, or missing file).
    Skipped { reason: String },
    /// Model text could not be recovered into a fix plan, or the plan had no code.
    ParseError {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_response_text: Option<String>,
    },
    /// The upstream call itself failed.
    ApiError { reason: String },
    /// Fingerprints computed, nothing written.
    DryRun {
        file_path: String,
        before_hash: String,
        after_hash: String,
    },
}

impl FixOutcome {
    /// Only a verified write counts toward publish eligibility.
    pub fn is_patched(&self) -> bool {
        matches!(self, FixOutcome::Patched { .. })
    }
}

/// Apply a proposed replacement body to `path`, with backup and verification.
///
/// Fence-stripping has already happened by the time this runs; `proposed`
/// is taken literally. This is the only function in the crate that writes to
/// a scanned file.
pub fn apply_fix(path: &Path, proposed: &str, dry_run: bool) -> FixOutcome {
    let file_path = path.display().to_string();

    if proposed.trim().is_empty() {
        return FixOutcome::ParseError {
            reason: "no fixed code produced".to_string(),
            raw_response_text: None,
        };
    }

    let original = match fs::read_to_string(path) {
        Ok(original) => original,
        Err(e) => {
            return FixOutcome::Skipped {
                reason: format!("file does not exist or is unreadable: {}: {}", file_path, e),
            }
        }
    };

    let before_hash = fingerprint_str(&original);
    let proposed_hash = fingerprint_str(proposed);

    if proposed_hash == before_hash {
        return FixOutcome::NoChange {
            file_path,
            reason: "model returned identical file content".to_string(),
        };
    }

    if dry_run {
        return FixOutcome::DryRun {
            file_path,
            before_hash,
            after_hash: proposed_hash,
        };
    }

    // Backup must exist before the original is touched, so an interrupted
    // write is always recoverable.
    let backup = backup_path(path);
    if let Err(e) = fs::copy(path, &backup) {
        return FixOutcome::WriteFailed {
            file_path,
            backup_path: backup.display().to_string(),
            reason: format!("could not create backup before writing: {}", e),
        };
    }

    if let Err(e) = fs::write(path, proposed) {
        let _ = fs::copy(&backup, path);
        return FixOutcome::WriteFailed {
            file_path,
            backup_path: backup.display().to_string(),
            reason: format!("write failed; restored from backup: {}", e),
        };
    }

    // Re-read and verify the write actually took effect.
    let after_hash = match verify_on_disk(path, &before_hash) {
        Ok(after_hash) => after_hash,
        Err(reason) => {
            let _ = fs::copy(&backup, path);
            return FixOutcome::WriteFailed {
                file_path,
                backup_path: backup.display().to_string(),
                reason,
            };
        }
    };

    FixOutcome::Patched {
        file_path,
        backup_path: backup.display().to_string(),
        before_hash,
        after_hash,
    }
}

/// Confirm a write took effect by re-reading and re-hashing the file.
///
/// An unreadable file is a verification failure, not a pass: without the
/// re-read there is no evidence the new content is on disk.
fn verify_on_disk(path: &Path, before_hash: &str) -> Result<String, String> {
    let on_disk = fs::read_to_string(path)
        .map_err(|e| format!("could not re-read file after write; rolled back: {}", e))?;
    let after_hash = fingerprint_str(&on_disk);
    if after_hash == before_hash {
        return Err("file did not change after write; rolled back".to_string());
    }
    Ok(after_hash)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

pub struct FixAgent {
    model: Model,
}

impl FixAgent {
    pub fn new() -> Self {
        Self { model: Model::Fixer }
    }

    /// Generate and apply a fix for a reviewed bug report.
    pub async fn fix(&self, client: &LlmClient, report: &BugReport, dry_run: bool) -> FixOutcome {
        if report.file_path.is_empty() {
            return FixOutcome::Skipped {
                reason: "bug report missing file_path".to_string(),
            };
        }

        let path = Path::new(&report.file_path);
        let original = match fs::read_to_string(path) {
            Ok(original) => original,
            Err(_) => {
                return FixOutcome::Skipped {
                    reason: format!("file_path does not exist: {}", report.file_path),
                }
            }
        };

        if !report.has_bug {
            return FixOutcome::Skipped {
                reason: "has_bug=false in bug report".to_string(),
            };
        }

        let prompt = prompts::fix_prompt(report, &original);
        let text = match client.chat(prompts::FIXER_SYSTEM, &prompt, self.model).await {
            Ok(text) => text,
            Err(e) => {
                return FixOutcome::ApiError {
                    reason: format!("API call failed: {}", e),
                }
            }
        };

        let plan = match recover::<FixPlan>(&text) {
            Ok(plan) => plan,
            Err(failure) => {
                return FixOutcome::ParseError {
                    reason: format!("could not parse JSON from model: {}", failure.reason),
                    raw_response_text: Some(failure.raw),
                }
            }
        };

        let fixed_code = strip_code_fences(&plan.fixed_code).to_string();
        apply_fix(path, &fixed_code, dry_run)
    }
}

impl Default for FixAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_target(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_empty_body_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_target(&tmp, "a.py", "x = 1\n");
        let outcome = apply_fix(&path, "  \n ", false);
        match outcome {
            FixOutcome::ParseError { reason, .. } => {
                assert_eq!(reason, "no fixed code produced")
            }
            other => panic!("expected ParseError, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1\n");
    }

    #[test]
    fn test_identical_body_is_no_change_and_no_write() {
        let tmp = TempDir::new().unwrap();
        let path = write_target(&tmp, "a.py", "x = 1\n");
        let outcome = apply_fix(&path, "x = 1\n", false);
        assert!(matches!(outcome, FixOutcome::NoChange { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1\n");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_patched_writes_backup_and_new_content() {
        let tmp = TempDir::new().unwrap();
        let path = write_target(&tmp, "a.py", "x = 1\n");
        let outcome = apply_fix(&path, "x = 2\n", false);
        match outcome {
            FixOutcome::Patched {
                before_hash,
                after_hash,
                backup_path: backup,
                ..
            } => {
                assert_ne!(before_hash, after_hash);
                assert_eq!(fs::read_to_string(&path).unwrap(), "x = 2\n");
                assert_eq!(fs::read_to_string(backup).unwrap(), "x = 1\n");
            }
            other => panic!("expected Patched, got {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_fingerprints_only() {
        let tmp = TempDir::new().unwrap();
        let path = write_target(&tmp, "a.py", "x = 1\n");
        let outcome = apply_fix(&path, "x = 2\n", true);
        match outcome {
            FixOutcome::DryRun {
                before_hash,
                after_hash,
                ..
            } => assert_ne!(before_hash, after_hash),
            other => panic!("expected DryRun, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1\n");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_verification_rejects_unreadable_file() {
        let tmp = TempDir::new().unwrap();
        // A directory can't be read back as a file.
        let err = verify_on_disk(tmp.path(), "aa").unwrap_err();
        assert!(err.contains("could not re-read file after write"));
    }

    #[test]
    fn test_verification_rejects_unchanged_content() {
        let tmp = TempDir::new().unwrap();
        let path = write_target(&tmp, "a.py", "x = 1\n");
        let hash = fingerprint_str("x = 1\n");
        let err = verify_on_disk(&path, &hash).unwrap_err();
        assert!(err.contains("did not change"));
    }

    #[test]
    fn test_verification_returns_new_hash_on_change() {
        let tmp = TempDir::new().unwrap();
        let path = write_target(&tmp, "a.py", "x = 2\n");
        let after = verify_on_disk(&path, &fingerprint_str("x = 1\n")).unwrap();
        assert_eq!(after, fingerprint_str("x = 2\n"));
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.py");
        let outcome = apply_fix(&path, "x = 2\n", false);
        assert!(matches!(outcome, FixOutcome::Skipped { .. }));
    }

    /// Whether read-only modes actually block writes here; they do not for
    /// uid 0, which bypasses permission checks.
    #[cfg(unix)]
    fn readonly_enforced(dir: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        let check = dir.join("mode_check");
        fs::write(&check, "x").unwrap();
        fs::set_permissions(&check, fs::Permissions::from_mode(0o444)).unwrap();
        fs::write(&check, "y").is_err()
    }

    #[cfg(unix)]
    #[test]
    fn test_readonly_target_rolls_back() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        if !readonly_enforced(tmp.path()) {
            return;
        }
        let path = write_target(&tmp, "a.py", "x = 1\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();

        let outcome = apply_fix(&path, "x = 2\n", false);
        assert!(matches!(outcome, FixOutcome::WriteFailed { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1\n");

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = FixOutcome::Skipped {
            reason: "no bug".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "no bug");

        let patched = FixOutcome::Patched {
            file_path: "a.py".into(),
            backup_path: "a.py.bak".into(),
            before_hash: "aa".into(),
            after_hash: "bb".into(),
        };
        let json = serde_json::to_value(&patched).unwrap();
        assert_eq!(json["status"], "patched");
        assert!(patched.is_patched());
    }
}
