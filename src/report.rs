//! Typed records for the service boundaries.
//!
//! Each external service returns a free-form dictionary; these are the closed
//! record types they map onto. Unknown fields are ignored, never trusted, and
//! every optional field is explicit.

use crate::decision::de_truthy;
use serde::{Deserialize, Serialize};

/// One concrete finding inside a bug report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BugDetail {
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub explanation: String,
}

/// Detector verdict for one scanned file.
///
/// Always produced, even when the upstream call failed; `error` plus
/// `raw_response_text` mark a report that may be replaced later by a
/// second-chance recovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BugReport {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default, deserialize_with = "de_truthy")]
    pub has_bug: bool,
    #[serde(default)]
    pub bug_summary: String,
    #[serde(default)]
    pub bug_details: Vec<BugDetail>,
    /// First slice of the scanned source, carried along for the reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response_text: Option<String>,
}

impl BugReport {
    /// The conservative report used when the detector call or parse fails.
    pub fn fallback(file: &str, file_path: &str) -> Self {
        Self {
            file: file.to_string(),
            file_path: file_path.to_string(),
            has_bug: false,
            ..Default::default()
        }
    }
}

/// Independent review of a `BugReport`; always produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorReview {
    #[serde(default, deserialize_with = "de_truthy")]
    pub confirmed_bug: bool,
    #[serde(default, deserialize_with = "de_truthy")]
    pub corrected_has_bug: bool,
    #[serde(default)]
    pub corrected_bug_summary: String,
    #[serde(default)]
    pub corrected_bug_details: Vec<BugDetail>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl SupervisorReview {
    /// Conservative verdict used on review failure: nothing confirmed, the
    /// detector's own findings carried through unchanged.
    pub fn fallback(report: &BugReport, note: String) -> Self {
        Self {
            confirmed_bug: false,
            corrected_has_bug: report.has_bug,
            corrected_bug_summary: report.bug_summary.clone(),
            corrected_bug_details: report.bug_details.clone(),
            notes: vec![
                "fallback supervisor response (parse failure or API failure)".to_string(),
                note,
            ],
        }
    }
}

/// Fix-service response. Only `fixed_code` is authoritative for mutation;
/// the diff is best-effort context for human review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixPlan {
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub patch_unified_diff: String,
    #[serde(default)]
    pub fixed_code: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bug_report_ignores_unknown_fields() {
        let json = r#"{"file":"a.py","has_bug":true,"totally_new_field":42}"#;
        let report: BugReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.file, "a.py");
        assert!(report.has_bug);
    }

    #[test]
    fn test_bug_report_truthy_string_has_bug() {
        let json = r#"{"file":"a.py","has_bug":"yes"}"#;
        let report: BugReport = serde_json::from_str(json).unwrap();
        assert!(report.has_bug);
    }

    #[test]
    fn test_bug_report_missing_fields_default() {
        let report: BugReport = serde_json::from_str("{}").unwrap();
        assert!(!report.has_bug);
        assert!(report.bug_details.is_empty());
        assert!(report.code_excerpt.is_none());
    }

    #[test]
    fn test_supervisor_fallback_preserves_detector_verdict() {
        let mut report = BugReport::fallback("a.py", "src/a.py");
        report.has_bug = true;
        report.bug_summary = "bad loop".into();
        let review = SupervisorReview::fallback(&report, "Supervisor error: boom".into());
        assert!(!review.confirmed_bug);
        assert!(review.corrected_has_bug);
        assert_eq!(review.corrected_bug_summary, "bad loop");
        assert_eq!(review.notes.len(), 2);
    }

    #[test]
    fn test_fix_plan_defaults() {
        let plan: FixPlan = serde_json::from_str(r#"{"fixed_code":"x = 1"}"#).unwrap();
        assert_eq!(plan.fixed_code, "x = 1");
        assert_eq!(plan.confidence, 0.0);
        assert!(plan.notes.is_empty());
    }
}
