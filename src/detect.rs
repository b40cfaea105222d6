//! First-pass bug detection.
//!
//! Sends one file at a time to the detector model and always comes back with
//! a `BugReport` — on any failure the report is the conservative fallback
//! with the error and raw model text preserved for audit and recovery.

use crate::llm::{prompts, recover, LlmClient, Model};
use crate::report::BugReport;
use std::fs;
use std::path::Path;

/// Character budget for code sent to the detector.
const MAX_SCAN_CHARS: usize = 8000;
const TRUNCATION_MARKER: &str = "\n\n# [Truncated for analysis]\n";

/// Length of the excerpt attached to every report for the reviewer.
const EXCERPT_CHARS: usize = 1000;

pub struct DetectionAgent {
    model: Model,
}

impl DetectionAgent {
    pub fn new() -> Self {
        Self {
            model: Model::Detector,
        }
    }

    /// Analyze one file. Never fails: API and parse errors come back as a
    /// fallback report with `has_bug=false` and the failure recorded.
    pub async fn analyze_file(&self, client: &LlmClient, path: &Path) -> BugReport {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_path = path.display().to_string();

        let code = match fs::read_to_string(path) {
            Ok(code) => code,
            Err(e) => {
                let mut report = BugReport::fallback(&file_name, &file_path);
                report.error = Some(format!("Could not read file: {}", e));
                return report;
            }
        };

        let code_for_model = if code.chars().count() > MAX_SCAN_CHARS {
            let head: String = code.chars().take(MAX_SCAN_CHARS).collect();
            format!("{}{}", head, TRUNCATION_MARKER)
        } else {
            code.clone()
        };

        let excerpt: String = code.chars().take(EXCERPT_CHARS).collect();
        let prompt = prompts::detection_prompt(path, &code_for_model);

        let mut report = match client
            .chat(prompts::DETECTOR_SYSTEM, &prompt, self.model)
            .await
        {
            Ok(text) => match recover::<BugReport>(&text) {
                Ok(report) => report,
                Err(failure) => {
                    let mut report = BugReport::fallback(&file_name, &file_path);
                    report.error = Some(format!(
                        "Could not parse JSON from model: {}",
                        failure.reason
                    ));
                    report.raw_response_text = Some(failure.raw);
                    report
                }
            },
            Err(e) => {
                let mut report = BugReport::fallback(&file_name, &file_path);
                report.error = Some(format!("API call failed: {}", e));
                report
            }
        };

        // Normalize the shape regardless of what the model returned.
        if report.file.is_empty() {
            report.file = file_name;
        }
        if report.file_path.is_empty() {
            report.file_path = file_path;
        }
        if report.code_excerpt.is_none() {
            report.code_excerpt = Some(excerpt);
        }

        report
    }
}

impl Default for DetectionAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// Second-chance recovery for a report whose first parse failed.
///
/// When the report carries both an error and the raw model text, run the
/// recoverer over the raw text again; if that succeeds, the recovered report
/// replaces the failed one. The original code excerpt is carried forward when
/// the recovered record lacks one — an excerpt is never manufactured.
pub fn second_chance(report: &BugReport) -> BugReport {
    let (Some(_), Some(raw)) = (&report.error, &report.raw_response_text) else {
        return report.clone();
    };

    match recover::<BugReport>(raw) {
        Ok(mut recovered) => {
            if recovered.code_excerpt.is_none() {
                recovered.code_excerpt = report.code_excerpt.clone();
            }
            recovered
        }
        Err(_) => report.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_chance_recovers_from_raw_text() {
        let mut failed = BugReport::fallback("a.py", "src/a.py");
        failed.error = Some("Could not parse JSON from model: trailing prose".into());
        failed.raw_response_text =
            Some("Here you go:\n```json\n{\"file\":\"a.py\",\"has_bug\":true}\n```".into());
        failed.code_excerpt = Some("def f(): pass".into());

        let recovered = second_chance(&failed);
        assert!(recovered.has_bug);
        assert!(recovered.error.is_none());
        // excerpt carried forward, not manufactured
        assert_eq!(recovered.code_excerpt.as_deref(), Some("def f(): pass"));
    }

    #[test]
    fn test_second_chance_keeps_recovered_excerpt() {
        let mut failed = BugReport::fallback("a.py", "src/a.py");
        failed.error = Some("parse failed".into());
        failed.raw_response_text =
            Some(r#"{"file":"a.py","has_bug":true,"code_excerpt":"original slice"}"#.into());
        failed.code_excerpt = Some("detector slice".into());

        let recovered = second_chance(&failed);
        assert_eq!(recovered.code_excerpt.as_deref(), Some("original slice"));
    }

    #[test]
    fn test_second_chance_noop_without_error() {
        let report = BugReport::fallback("a.py", "src/a.py");
        let out = second_chance(&report);
        assert!(!out.has_bug);
        assert!(out.error.is_none());
    }

    #[test]
    fn test_second_chance_keeps_failed_report_when_unrecoverable() {
        let mut failed = BugReport::fallback("a.py", "src/a.py");
        failed.error = Some("parse failed".into());
        failed.raw_response_text = Some("still not json".into());

        let out = second_chance(&failed);
        assert!(out.error.is_some());
        assert_eq!(out.raw_response_text.as_deref(), Some("still not json"));
    }
}
