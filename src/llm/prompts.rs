//! Instruction schemas for the three service boundaries.
//!
//! Each stage asks for strict JSON with an explicit schema; the recoverer
//! deals with whatever actually comes back.

use crate::report::BugReport;
use std::path::Path;

pub const DETECTOR_SYSTEM: &str = "You are a software analysis agent. \
Your job is to read the given source code and identify concrete bugs \
(logic errors, off-by-one mistakes, unhandled edge cases, etc.). \
Ignore formatting and style. Respond strictly in JSON.";

pub const SUPERVISOR_SYSTEM: &str = "You are a senior code review supervisor. \
Verify whether the AI bug report is correct. \
Respond STRICTLY as JSON (no markdown).";

pub const FIXER_SYSTEM: &str = "You are an automated program repair agent for Python. \
Given a Python file and a bug report, produce a minimal correct fix. \
Return STRICT JSON only (no markdown).";

/// Build the detection prompt for one source file.
///
/// `code` is expected to already be truncated to the character budget.
pub fn detection_prompt(path: &Path, code: &str) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    format!(
        "You are given the following source code:\n\n\
         ```text\n{code}\n```\n\n\
         Return JSON in the following schema:\n\
         {{\n\
         \x20 \"file\": \"{file_name}\",\n\
         \x20 \"file_path\": \"{path}\",\n\
         \x20 \"has_bug\": true or false,\n\
         \x20 \"bug_summary\": \"short description or empty string if no bugs\",\n\
         \x20 \"bug_details\": [\n\
         \x20   {{\n\
         \x20     \"line\": number or null,\n\
         \x20     \"explanation\": \"what the bug is and why it is a bug\"\n\
         \x20   }}\n\
         \x20 ]\n\
         }}\n",
        code = code,
        file_name = file_name,
        path = path.display(),
    )
}

/// Build the supervision prompt: the detector's report plus the code excerpt.
pub fn supervision_prompt(report: &BugReport) -> String {
    let report_json = serde_json::json!({
        "has_bug": report.has_bug,
        "bug_summary": report.bug_summary,
        "bug_details": report.bug_details,
    });

    format!(
        "Review the bug report for correctness.\n\n\
         File: {file}\n\
         Path: {path}\n\n\
         === CODE EXCERPT ===\n\
         {excerpt}\n\n\
         === BUG REPORT ===\n\
         {report}\n\n\
         Return JSON schema:\n\
         {{\n\
         \x20 \"confirmed_bug\": true/false,\n\
         \x20 \"corrected_has_bug\": true/false,\n\
         \x20 \"corrected_bug_summary\": \"string\",\n\
         \x20 \"corrected_bug_details\": [{{\"line\": number|null, \"explanation\": \"string\"}}],\n\
         \x20 \"notes\": [\"string\"]\n\
         }}\n",
        file = report.file,
        path = report.file_path,
        excerpt = report.code_excerpt.as_deref().unwrap_or(""),
        report = serde_json::to_string_pretty(&report_json).unwrap_or_default(),
    )
}

/// Build the fix prompt: the full bug report plus the full original file.
pub fn fix_prompt(report: &BugReport, original_code: &str) -> String {
    format!(
        "Return JSON with this schema:\n\
         {{\n\
         \x20 \"file_path\": \"<same file_path>\",\n\
         \x20 \"summary\": \"what you changed\",\n\
         \x20 \"confidence\": 0.0-1.0,\n\
         \x20 \"patch_unified_diff\": \"a unified diff string (best-effort)\",\n\
         \x20 \"fixed_code\": \"the FULL updated Python file content\",\n\
         \x20 \"notes\": [\"caveats\"]\n\
         }}\n\n\
         Rules:\n\
         - fixed_code MUST be the full file, not a snippet.\n\
         - Keep changes minimal.\n\n\
         === BUG REPORT ===\n\
         {report}\n\n\
         === ORIGINAL FILE CONTENT ===\n\
         ```text\n{code}\n```\n",
        report = serde_json::to_string_pretty(report).unwrap_or_default(),
        code = original_code,
    )
}
