//! Structured-response recovery
//!
//! Every stage of the pipeline asks the model for strict JSON and gets back
//! whatever the model felt like writing: fenced JSON, JSON wrapped in prose,
//! or garbage. This module is the single place that digs the record out.

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Recovery could not produce a structured record from the model text.
///
/// Carries the full raw text so the failure stays auditable in the ledger
/// and a later stage can attempt a second-chance recovery.
#[derive(Debug, Clone, Error)]
#[error("could not parse JSON from model: {reason}")]
pub struct RecoveryFailure {
    pub reason: String,
    pub raw: String,
}

/// Strip a leading ``` fence line and a trailing ``` line, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    // Drop the opening fence line (possibly tagged, e.g. ```json or ```python)
    let body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return "",
    };

    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim()
}

/// Locate the JSON candidate inside free-form model text.
///
/// After fence stripping, slices from the first `{` to the last `}` when both
/// exist in order; otherwise the trimmed text is used as-is.
pub fn extract_json(text: &str) -> &str {
    let clean = strip_code_fences(text);

    let start = clean.find('{');
    let end = clean.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => &clean[s..=e],
        _ => clean,
    }
}

/// Recover a structured record from arbitrary model text.
///
/// Used identically for detector, supervisor, and fixer payloads; there is no
/// payload-specific parsing anywhere else.
pub fn recover<T: DeserializeOwned>(text: &str) -> Result<T, RecoveryFailure> {
    let candidate = extract_json(text);
    serde_json::from_str(candidate).map_err(|e| RecoveryFailure {
        reason: e.to_string(),
        raw: text.to_string(),
    })
}
