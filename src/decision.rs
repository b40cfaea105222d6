//! Bug-existence decision fusion.
//!
//! Detector and reviewer each emit a verdict, sometimes as a bool, sometimes
//! as a number or a string. One normalization function coerces all of them;
//! the fusion itself is a plain OR — any affirmative signal is enough, and no
//! signal can override another to false.

use crate::report::{BugReport, SupervisorReview};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Normalize a heterogeneous truthy value.
///
/// Native booleans, non-zero numbers, and the strings "true"/"1"/"yes"/"y"
/// (case-insensitive, trimmed) are true; everything else is false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "y")
        }
        _ => false,
    }
}

/// Serde adapter applying `truthy` at every boolean boundary, so coercion is
/// identical regardless of which record or field the value arrived in.
pub fn de_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(truthy(&value))
}

/// `true` when any of the three signals is affirmative.
pub fn fuse(detector_has_bug: bool, confirmed_bug: bool, corrected_has_bug: bool) -> bool {
    detector_has_bug || confirmed_bug || corrected_has_bug
}

/// Fuse a report with its review.
pub fn bug_exists(report: &BugReport, review: &SupervisorReview) -> bool {
    fuse(
        report.has_bug,
        review.confirmed_bug,
        review.corrected_has_bug,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy_booleans() {
        assert!(truthy(&json!(true)));
        assert!(!truthy(&json!(false)));
    }

    #[test]
    fn test_truthy_numbers() {
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!(-3.5)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!(0.0)));
    }

    #[test]
    fn test_truthy_strings() {
        assert!(truthy(&json!("true")));
        assert!(truthy(&json!(" Yes ")));
        assert!(truthy(&json!("1")));
        assert!(truthy(&json!("y")));
        assert!(!truthy(&json!("no")));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!("certainly")));
    }

    #[test]
    fn test_truthy_other_types() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!([true])));
        assert!(!truthy(&json!({"v": true})));
    }

    #[test]
    fn test_fuse_is_pure_or() {
        assert!(!fuse(false, false, false));
        assert!(fuse(true, false, false));
        assert!(fuse(false, true, false));
        assert!(fuse(false, false, true));
        assert!(fuse(true, true, true));
    }
}
