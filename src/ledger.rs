//! Append-ordered audit ledger.
//!
//! One entry per scanned file, accumulating phase results as the run
//! progresses. The whole ledger is rewritten to disk after every phase so a
//! crash mid-run still leaves a readable record of everything completed.

use crate::fixer::FixOutcome;
use crate::report::{BugReport, SupervisorReview};
use crate::testeval::TestEvaluation;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One scanned file's full record across all pipeline phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEntry {
    pub bug_report: BugReport,
    pub supervisor_review: SupervisorReview,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_result: Option<FixOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_test_evaluation: Option<TestEvaluation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub target_dir: String,
    pub entries: Vec<PipelineEntry>,
    #[serde(skip)]
    path: PathBuf,
}

impl Ledger {
    pub fn new(target_dir: &Path, path: &Path) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            target_dir: target_dir.display().to_string(),
            entries: Vec::new(),
            path: path.to_path_buf(),
        }
    }

    pub fn push(&mut self, entry: PipelineEntry) {
        self.entries.push(entry);
    }

    /// Rewrite the full ledger to its path as pretty-printed JSON.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&self.path, json)
            .with_context(|| format!("could not write ledger to {}", self.path.display()))?;
        Ok(())
    }
}
