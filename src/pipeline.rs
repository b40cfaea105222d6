//! End-to-end repair pipeline.
//!
//! Three strictly ordered phases over a directory of Python files:
//! detection+review, fix+test, publish. The ledger is rewritten after each
//! phase, so an interrupted run still leaves an auditable record.

use crate::config::Config;
use crate::decision::bug_exists;
use crate::detect::{second_chance, DetectionAgent};
use crate::fixer::{FixAgent, FixOutcome};
use crate::ledger::{Ledger, PipelineEntry};
use crate::llm::LlmClient;
use crate::publish::{GitPublisher, PublishResult};
use crate::report::BugReport;
use crate::review::SupervisorAgent;
use crate::testeval::TestEvaluator;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

const COMMIT_MESSAGE: &str = "masque: automated fix (tests passed)";

pub struct PipelineOptions {
    pub target_dir: PathBuf,
    pub tests_dir: String,
    pub ledger_path: PathBuf,
    pub apply_fixes: bool,
    pub push: bool,
    pub dry_run: bool,
    pub test_timeout: Duration,
    pub python: String,
}

/// Counters surfaced at the end of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub files_scanned: usize,
    pub bugs_found: usize,
    pub fixes_applied: usize,
    pub tests_passed: usize,
    pub publish: Option<PublishResult>,
}

pub struct Pipeline {
    options: PipelineOptions,
    client: LlmClient,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Result<Self> {
        let config = Config::load();
        let api_key = config.get_api_key().context(
            "No OpenRouter API key found. Set OPENROUTER_API_KEY or add it to the config file.",
        )?;
        Ok(Self {
            options,
            client: LlmClient::new(api_key),
        })
    }

    /// The repository the target directory lives in. Tests, PYTHONPATH, and
    /// git all resolve relative to it, and the subprocesses run with it as
    /// their working directory, so it has to be absolute: scanned paths are
    /// relative to the process cwd, not to the root.
    fn repo_root(&self) -> PathBuf {
        let parent = self
            .options
            .target_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        parent.canonicalize().unwrap_or(parent)
    }

    pub async fn run(&self) -> Result<RunReport> {
        let target = &self.options.target_dir;
        if !target.is_dir() {
            bail!("target directory does not exist: {}", target.display());
        }
        let tests_root = self.repo_root().join(&self.options.tests_dir);
        if !tests_root.is_dir() {
            bail!(
                "tests directory does not exist: {}",
                tests_root.display()
            );
        }
        ensure_package_marker(&tests_root)?;

        let files = scan_python_files(target);
        if files.is_empty() {
            bail!("no Python files found in {}", target.display());
        }

        let mut ledger = Ledger::new(target, &self.options.ledger_path);
        let mut report = RunReport {
            files_scanned: files.len(),
            ..Default::default()
        };

        // Phase 1: detection and review.
        let detector = DetectionAgent::new();
        let supervisor = SupervisorAgent::new();
        for (i, file) in files.iter().enumerate() {
            eprintln!(
                "[{}/{}] Scanning {}...",
                i + 1,
                files.len(),
                file.display()
            );
            let first = detector.analyze_file(&self.client, file).await;
            let bug_report = second_chance(&first);
            let supervisor_review = supervisor.review(&self.client, &bug_report).await;
            ledger.push(PipelineEntry {
                bug_report,
                supervisor_review,
                fix_result: None,
                unit_test_evaluation: None,
            });
        }
        ledger.save()?;

        // Phase 2: fix and test. Tests run for every file, fixed or not.
        let fixer = FixAgent::new();
        let evaluator = TestEvaluator::new(
            &self.repo_root(),
            &self.options.tests_dir,
            self.options.test_timeout,
            &self.options.python,
        );
        for entry in ledger.entries.iter_mut() {
            let has_bug = bug_exists(&entry.bug_report, &entry.supervisor_review);
            if has_bug {
                report.bugs_found += 1;
            }

            let outcome = match fix_pregate(self.options.apply_fixes, has_bug, &entry.bug_report) {
                Some(outcome) => outcome,
                None => {
                    eprintln!("Fixing {}...", entry.bug_report.file_path);
                    fixer
                        .fix(&self.client, &entry.bug_report, self.options.dry_run)
                        .await
                }
            };
            if outcome.is_patched() {
                report.fixes_applied += 1;
            }
            entry.fix_result = Some(outcome);

            eprintln!("Testing {}...", entry.bug_report.file_path);
            let evaluation = evaluator.evaluate(Path::new(&entry.bug_report.file_path));
            if evaluation.passed {
                report.tests_passed += 1;
            }
            entry.unit_test_evaluation = Some(evaluation);
        }
        ledger.save()?;

        // Phase 3: publish files whose fix was written and whose test passed.
        let eligible = eligible_files(&ledger.entries);
        if eligible.is_empty() {
            eprintln!("Nothing eligible to publish.");
        } else {
            report.publish = Some(self.publish(&eligible)?);
        }
        ledger.save()?;

        Ok(report)
    }

    fn publish(&self, files: &[String]) -> Result<PublishResult> {
        let publisher = GitPublisher::new(&self.repo_root());
        publisher.ensure_repo()?;

        let dir_name = self
            .options
            .target_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "target".to_string());
        let branch = format!("masque/auto-fix-{}", dir_name);

        let base = publisher.detect_base_branch()?;
        publisher.create_branch(&base, &branch)?;
        publisher.stage_files(files)?;

        let mut committed = false;
        let mut pushed = false;
        if self.options.push {
            committed = publisher.commit(COMMIT_MESSAGE)?;
            if committed {
                publisher.push(&branch)?;
                pushed = true;
            }
        } else {
            eprintln!("Push disabled; changes staged on {} but not committed.", branch);
        }

        Ok(PublishResult {
            branch_name: branch,
            staged_files: files.to_vec(),
            committed,
            pushed,
        })
    }
}

/// Decide whether a fix should even be attempted. `None` means go ahead;
/// `Some` is the terminal outcome recorded instead. A detection-stage failure
/// that survived second-chance recovery surfaces under its own status so the
/// ledger distinguishes "upstream broke" from "nothing to fix".
fn fix_pregate(apply_fixes: bool, has_bug: bool, report: &BugReport) -> Option<FixOutcome> {
    if !apply_fixes {
        return Some(FixOutcome::Skipped {
            reason: "fix application disabled".to_string(),
        });
    }
    if let Some(error) = &report.error {
        // Parse failures keep the raw model text; transport failures do not.
        return Some(match &report.raw_response_text {
            Some(raw) => FixOutcome::ParseError {
                reason: error.clone(),
                raw_response_text: Some(raw.clone()),
            },
            None => FixOutcome::ApiError {
                reason: error.clone(),
            },
        });
    }
    if !has_bug {
        return Some(FixOutcome::Skipped {
            reason: "no bug confirmed by detector or supervisor".to_string(),
        });
    }
    None
}

/// Files whose fix was verified on disk and whose unit test passed.
pub fn eligible_files(entries: &[PipelineEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| {
            e.fix_result.as_ref().is_some_and(FixOutcome::is_patched)
                && e.unit_test_evaluation.as_ref().is_some_and(|t| t.passed)
        })
        .map(|e| e.bug_report.file_path.clone())
        .collect()
}

/// All `.py` files directly relevant to scanning, sorted for a deterministic
/// ledger order. Package markers are skipped.
pub fn scan_python_files(target: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(target)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "py")
                && p.file_name().is_some_and(|n| n != "__init__.py")
        })
        .collect();
    files.sort();
    files
}

/// Make the tests directory importable as a package.
fn ensure_package_marker(tests_root: &Path) -> Result<()> {
    let marker = tests_root.join("__init__.py");
    if !marker.exists() {
        fs::write(&marker, "")
            .with_context(|| format!("could not create {}", marker.display()))?;
    }
    Ok(())
}
