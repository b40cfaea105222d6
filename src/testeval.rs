//! Test discovery, runner selection, and execution.
//!
//! Tests live in a dedicated directory, named `<stem>_test.py` or
//! `test_<stem>.py`. How a test is run depends on what it looks like:
//! pytest-style files go through pytest, driver files with relative imports
//! run as a module, everything else runs as a plain file.

use crate::util::run_command_with_timeout;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

/// Exit code when the scanned file itself is missing.
pub const EXIT_SCANNED_MISSING: i32 = 2;
/// Exit code when no test file exists for the scanned file.
pub const EXIT_TEST_NOT_FOUND: i32 = 3;
/// Exit code reported on test timeout.
pub const EXIT_TIMEOUT: i32 = 124;

/// How the chosen test file gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Runner {
    Pytest,
    #[serde(rename = "python-module")]
    Module,
    #[serde(rename = "python-file")]
    File,
    None,
}

/// Result of one test evaluation; produced for every scanned file, whatever
/// happened to its fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestEvaluation {
    pub scanned_file: String,
    pub test_file: String,
    pub runner: Runner,
    pub passed: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub notes: String,
}

pub struct TestEvaluator {
    repo_root: PathBuf,
    tests_dir: String,
    timeout: Duration,
    python: String,
}

fn pytest_def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*def\s+test").unwrap())
}

fn relative_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*from\s+\.\.?\S*\s+import\s+").unwrap())
}

impl TestEvaluator {
    pub fn new(repo_root: &Path, tests_dir: &str, timeout: Duration, python: &str) -> Self {
        // The test subprocess runs with cwd at the repo root; a relative root
        // would make the test-file argument resolve against the wrong base.
        let repo_root = repo_root
            .canonicalize()
            .unwrap_or_else(|_| repo_root.to_path_buf());
        Self {
            repo_root,
            tests_dir: tests_dir.to_string(),
            timeout,
            python: python.to_string(),
        }
    }

    /// Candidate test paths for a scanned file, suffix style first.
    fn candidate_test_paths(&self, scanned_file: &Path) -> Vec<PathBuf> {
        let stem = scanned_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let tests_root = self.repo_root.join(&self.tests_dir);
        vec![
            tests_root.join(format!("{}_test.py", stem)),
            tests_root.join(format!("test_{}.py", stem)),
        ]
    }

    fn find_test_file(&self, scanned_file: &Path) -> Option<PathBuf> {
        self.candidate_test_paths(scanned_file)
            .into_iter()
            .find(|p| p.exists())
    }

    /// Build a dotted module name by walking up through package directories
    /// (those containing `__init__.py`) until the repo root or a non-package
    /// directory.
    fn module_name_for_file(&self, file_path: &Path) -> String {
        let mut parts = vec![file_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()];

        let mut cur = file_path.parent().map(Path::to_path_buf);
        while let Some(dir) = cur {
            if dir == self.repo_root {
                if dir.join("__init__.py").exists() {
                    if let Some(name) = dir.file_name() {
                        parts.push(name.to_string_lossy().to_string());
                    }
                }
                break;
            }
            if !dir.join("__init__.py").exists() {
                break;
            }
            if let Some(name) = dir.file_name() {
                parts.push(name.to_string_lossy().to_string());
            }
            cur = dir.parent().map(Path::to_path_buf);
        }

        parts.reverse();
        parts.join(".")
    }

    /// Evaluate the test associated with one scanned file, blocking until the
    /// subprocess completes or times out.
    pub fn evaluate(&self, scanned_file: &Path) -> TestEvaluation {
        let scanned = scanned_file.display().to_string();

        if !scanned_file.exists() {
            return TestEvaluation {
                scanned_file: scanned,
                test_file: String::new(),
                runner: Runner::None,
                passed: false,
                exit_code: EXIT_SCANNED_MISSING,
                stdout: String::new(),
                stderr: String::new(),
                notes: "Scanned file does not exist.".to_string(),
            };
        }

        let Some(test_file) = self.find_test_file(scanned_file) else {
            let cands: Vec<String> = self
                .candidate_test_paths(scanned_file)
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            return TestEvaluation {
                scanned_file: scanned,
                test_file: String::new(),
                runner: Runner::None,
                passed: false,
                exit_code: EXIT_TEST_NOT_FOUND,
                stdout: String::new(),
                stderr: String::new(),
                notes: format!(
                    "Unit test not found in {}. Tried: {:?}",
                    self.tests_dir, cands
                ),
            };
        };

        let test_text = fs::read_to_string(&test_file).unwrap_or_default();
        let (runner, args) = self.classify(&test_text, &test_file);
        self.run_test(scanned_file, &test_file, runner, args)
    }

    /// Pick the runner for a test file. Pytest heuristics win over the
    /// relative-import heuristic; plain file execution is the fallback.
    fn classify(&self, test_text: &str, test_file: &Path) -> (Runner, Vec<String>) {
        if looks_like_pytest(test_text, test_file) {
            return (
                Runner::Pytest,
                vec![
                    "-m".to_string(),
                    "pytest".to_string(),
                    test_file.display().to_string(),
                ],
            );
        }
        if relative_import_re().is_match(test_text) {
            let module = self.module_name_for_file(test_file);
            return (Runner::Module, vec!["-m".to_string(), module]);
        }
        (Runner::File, vec![test_file.display().to_string()])
    }

    fn run_test(
        &self,
        scanned_file: &Path,
        test_file: &Path,
        runner: Runner,
        args: Vec<String>,
    ) -> TestEvaluation {
        let command_line = format!("{} {}", self.python, args.join(" "));

        let mut cmd = Command::new(&self.python);
        cmd.args(&args)
            .current_dir(&self.repo_root)
            // Injected per-invocation so imports resolve from the repo root
            // without mutating shared process state.
            .env("PYTHONPATH", &self.repo_root);

        let result = match run_command_with_timeout(&mut cmd, self.timeout) {
            Ok(result) => result,
            Err(e) => {
                return TestEvaluation {
                    scanned_file: scanned_file.display().to_string(),
                    test_file: test_file.display().to_string(),
                    runner,
                    passed: false,
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: String::new(),
                    notes: format!("Failed to run {}: {}", command_line, e),
                };
            }
        };

        if result.timed_out {
            return TestEvaluation {
                scanned_file: scanned_file.display().to_string(),
                test_file: test_file.display().to_string(),
                runner,
                passed: false,
                exit_code: EXIT_TIMEOUT,
                stdout: result.stdout,
                stderr: result.stderr,
                notes: format!(
                    "Timed out after {}s running: {}",
                    self.timeout.as_secs(),
                    command_line
                ),
            };
        }

        let exit_code = result.status.and_then(|s| s.code()).unwrap_or(-1);
        let passed = exit_code == 0;
        let notes = if passed {
            "OK".to_string()
        } else {
            format!("Failed (exit={}). Command: {}", exit_code, command_line)
        };

        TestEvaluation {
            scanned_file: scanned_file.display().to_string(),
            test_file: test_file.display().to_string(),
            runner,
            passed,
            exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
            notes,
        }
    }
}

fn looks_like_pytest(test_text: &str, test_file: &Path) -> bool {
    if test_text.contains("import pytest") {
        return true;
    }
    if pytest_def_re().is_match(test_text) {
        return true;
    }
    let name = test_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.starts_with("test_") || name.ends_with("_test.py")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn evaluator(root: &Path) -> TestEvaluator {
        TestEvaluator::new(root, "python_testcases", Duration::from_secs(30), "python3")
    }

    #[test]
    fn test_candidate_order_suffix_first() {
        let tmp = TempDir::new().unwrap();
        let ev = evaluator(tmp.path());
        let cands = ev.candidate_test_paths(Path::new("programs/bitcount.py"));
        assert!(cands[0].ends_with("python_testcases/bitcount_test.py"));
        assert!(cands[1].ends_with("python_testcases/test_bitcount.py"));
    }

    #[test]
    fn test_relative_repo_root_resolves_candidates_absolute() {
        // A root relative to the process cwd must not leak relative paths
        // into the subprocess, which runs with cwd at the root itself.
        let tmp = TempDir::new_in(".").unwrap();
        let rel_root = PathBuf::from(tmp.path().file_name().unwrap());
        let ev = evaluator(&rel_root);
        let cands = ev.candidate_test_paths(Path::new("python_programs/sample.py"));
        assert!(cands.iter().all(|p| p.is_absolute()));
        assert!(cands[0].starts_with(tmp.path().canonicalize().unwrap()));
    }

    #[test]
    fn test_missing_test_file_reports_both_candidates() {
        let tmp = TempDir::new().unwrap();
        let scanned = tmp.path().join("orphan.py");
        fs::write(&scanned, "x = 1\n").unwrap();

        let result = evaluator(tmp.path()).evaluate(&scanned);
        assert_eq!(result.runner, Runner::None);
        assert!(!result.passed);
        assert_eq!(result.exit_code, EXIT_TEST_NOT_FOUND);
        assert!(result.notes.contains("orphan_test.py"));
        assert!(result.notes.contains("test_orphan.py"));
    }

    #[test]
    fn test_missing_scanned_file_distinct_exit_code() {
        let tmp = TempDir::new().unwrap();
        let result = evaluator(tmp.path()).evaluate(&tmp.path().join("ghost.py"));
        assert_eq!(result.exit_code, EXIT_SCANNED_MISSING);
        assert_eq!(result.runner, Runner::None);
    }

    #[test]
    fn test_classify_pytest_by_function_name() {
        let tmp = TempDir::new().unwrap();
        let ev = evaluator(tmp.path());
        let file = tmp.path().join("something.py");
        let (runner, _) = ev.classify("def test_addition():\n    assert 1 + 1 == 2\n", &file);
        assert_eq!(runner, Runner::Pytest);
    }

    #[test]
    fn test_classify_pytest_by_import() {
        let tmp = TempDir::new().unwrap();
        let ev = evaluator(tmp.path());
        let file = tmp.path().join("checks.py");
        let (runner, _) = ev.classify("import pytest\n", &file);
        assert_eq!(runner, Runner::Pytest);
    }

    #[test]
    fn test_classify_pytest_by_name_wins_over_relative_import() {
        let tmp = TempDir::new().unwrap();
        let ev = evaluator(tmp.path());
        let file = tmp.path().join("test_driver.py");
        let (runner, _) = ev.classify("from ..lib import target\nprint(target)\n", &file);
        assert_eq!(runner, Runner::Pytest);
    }

    #[test]
    fn test_classify_module_for_relative_imports() {
        let tmp = TempDir::new().unwrap();
        let ev = evaluator(tmp.path());
        let file = tmp.path().join("driver.py");
        let (runner, _) = ev.classify("from .. import target\nmain()\n", &file);
        assert_eq!(runner, Runner::Module);
    }

    #[test]
    fn test_classify_plain_file_fallback() {
        let tmp = TempDir::new().unwrap();
        let ev = evaluator(tmp.path());
        let file = tmp.path().join("driver.py");
        let (runner, args) = ev.classify("print('hello')\n", &file);
        assert_eq!(runner, Runner::File);
        assert_eq!(args, vec![file.display().to_string()]);
    }

    #[test]
    fn test_module_name_walks_package_dirs() {
        let tmp = TempDir::new().unwrap();
        let pkg = tmp.path().join("python_testcases");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("__init__.py"), "").unwrap();
        let test_file = pkg.join("driver.py");
        fs::write(&test_file, "from .. import x\n").unwrap();

        let ev = evaluator(tmp.path());
        assert_eq!(ev.module_name_for_file(&test_file), "python_testcases.driver");
    }

    #[test]
    fn test_module_name_stops_at_non_package_dir() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("no_marker").join("inner");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("__init__.py"), "").unwrap();
        let test_file = nested.join("driver.py");
        fs::write(&test_file, "").unwrap();

        let ev = evaluator(tmp.path());
        // `inner` is a package, `no_marker` is not, so the walk stops there.
        assert_eq!(ev.module_name_for_file(&test_file), "inner.driver");
    }

    #[test]
    fn test_runner_serialization_names() {
        assert_eq!(serde_json::to_value(Runner::Pytest).unwrap(), "pytest");
        assert_eq!(
            serde_json::to_value(Runner::Module).unwrap(),
            "python-module"
        );
        assert_eq!(serde_json::to_value(Runner::File).unwrap(), "python-file");
        assert_eq!(serde_json::to_value(Runner::None).unwrap(), "none");
    }
}
