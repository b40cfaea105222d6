//! Idempotent git publishing of verified fixes.
//!
//! Every step shells out to `git` in the target repo and is safe to repeat:
//! branch creation falls back to checkout when the branch exists, commit is a
//! no-op when nothing is staged, and push re-pushes the same branch.

use crate::util::run_command_with_timeout;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

const GIT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("not a git repository: {0}")]
    NotARepository(String),
    #[error("no base branch found (origin/HEAD, main, and master all missing)")]
    NoBaseBranch,
    #[error("no files to stage")]
    NothingToStage,
    #[error("git command failed: {command}\nstdout: {stdout}\nstderr: {stderr}")]
    Command {
        command: String,
        stdout: String,
        stderr: String,
    },
    #[error("failed to run git: {0}")]
    Spawn(#[from] anyhow::Error),
}

/// What actually happened during publishing, for the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    pub branch_name: String,
    pub staged_files: Vec<String>,
    pub committed: bool,
    pub pushed: bool,
}

pub struct GitPublisher {
    repo_root: PathBuf,
}

impl GitPublisher {
    pub fn new(repo_root: &Path) -> Self {
        // Git runs with cwd at the repo root; resolve the root up front so
        // callers can hand in a path relative to their own cwd.
        let repo_root = repo_root
            .canonicalize()
            .unwrap_or_else(|_| repo_root.to_path_buf());
        Self { repo_root }
    }

    /// Run one git command in the target repo, returning trimmed stdout.
    fn run_git(&self, args: &[&str]) -> Result<String, PublishError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.repo_root);

        let result = run_command_with_timeout(&mut cmd, GIT_TIMEOUT)?;
        let ok = result
            .status
            .map(|s| s.success())
            .unwrap_or(false);
        if !ok || result.timed_out {
            return Err(PublishError::Command {
                command: format!("git {}", args.join(" ")),
                stdout: result.stdout.trim().to_string(),
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result.stdout.trim().to_string())
    }

    pub fn ensure_repo(&self) -> Result<(), PublishError> {
        match self.run_git(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) if out == "true" => Ok(()),
            _ => Err(PublishError::NotARepository(
                self.repo_root.display().to_string(),
            )),
        }
    }

    /// Find the branch new work should be based on: the remote's default
    /// branch when a remote exists, otherwise local `main`, then `master`.
    pub fn detect_base_branch(&self) -> Result<String, PublishError> {
        if let Ok(r) = self.run_git(&["symbolic-ref", "refs/remotes/origin/HEAD"]) {
            if let Some(name) = r.rsplit('/').next() {
                if !name.is_empty() {
                    return Ok(name.to_string());
                }
            }
        }
        for candidate in ["main", "master"] {
            if self
                .run_git(&["rev-parse", "--verify", candidate])
                .is_ok()
            {
                return Ok(candidate.to_string());
            }
        }
        Err(PublishError::NoBaseBranch)
    }

    /// Create `branch` off `base`, or check it out if it already exists.
    pub fn create_branch(&self, base: &str, branch: &str) -> Result<(), PublishError> {
        self.run_git(&["checkout", base])?;
        if self.run_git(&["checkout", "-b", branch]).is_err() {
            self.run_git(&["checkout", branch])?;
        }
        Ok(())
    }

    pub fn stage_files(&self, files: &[String]) -> Result<(), PublishError> {
        if files.is_empty() {
            return Err(PublishError::NothingToStage);
        }
        let rel: Vec<String> = files.iter().map(|f| self.repo_relative(f)).collect();
        let mut args = vec!["add", "--"];
        args.extend(rel.iter().map(String::as_str));
        self.run_git(&args)?;
        Ok(())
    }

    /// Express a path relative to the repo root. Git resolves pathspecs
    /// against its own working directory, so a caller-relative path has to be
    /// rebased before staging.
    fn repo_relative(&self, file: &str) -> String {
        let path = Path::new(file);
        let abs = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        abs.strip_prefix(&self.repo_root)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| file.to_string())
    }

    pub fn has_staged_changes(&self) -> Result<bool, PublishError> {
        let out = self.run_git(&["diff", "--cached", "--name-only"])?;
        Ok(!out.is_empty())
    }

    /// Commit staged changes. A no-op (returning false) when nothing is
    /// staged, so repeated runs never produce empty commits.
    pub fn commit(&self, message: &str) -> Result<bool, PublishError> {
        if !self.has_staged_changes()? {
            return Ok(false);
        }
        self.run_git(&["commit", "-m", message])?;
        Ok(true)
    }

    pub fn push(&self, branch: &str) -> Result<(), PublishError> {
        self.run_git(&["push", "-u", "origin", branch])?;
        Ok(())
    }
}
