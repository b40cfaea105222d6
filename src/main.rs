use anyhow::Result;
use clap::Parser;
use masque::pipeline::{Pipeline, PipelineOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "masque",
    about = "Automated bug detection, review, repair, and publishing for Python programs",
    version
)]
struct Args {
    /// Directory of Python programs to scan
    #[arg(default_value = "python_programs")]
    path: PathBuf,

    /// Directory (relative to the repo root) containing unit tests
    #[arg(long, default_value = "python_testcases")]
    tests_dir: String,

    /// Where to write the JSON run ledger
    #[arg(long, default_value = "masque_ledger.json")]
    ledger: PathBuf,

    /// Per-test timeout in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,

    /// Python interpreter used to run tests
    #[arg(long, default_value = "python3")]
    python: String,

    /// Apply fixes without asking
    #[arg(long)]
    apply: bool,

    /// Commit and push verified fixes without asking
    #[arg(long)]
    push: bool,

    /// Generate fixes and fingerprints but never write to scanned files
    #[arg(long)]
    dry_run: bool,
}

/// Ask a y/N question on stderr, defaulting to no.
fn confirm(question: &str) -> bool {
    eprint!("{} [y/N] ", question);
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let apply_fixes = args.apply || confirm("Apply generated fixes to files on disk?");
    let push = if apply_fixes {
        args.push || confirm("Commit and push verified fixes to origin?")
    } else {
        false
    };

    let options = PipelineOptions {
        target_dir: args.path,
        tests_dir: args.tests_dir,
        ledger_path: args.ledger.clone(),
        apply_fixes,
        push,
        dry_run: args.dry_run,
        test_timeout: Duration::from_secs(args.timeout_secs),
        python: args.python,
    };

    let pipeline = Pipeline::new(options)?;
    let report = pipeline.run().await?;

    eprintln!();
    eprintln!("Run complete.");
    eprintln!("  Files scanned:  {}", report.files_scanned);
    eprintln!("  Bugs found:     {}", report.bugs_found);
    eprintln!("  Fixes applied:  {}", report.fixes_applied);
    eprintln!("  Tests passed:   {}", report.tests_passed);
    match &report.publish {
        Some(p) => eprintln!(
            "  Published:      {} file(s) on {} (committed: {}, pushed: {})",
            p.staged_files.len(),
            p.branch_name,
            p.committed,
            p.pushed
        ),
        None => eprintln!("  Published:      nothing eligible"),
    }
    eprintln!("  Ledger:         {}", args.ledger.display());

    Ok(())
}
