use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use rayon::prelude::*;
use tracing::warn;

use crate::evaluator::Evaluator;
use crate::report::{SubmissionReport, REPORT_FILENAME};

/// One student's folder and the source file picked from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: String,
    pub source: PathBuf,
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read directory {dir:?}"))? {
        let entry = entry.context("Failed to read directory entry")?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Every non-hidden folder under `root` holding a file with `extension`, in name order.
pub fn collect_submissions(root: &Path, extension: &str) -> Result<Vec<Submission>> {
    if !root.is_dir() {
        return Err(anyhow!("Submissions root is not a directory: {}", root.display()));
    }

    let mut submissions = Vec::new();
    for dir in sorted_entries(root)? {
        if !dir.is_dir() || is_hidden(&dir) {
            continue;
        }
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("No folder name for {dir:?}"))?;

        let source = sorted_entries(&dir)?
            .into_iter()
            .find(|p| p.is_file() && p.extension().is_some_and(|e| e == extension));
        match source {
            Some(source) => submissions.push(Submission { id, source }),
            None => println!("  No .{extension} file found for {id}"),
        }
    }

    Ok(submissions)
}

/// Runs `process` over `submissions` on a pool of `workers` threads, keeping input order.
pub fn process_submissions_parallel<F, R>(
    submissions: &[Submission],
    workers: usize,
    process: F,
) -> Result<Vec<R>>
where
    F: Fn(&Submission) -> R + Send + Sync,
    R: Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .context("Failed to build worker pool")?;

    Ok(pool.install(|| submissions.par_iter().map(process).collect()))
}

/// Grades one submission and writes its report, a copy of its source, and the spliced units
/// into `<output>/<id>/`.
pub fn process_submission(
    evaluator: &Evaluator,
    submission: &Submission,
    output: &Path,
) -> Result<SubmissionReport> {
    println!("Processing student: {}", submission.id);

    let student_dir = output.join(&submission.id);
    fs::create_dir_all(&student_dir)
        .with_context(|| format!("Failed to create {student_dir:?}"))?;
    let source = fs::read_to_string(&submission.source)
        .with_context(|| format!("Failed to read {:?}", submission.source))?;

    let report = evaluator.evaluate(&source, Some(&student_dir));

    if let Some(name) = submission.source.file_name() {
        if let Err(e) = fs::copy(&submission.source, student_dir.join(name)) {
            warn!("Could not copy {:?} into {student_dir:?}: {e}", submission.source);
        }
    }
    report.save(&student_dir.join(REPORT_FILENAME))?;

    println!(
        "{}: {}/{} marks ({}%)",
        submission.id, report.total_marks, report.max_marks, report.percentage
    );
    Ok(report)
}

/// Grades every submission under `root`. Submissions that fail are reported and left out.
pub fn run_batch(
    evaluator: &Evaluator,
    root: &Path,
    output: &Path,
    workers: usize,
) -> Result<BTreeMap<String, SubmissionReport>> {
    fs::create_dir_all(output).with_context(|| format!("Failed to create {output:?}"))?;

    let submissions = collect_submissions(root, evaluator.toolchain().extension())?;
    if submissions.is_empty() {
        println!("No student directories found!");
        return Ok(BTreeMap::new());
    }
    println!("Found {} student directories", submissions.len());

    let results = process_submissions_parallel(&submissions, workers, |s| {
        process_submission(evaluator, s, output)
    })?;

    let mut reports = BTreeMap::new();
    for (submission, result) in submissions.iter().zip(results) {
        match result {
            Ok(report) => {
                reports.insert(submission.id.clone(), report);
            }
            Err(e) => println!(
                "{}",
                format!("  Error processing {}: {e:#}", submission.id).red()
            ),
        }
    }

    Ok(reports)
}
