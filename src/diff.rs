//! Compares two generations of persisted reports and lists every criterion whose marks moved.
//!
//! Reports are read through a lenient view: anything missing counts as zero, so reports
//! written by older versions of the grader still compare.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::warn;

use crate::report::REPORT_FILENAME;

const HEADER: [&str; 6] = [
    "Student Name",
    "ID Number",
    "Criterion",
    "Old Marks",
    "New Marks",
    "Difference",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReportMarks {
    pub student_info: Option<InfoView>,
    pub tasks: IndexMap<String, TaskMarks>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfoView {
    pub name: Option<String>,
    pub id_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TaskMarks {
    pub compilation_marks_awarded: f64,
    pub subtasks: IndexMap<String, SubtaskMarks>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubtaskMarks {
    pub marks_awarded: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRow {
    pub student_id: String,
    pub name: String,
    pub id_number: String,
    pub criterion: String,
    pub old_marks: f64,
    pub new_marks: f64,
}

impl ChangeRow {
    pub fn difference(&self) -> f64 {
        self.new_marks - self.old_marks
    }

    pub fn record(&self) -> [String; 6] {
        [
            self.name.clone(),
            self.id_number.clone(),
            self.criterion.clone(),
            format!("{:.1}", self.old_marks),
            format!("{:.1}", self.new_marks),
            format!("{:+.1}", self.difference()),
        ]
    }
}

/// Loads `<root>/<student>/evaluation_report.json` for every student folder. Unreadable
/// reports are skipped with a warning.
pub fn load_reports(root: &Path) -> Result<BTreeMap<String, ReportMarks>> {
    if !root.is_dir() {
        bail!("Directory {:?} not found", root);
    }

    let mut reports = BTreeMap::new();
    for entry in fs::read_dir(root).with_context(|| format!("Failed to read {root:?}"))? {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path().join(REPORT_FILENAME);
        if !path.is_file() {
            continue;
        }

        let parsed = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str::<ReportMarks>(&text).map_err(Into::into));
        match parsed {
            Ok(report) => {
                reports.insert(entry.file_name().to_string_lossy().into_owned(), report);
            }
            Err(e) => warn!("Could not read {path:?}, skipping: {e}"),
        }
    }

    Ok(reports)
}

fn identity(student_id: &str, old: Option<&ReportMarks>, new: Option<&ReportMarks>) -> (String, String) {
    let pick = |field: fn(&InfoView) -> Option<&String>| {
        [new, old]
            .into_iter()
            .flatten()
            .filter_map(|r| r.student_info.as_ref())
            .find_map(|info| field(info).cloned())
    };
    (
        pick(|i| i.name.as_ref()).unwrap_or_else(|| student_id.to_string()),
        pick(|i| i.id_number.as_ref()).unwrap_or_else(|| "N/A".to_string()),
    )
}

fn keys<'a, V>(
    old: Option<&'a IndexMap<String, V>>,
    new: Option<&'a IndexMap<String, V>>,
) -> BTreeSet<&'a String> {
    old.into_iter().chain(new).flat_map(|m| m.keys()).collect()
}

/// Every (student, criterion) whose marks differ, ordered by student then criterion label.
pub fn compare_reports(
    old: &BTreeMap<String, ReportMarks>,
    new: &BTreeMap<String, ReportMarks>,
) -> Vec<ChangeRow> {
    let students: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    let mut rows = Vec::new();

    for student_id in students {
        let old_report = old.get(student_id);
        let new_report = new.get(student_id);
        let (name, id_number) = identity(student_id, old_report, new_report);
        let mut changed = |criterion: String, old_marks: f64, new_marks: f64| {
            if old_marks != new_marks {
                rows.push(ChangeRow {
                    student_id: student_id.clone(),
                    name: name.clone(),
                    id_number: id_number.clone(),
                    criterion,
                    old_marks,
                    new_marks,
                });
            }
        };

        let old_tasks = old_report.map(|r| &r.tasks);
        let new_tasks = new_report.map(|r| &r.tasks);
        for task_key in keys(old_tasks, new_tasks) {
            let old_task = old_tasks.and_then(|t| t.get(task_key));
            let new_task = new_tasks.and_then(|t| t.get(task_key));

            let number = task_key.strip_prefix("task_").unwrap_or(task_key);
            changed(
                format!("{number} (compilation)"),
                old_task.map_or(0.0, |t| t.compilation_marks_awarded),
                new_task.map_or(0.0, |t| t.compilation_marks_awarded),
            );

            let old_subs = old_task.map(|t| &t.subtasks);
            let new_subs = new_task.map(|t| &t.subtasks);
            for sub_id in keys(old_subs, new_subs) {
                let marks = |subs: Option<&IndexMap<String, SubtaskMarks>>| {
                    subs.and_then(|s| s.get(sub_id)).map_or(0.0, |s| s.marks_awarded)
                };
                changed(sub_id.clone(), marks(old_subs), marks(new_subs));
            }
        }
    }

    rows.sort_by(|a, b| {
        a.student_id
            .cmp(&b.student_id)
            .then_with(|| a.criterion.cmp(&b.criterion))
    });
    rows
}

pub fn write_csv(rows: &[ChangeRow], path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {path:?}"))?;
    writer.write_record(HEADER)?;
    for row in rows {
        writer.write_record(row.record())?;
    }
    writer.flush()?;
    Ok(())
}

/// Compares `old_root` against `new_root` and writes the changed marks to `output`. Nothing is
/// written when no marks changed. Returns the number of changed criteria.
pub fn run_diff(old_root: &Path, new_root: &Path, output: &Path) -> Result<usize> {
    println!("Loading reports from {old_root:?} and {new_root:?}...");
    let old = load_reports(old_root)?;
    let new = load_reports(new_root)?;

    if old.is_empty() && new.is_empty() {
        println!("No reports found in either directory.");
        return Ok(0);
    }
    println!("Found {} old reports and {} new reports.", old.len(), new.len());

    let rows = compare_reports(&old, &new);
    if rows.is_empty() {
        println!("No changes in marks detected across all students and tasks.");
        return Ok(0);
    }

    write_csv(&rows, output)?;
    println!("Generated change report: {}", output.display());
    println!("Total changes detected: {}", rows.len());
    Ok(rows.len())
}
