//! Per-submission report: student identity plus every task's marks.
//!
//! This is the persisted unit of truth that the batch summary and the diff tool read back.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::scorer::TaskResult;

pub const NOT_PROVIDED: &str = "Not Provided";
pub const REPORT_FILENAME: &str = "evaluation_report.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInfo {
    pub name: String,
    pub id_number: String,
    pub lab_number: String,
    pub system_number: String,
}

impl Default for StudentInfo {
    fn default() -> Self {
        Self {
            name: NOT_PROVIDED.to_string(),
            id_number: NOT_PROVIDED.to_string(),
            lab_number: NOT_PROVIDED.to_string(),
            system_number: NOT_PROVIDED.to_string(),
        }
    }
}

impl StudentInfo {
    /// The name when provided, else the id number.
    pub fn identity(&self) -> &str {
        if self.name.is_empty() || self.name == NOT_PROVIDED {
            &self.id_number
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub student_info: StudentInfo,
    pub total_marks: f64,
    pub max_marks: f64,
    pub percentage: f64,
    pub tasks: IndexMap<String, TaskResult>,
}

/// `100 * total / max` rounded to two decimals, 0 when there is nothing to score.
pub fn percentage(total: f64, max: f64) -> f64 {
    if max > 0.0 {
        (total / max * 10000.0).round() / 100.0
    } else {
        0.0
    }
}

pub fn build_report(student_info: StudentInfo, mut results: Vec<TaskResult>) -> SubmissionReport {
    results.sort_by_key(|r| r.question_number);

    let total_marks: f64 = results.iter().map(|r| r.total_marks_awarded).sum();
    let max_marks: f64 = results.iter().map(|r| r.total_maximum_marks).sum();
    let tasks = results
        .into_iter()
        .map(|r| (format!("task_{}", r.question_number), r))
        .collect();

    SubmissionReport {
        student_info,
        total_marks,
        max_marks,
        percentage: percentage(total_marks, max_marks),
        tasks,
    }
}

impl SubmissionReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json().context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report {path:?}"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Failed to read report {path:?}"))?;
        serde_json::from_str(&text).with_context(|| format!("Report {path:?} is malformed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::SubtaskResult;
    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    fn result(question_number: u32, awarded: f64, maximum: f64) -> TaskResult {
        TaskResult {
            question_number,
            compile_error: false,
            runtime_error: false,
            not_implemented: false,
            error: None,
            subtasks: [(
                format!("{question_number}.1"),
                SubtaskResult::graded(maximum - 1.0, awarded > 0.0),
            )]
            .into_iter()
            .collect(),
            compilation_marks_awarded: if awarded > 0.0 { 1.0 } else { 0.0 },
            maximum_compilation_marks: 1.0,
            total_marks_awarded: awarded,
            total_maximum_marks: maximum,
        }
    }

    #[test]
    fn totals_and_task_order() {
        let report = build_report(
            StudentInfo::default(),
            vec![result(10, 0.0, 3.0), result(2, 4.0, 4.0), result(1, 0.0, 5.0)],
        );
        assert_eq!(report.total_marks, 4.0);
        assert_eq!(report.max_marks, 12.0);
        assert_eq!(report.percentage, 33.33);
        let keys: Vec<&str> = report.tasks.keys().map(String::as_str).collect();
        assert_eq!(keys, ["task_1", "task_2", "task_10"]);
    }

    #[test]
    fn empty_report_is_zero_percent() {
        let report = build_report(StudentInfo::default(), vec![]);
        assert_eq!(report.max_marks, 0.0);
        assert_eq!(report.percentage, 0.0);
    }

    #[test]
    fn identity_falls_back_to_id_number() {
        let mut info = StudentInfo::default();
        info.id_number = "2023A7PS0001".to_string();
        assert_eq!(info.identity(), "2023A7PS0001");
        info.name = "Ada".to_string();
        assert_eq!(info.identity(), "Ada");
    }

    #[test]
    fn persisted_report_round_trips() {
        let info = StudentInfo {
            name: "Ada Lovelace".to_string(),
            id_number: "2023A7PS0001".to_string(),
            ..StudentInfo::default()
        };
        let mut failing = result(3, 0.0, 3.5);
        failing.compile_error = true;
        failing.error = Some("RoomsService.java:12: error: ';' expected".to_string());
        let report = build_report(info, vec![result(1, 4.0, 4.0), failing]);

        let dir = TempDir::new("report").unwrap();
        let path = dir.path().join(REPORT_FILENAME);
        report.save(&path).unwrap();
        let loaded = SubmissionReport::load(&path).unwrap();

        assert_eq!(loaded, report);
        assert_eq!(loaded.to_json().unwrap(), report.to_json().unwrap());
    }

    #[test]
    fn reports_without_runtime_flag_still_load() {
        let json = r#"{
            "student_info": {"name": "A", "id_number": "B", "lab_number": "C", "system_number": "D"},
            "total_marks": 0, "max_marks": 5, "percentage": 0,
            "tasks": {"task_1": {
                "question_number": 1, "compile_error": true, "not_implemented": false,
                "error": "x", "subtasks": {}, "compilation_marks_awarded": 0,
                "maximum_compilation_marks": 2, "total_marks_awarded": 0, "total_maximum_marks": 5
            }}
        }"#;
        let report: SubmissionReport = serde_json::from_str(json).unwrap();
        assert!(!report.tasks["task_1"].runtime_error);
    }
}
