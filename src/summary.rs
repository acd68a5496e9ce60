use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::report::{percentage, SubmissionReport};

pub const SUMMARY_FILENAME: &str = "batch_summary.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub name: String,
    pub id_number: String,
    pub total_marks: f64,
    pub max_marks: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_marks: f64,
    pub max_marks: f64,
    pub average_percentage: f64,
}

/// Totals for a whole batch run, keyed by student folder name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_students: usize,
    pub students: IndexMap<String, StudentSummary>,
    pub overall_stats: OverallStats,
}

impl BatchSummary {
    pub fn from_reports(reports: &BTreeMap<String, SubmissionReport>) -> Self {
        let students: IndexMap<String, StudentSummary> = reports
            .iter()
            .map(|(id, report)| {
                (
                    id.clone(),
                    StudentSummary {
                        name: report.student_info.name.clone(),
                        id_number: report.student_info.id_number.clone(),
                        total_marks: report.total_marks,
                        max_marks: report.max_marks,
                        percentage: report.percentage,
                    },
                )
            })
            .collect();

        let total_marks = students.values().map(|s| s.total_marks).sum();
        let max_marks = students.values().map(|s| s.max_marks).sum();

        Self {
            total_students: students.len(),
            students,
            overall_stats: OverallStats {
                total_marks,
                max_marks,
                average_percentage: percentage(total_marks, max_marks),
            },
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize summary")?;
        fs::write(path, json).with_context(|| format!("Failed to write summary {path:?}"))
    }
}
