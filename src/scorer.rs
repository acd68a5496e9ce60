//! # Scorer
//!
//! Turns the outcome of one task's compile-and-run cycle into marks.
//!
//! Sub-criterion marks are all-or-nothing. The compilation bonus is awarded only when every
//! declared sub-criterion passed; a task that was not implemented, failed to compile, or failed
//! at runtime earns nothing and is flagged so the different kinds of zero stay distinguishable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::rubric::TaskSpec;

/// Diagnostics kept in a report are cut to this many characters.
pub const ERROR_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubtaskResult {
    pub passed: bool,
    pub marks_awarded: f64,
    pub maximum_marks: f64,
}

impl SubtaskResult {
    pub fn graded(maximum_marks: f64, passed: bool) -> Self {
        Self {
            passed,
            marks_awarded: if passed { maximum_marks } else { 0.0 },
            maximum_marks,
        }
    }

    pub fn failed(maximum_marks: f64) -> Self {
        Self::graded(maximum_marks, false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub question_number: u32,
    pub compile_error: bool,
    #[serde(default)]
    pub runtime_error: bool,
    pub not_implemented: bool,
    pub error: Option<String>,
    pub subtasks: IndexMap<String, SubtaskResult>,
    pub compilation_marks_awarded: f64,
    pub maximum_compilation_marks: f64,
    pub total_marks_awarded: f64,
    pub total_maximum_marks: f64,
}

impl TaskResult {
    /// A result with every sub-criterion failed and nothing awarded.
    pub fn zeroed(task_id: u32, task: &TaskSpec) -> Self {
        Self {
            question_number: task_id,
            compile_error: false,
            runtime_error: false,
            not_implemented: false,
            error: None,
            subtasks: task
                .subtasks
                .iter()
                .map(|(id, spec)| (id.clone(), SubtaskResult::failed(spec.marks)))
                .collect(),
            compilation_marks_awarded: 0.0,
            maximum_compilation_marks: task.compilation_marks,
            total_marks_awarded: 0.0,
            total_maximum_marks: task.total_maximum_marks(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.subtasks.values().all(|s| s.passed)
    }
}

/// What happened to a task before scoring.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    NotImplemented,
    CompileError(String),
    RuntimeError(String),
    /// The program ran to completion; these are the parsed sub-criterion verdicts.
    Completed(IndexMap<String, SubtaskResult>),
}

pub fn truncate_diagnostic(diagnostic: &str) -> String {
    diagnostic.chars().take(ERROR_LIMIT).collect()
}

pub fn score(task_id: u32, task: &TaskSpec, outcome: TaskOutcome) -> TaskResult {
    let mut result = TaskResult::zeroed(task_id, task);

    match outcome {
        TaskOutcome::NotImplemented => result.not_implemented = true,
        TaskOutcome::CompileError(diagnostic) => {
            result.compile_error = true;
            result.error = Some(truncate_diagnostic(&diagnostic));
        }
        TaskOutcome::RuntimeError(diagnostic) => {
            result.runtime_error = true;
            result.error = Some(truncate_diagnostic(&diagnostic));
        }
        TaskOutcome::Completed(parsed) => {
            // Only the verdict is taken from the parse; weights always come from the rubric.
            for (id, subtask) in result.subtasks.iter_mut() {
                let passed = parsed.get(id).is_some_and(|p| p.passed);
                *subtask = SubtaskResult::graded(subtask.maximum_marks, passed);
            }
            if result.all_passed() {
                result.compilation_marks_awarded = task.compilation_marks;
            }
        }
    }

    result.total_marks_awarded = result
        .subtasks
        .values()
        .map(|s| s.marks_awarded)
        .sum::<f64>()
        + result.compilation_marks_awarded;

    result
}
