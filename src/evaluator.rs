//! Single-submission pipeline.
//!
//! For each task in ascending order: extract the student's fragment, splice it into the
//! reference template, compile and run the result, read the harness markers, and score. Every
//! task resolves to a complete [`TaskResult`]; nothing a submission contains can abort the run.

use std::path::Path;

use colored::Colorize;
use tracing::debug;

use crate::config::Toolchain;
use crate::extractor::{extract, extract_student_info};
use crate::injector::{inject, AuditSink};
use crate::report::{build_report, SubmissionReport};
use crate::rubric::{Rubric, TaskSpec};
use crate::runner;
use crate::scorer::{score, TaskOutcome, TaskResult};
use crate::test_parser;

pub struct Evaluator<'a> {
    rubric: &'a Rubric,
    template: &'a str,
    toolchain: &'a Toolchain,
    quiet: bool,
}

impl<'a> Evaluator<'a> {
    pub fn new(rubric: &'a Rubric, template: &'a str, toolchain: &'a Toolchain) -> Self {
        Self {
            rubric,
            template,
            toolchain,
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn toolchain(&self) -> &Toolchain {
        self.toolchain
    }

    /// Grades `source`. With `audit_dir`, each spliced unit is also copied there.
    pub fn evaluate(&self, source: &str, audit_dir: Option<&Path>) -> SubmissionReport {
        let student_info = extract_student_info(source);
        let audit = audit_dir
            .map(|dir| AuditSink::new(dir, student_info.identity(), self.toolchain.extension()));

        if !self.quiet {
            println!("Evaluating submission for: {}", student_info.name);
        }

        let results = self
            .rubric
            .tasks()
            .map(|(task_id, task)| self.evaluate_task(task_id, task, source, audit.as_ref()))
            .collect();

        build_report(student_info, results)
    }

    pub fn evaluate_task(
        &self,
        task_id: u32,
        task: &TaskSpec,
        source: &str,
        audit: Option<&AuditSink>,
    ) -> TaskResult {
        let extraction = extract(source, task);
        let outcome = if extraction.not_implemented {
            TaskOutcome::NotImplemented
        } else {
            self.compile_and_run(task_id, task, &extraction.fragment, audit)
        };

        let result = score(task_id, task, outcome);
        if !self.quiet {
            print_task(&task.name, &result);
        }
        result
    }

    fn compile_and_run(
        &self,
        task_id: u32,
        task: &TaskSpec,
        fragment: &str,
        audit: Option<&AuditSink>,
    ) -> TaskOutcome {
        let unit = match inject(self.template, task_id, task, fragment, audit) {
            Ok(unit) => unit,
            Err(e) => return TaskOutcome::CompileError(e.to_string()),
        };

        match runner::run(&unit, self.toolchain) {
            Ok(outcome) => {
                debug!("Task {task_id} ran, {} bytes of output", outcome.stdout.len());
                TaskOutcome::Completed(test_parser::parse(&outcome.stdout, task))
            }
            Err(e) if e.is_compile_failure() => {
                debug!("Task {task_id} did not compile: {e}");
                TaskOutcome::CompileError(e.diagnostic())
            }
            Err(e) => {
                debug!("Task {task_id} failed at runtime: {e}");
                TaskOutcome::RuntimeError(e.diagnostic())
            }
        }
    }
}

fn print_task(name: &str, result: &TaskResult) {
    let line = format!(
        "Task {} ({name}): {}/{}",
        result.question_number, result.total_marks_awarded, result.total_maximum_marks
    );
    if result.not_implemented {
        println!("{}", format!("{line} not implemented").dimmed());
    } else if result.compile_error {
        println!("{}", format!("{line} compile error").red());
    } else if result.runtime_error {
        println!("{}", format!("{line} runtime error").yellow());
    } else if result.all_passed() {
        println!("{}", line.green());
    } else {
        println!("{line}");
    }
}
