//! Drives the whole grading pipeline with `sh` and `cat` standing in for the compiler and the
//! program, so the spliced unit's own text decides what the "harness" prints.
#![cfg(unix)]

use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempdir::TempDir;

use rubric_grader::batch::run_batch;
use rubric_grader::config::Toolchain;
use rubric_grader::diff::run_diff;
use rubric_grader::evaluator::Evaluator;
use rubric_grader::report::{SubmissionReport, REPORT_FILENAME};
use rubric_grader::rubric::{FragmentShape, Rubric, SubtaskSpec, TaskSpec};
use rubric_grader::summary::BatchSummary;

const TEMPLATE: &str = "\
public class Unit {
  public int first() {
    return 0;
  }

  public int second() {
    return 0;
  }
}
";

fn task(name: &str, anchor: &str, bonus: f64, subtasks: &[(&str, f64)]) -> TaskSpec {
    TaskSpec {
        name: name.to_string(),
        compilation_marks: bonus,
        fragment: FragmentShape::MethodBody {
            anchor: anchor.to_string(),
        },
        subtasks: subtasks
            .iter()
            .map(|&(id, marks)| {
                (
                    id.to_string(),
                    SubtaskSpec {
                        marks,
                        description: format!("case {id}"),
                    },
                )
            })
            .collect(),
    }
}

fn rubric() -> Rubric {
    let tasks: BTreeMap<u32, TaskSpec> = [
        (1, task("first", "public int first()", 2.0, &[("1.1", 2.0), ("1.2", 1.0)])),
        (2, task("second", "public int second()", 1.0, &[("2.1", 1.0)])),
    ]
    .into_iter()
    .collect();
    Rubric::new(tasks).unwrap()
}

fn toolchain() -> Toolchain {
    Toolchain {
        compile: vec![
            "sh".into(),
            "-c".into(),
            "if grep -q BROKEN {source}; then echo '{source}:3: error: BROKEN' >&2; exit 1; fi"
                .into(),
        ],
        run: vec!["cat".into(), "{source}".into()],
        source_name: "Unit.java".to_string(),
        compile_limit: Duration::from_secs(5),
        run_limit: Duration::from_secs(5),
    }
}

fn submission(first: &str, second: &str) -> String {
    format!(
        "// Name: Ada Lovelace\n// ID Number: 1815\n\
         public class Unit {{\n  public int first() {{\n{first}\n  }}\n\n  \
         public int second() {{\n{second}\n  }}\n}}\n"
    )
}

const FIRST_OK: &str = "    // TEST_CASE:1.1 Result: PASS\n    // TEST_CASE:1.2 Result: PASS\n    return 1;";
const SECOND_OK: &str = "    // TEST_CASE:2.1 Result: PASS\n    return 2;";

fn grade(source: &str) -> SubmissionReport {
    let rubric = rubric();
    let toolchain = toolchain();
    rubric.check_template(TEMPLATE).unwrap();
    Evaluator::new(&rubric, TEMPLATE, &toolchain)
        .quiet(true)
        .evaluate(source, None)
}

#[test]
fn full_marks() {
    let report = grade(&submission(FIRST_OK, SECOND_OK));

    assert_eq!(report.student_info.name, "Ada Lovelace");
    assert_eq!(report.student_info.id_number, "1815");
    assert_eq!(report.student_info.lab_number, "Not Provided");
    assert_eq!(report.total_marks, 7.0);
    assert_eq!(report.max_marks, 7.0);
    assert_eq!(report.percentage, 100.0);
    assert_eq!(report.tasks["task_1"].compilation_marks_awarded, 2.0);
    assert_eq!(report.tasks["task_2"].total_marks_awarded, 2.0);
}

#[test]
fn one_failing_case_forfeits_the_bonus() {
    let first = FIRST_OK.replace("1.2 Result: PASS", "1.2 Result: FAIL");
    let report = grade(&submission(&first, SECOND_OK));

    let task = &report.tasks["task_1"];
    assert!(!task.compile_error);
    assert!(task.subtasks["1.1"].passed);
    assert!(!task.subtasks["1.2"].passed);
    assert_eq!(task.compilation_marks_awarded, 0.0);
    assert_eq!(task.total_marks_awarded, 2.0);
    assert_eq!(report.total_marks, 4.0);
    assert_eq!(report.percentage, 57.14);
}

#[test]
fn missing_marker_is_a_failure() {
    let first = "    // TEST_CASE:1.1 Result: PASS\n    return 1;";
    let report = grade(&submission(first, SECOND_OK));

    let task = &report.tasks["task_1"];
    assert!(!task.subtasks["1.2"].passed);
    assert_eq!(task.total_marks_awarded, 2.0);
}

#[test]
fn compile_error_only_affects_its_task() {
    let first = format!("{FIRST_OK}\n    BROKEN");
    let report = grade(&submission(&first, SECOND_OK));

    let broken = &report.tasks["task_1"];
    assert!(broken.compile_error);
    assert!(!broken.runtime_error);
    assert_eq!(broken.total_marks_awarded, 0.0);
    assert_eq!(broken.total_maximum_marks, 5.0);
    assert_eq!(broken.error.as_deref(), Some("Unit.java:3: error: BROKEN\n"));
    assert!(broken.subtasks.values().all(|s| !s.passed));

    assert_eq!(report.tasks["task_2"].total_marks_awarded, 2.0);
    assert_eq!(report.total_marks, 2.0);
}

#[test]
fn failing_program_is_a_runtime_error() {
    let rubric = rubric();
    let mut toolchain = toolchain();
    toolchain.run = vec!["sh".into(), "-c".into(), "cat {source}; echo crashed >&2; exit 3".into()];

    let report = Evaluator::new(&rubric, TEMPLATE, &toolchain)
        .quiet(true)
        .evaluate(&submission(FIRST_OK, SECOND_OK), None);

    for task in report.tasks.values() {
        assert!(task.runtime_error);
        assert!(!task.compile_error);
        assert!(!task.not_implemented);
        assert_eq!(task.error.as_deref(), Some("crashed\n"));
        assert_eq!(task.total_marks_awarded, 0.0);
    }
    assert_eq!(report.total_marks, 0.0);
}

#[test]
fn hanging_program_times_out() {
    let rubric = rubric();
    let mut toolchain = toolchain();
    toolchain.run = vec!["sleep".into(), "5".into()];
    toolchain.run_limit = Duration::from_millis(200);

    let report = Evaluator::new(&rubric, TEMPLATE, &toolchain)
        .quiet(true)
        .evaluate(&submission(FIRST_OK, SECOND_OK), None);

    let task = &report.tasks["task_1"];
    assert!(task.runtime_error);
    assert_eq!(task.error.as_deref(), Some("Execution timeout"));
}

#[test]
fn placeholder_body_is_not_implemented() {
    let report = grade(&submission(FIRST_OK, "    // Write your code here"));

    let task = &report.tasks["task_2"];
    assert!(task.not_implemented);
    assert!(!task.compile_error);
    assert_eq!(task.error, None);
    assert_eq!(task.total_marks_awarded, 0.0);
    assert_eq!(report.total_marks, 5.0);
}

#[test]
fn spliced_units_are_kept_for_audit() {
    let rubric = rubric();
    let toolchain = toolchain();
    let audit = TempDir::new("audit").unwrap();

    Evaluator::new(&rubric, TEMPLATE, &toolchain)
        .quiet(true)
        .evaluate(&submission(FIRST_OK, SECOND_OK), Some(audit.path()));

    let first = fs::read_to_string(audit.path().join("Ada_Lovelace_task1.java")).unwrap();
    assert!(first.contains("TEST_CASE:1.1 Result: PASS"));
    assert!(!first.contains("TEST_CASE:2.1"));
    assert!(first.contains("public int second() {\n    return 0;\n  }"));
    assert!(audit.path().join("Ada_Lovelace_task2.java").exists());
}

#[test]
fn grading_is_repeatable() {
    let source = submission(FIRST_OK, "    // TEST_CASE:2.1 Result: FAIL\n    return 2;");
    let once = grade(&source).to_json().unwrap();
    let twice = grade(&source).to_json().unwrap();
    assert_eq!(once, twice);
}

#[test]
fn batch_then_diff() {
    let rubric = rubric();
    let toolchain = toolchain();
    let evaluator = Evaluator::new(&rubric, TEMPLATE, &toolchain).quiet(true);
    let root = TempDir::new("batch").unwrap();

    let write = |generation: &str, student: &str, source: &str| {
        let dir = root.path().join(generation).join(student);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Unit.java"), source).unwrap();
    };
    write("old", "s01", &submission(FIRST_OK, SECOND_OK));
    write("old", "s02", &submission(FIRST_OK, "    // TODO"));
    write("new", "s01", &submission(FIRST_OK, SECOND_OK));
    write("new", "s02", &submission(FIRST_OK, SECOND_OK));

    let old_out = root.path().join("old_reports");
    let new_out = root.path().join("new_reports");
    let old = run_batch(&evaluator, &root.path().join("old"), &old_out, 2).unwrap();
    let new = run_batch(&evaluator, &root.path().join("new"), &new_out, 2).unwrap();

    assert_eq!(old.keys().collect::<Vec<_>>(), ["s01", "s02"]);
    assert!(old_out.join("s01").join(REPORT_FILENAME).is_file());
    assert!(old_out.join("s01").join("Unit.java").is_file());
    assert!(old_out.join("s02").join("Ada_Lovelace_task1.java").is_file());

    let summary = BatchSummary::from_reports(&old);
    assert_eq!(summary.total_students, 2);
    assert_eq!(summary.overall_stats.total_marks, 12.0);
    assert_eq!(summary.overall_stats.max_marks, 14.0);
    assert_eq!(summary.overall_stats.average_percentage, 85.71);
    assert_eq!(new["s02"].total_marks, 7.0);

    let csv = root.path().join("changes.csv");
    assert_eq!(run_diff(&old_out, &new_out, &csv).unwrap(), 2);
    assert_eq!(
        fs::read_to_string(&csv).unwrap(),
        "Student Name,ID Number,Criterion,Old Marks,New Marks,Difference\n\
         Ada Lovelace,1815,2 (compilation),0.0,1.0,+1.0\n\
         Ada Lovelace,1815,2.1,0.0,1.0,+1.0\n"
    );
}
