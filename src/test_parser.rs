use std::collections::HashMap;

use indexmap::IndexMap;

use crate::rubric::TaskSpec;
use crate::scorer::SubtaskResult;

// The harness prints, for every sub-criterion it checks:
//   TEST_CASE:<sub-id>
//   ...any diagnostic lines...
//   Result: PASS | FAIL
// A verdict belongs to the closest TEST_CASE above it; a marker with no verdict before the
// next marker (or the end of output) has no verdict at all.
const CASE_MARKER: &str = "TEST_CASE:";
const RESULT_MARKER: &str = "Result:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

/// Every verdict found in `stdout`, keyed by sub-criterion id. The first marker for an id wins.
pub fn scan_markers(stdout: &str) -> HashMap<String, Verdict> {
    let mut verdicts = HashMap::new();
    let mut current: Option<String> = None;

    for line in stdout.lines() {
        let mut rest = line;
        if let Some(idx) = line.find(CASE_MARKER) {
            let after = &line[idx + CASE_MARKER.len()..];
            let id_len = after.find(|c: char| c.is_whitespace()).unwrap_or(after.len());
            let id = &after[..id_len];
            current = if id.is_empty() || verdicts.contains_key(id) {
                None
            } else {
                Some(id.to_string())
            };
            rest = &after[id_len..];
        }

        if current.is_none() {
            continue;
        }
        if let Some(verdict) = parse_verdict(rest) {
            if let Some(id) = current.take() {
                verdicts.insert(id, verdict);
            }
        }
    }

    verdicts
}

fn parse_verdict(line: &str) -> Option<Verdict> {
    let idx = line.find(RESULT_MARKER)?;
    let word = line[idx + RESULT_MARKER.len()..].split_whitespace().next()?;

    match word {
        "PASS" => Some(Verdict::Pass),
        "FAIL" => Some(Verdict::Fail),
        _ => None,
    }
}

/// One entry per sub-criterion the rubric declares for `task`; absent markers count as failures.
pub fn parse(stdout: &str, task: &TaskSpec) -> IndexMap<String, SubtaskResult> {
    let verdicts = scan_markers(stdout);

    task.subtasks
        .iter()
        .map(|(id, spec)| {
            let passed = verdicts.get(id) == Some(&Verdict::Pass);
            (id.clone(), SubtaskResult::graded(spec.marks, passed))
        })
        .collect()
}
