use regex::Regex;
use tracing::debug;

use crate::lexer::{locate, SourceMap};
use crate::report::{StudentInfo, NOT_PROVIDED};
use crate::rubric::TaskSpec;

/// Fragments shorter than this are treated as left unimplemented.
const MIN_FRAGMENT_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub fragment: String,
    pub not_implemented: bool,
}

impl Extraction {
    fn missing() -> Self {
        Self {
            fragment: String::new(),
            not_implemented: true,
        }
    }
}

/// Pulls one task's student-written fragment out of `source`.
///
/// Never fails: an absent, empty, comment-only, or implausibly short fragment comes back as
/// `not_implemented`. The fragment text is returned verbatim apart from its outer whitespace.
pub fn extract(source: &str, task: &TaskSpec) -> Extraction {
    let map = SourceMap::new(source);
    let Some(span) = locate(&map, &task.fragment) else {
        debug!("No region for {} found in submission", task.name);
        return Extraction::missing();
    };

    if map.is_blank(span.fragment.clone()) {
        debug!("Region for {} holds only a placeholder", task.name);
        return Extraction::missing();
    }
    let fragment = &source[span.fragment];
    if fragment.chars().count() < MIN_FRAGMENT_LEN {
        return Extraction::missing();
    }

    Extraction {
        fragment: fragment.to_string(),
        not_implemented: false,
    }
}

/// Reads the `Name:` / `ID Number:` / `Lab Number:` / `System Number:` header lines.
pub fn extract_student_info(source: &str) -> StudentInfo {
    StudentInfo {
        name: header_field(source, "Name"),
        id_number: header_field(source, "ID Number"),
        lab_number: header_field(source, "Lab Number"),
        system_number: header_field(source, "System Number"),
    }
}

fn header_field(source: &str, label: &str) -> String {
    // The value never runs past the end of its own line.
    let pattern = format!(r"(?m)^[\s*/]*{}:[ \t]*(.*)$", regex::escape(label));
    Regex::new(&pattern)
        .ok()
        .and_then(|re| {
            re.captures_iter(source)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim())
                .find(|v| !v.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| NOT_PROVIDED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::Rubric;

    const SUBMISSION: &str = r#"/**
 * PLEASE DO NOT FORGET TO FILL IN THE FOLLOWING FIELDS:
 * Name: Ada Lovelace
 * ID Number: 2023A7PS0001
 * Lab Number:
 * System Number: 42
*/
public class RoomsService {
  public static class Room implements Comparable<Room> {
    public int compareTo(Room other) {
      if (other == null) return 1;
      int cap = Integer.compare(this.capacity, other.capacity);
      if (cap != 0) { return cap; }
      return this.roomNumber.compareTo(other.roomNumber);
    }

    public boolean equals(Object o) {
      /* Write your code here */
    }

    public static final class Comparators {
      public static final java.util.Comparator<Room> BY_BUILDING_THEN_ROOM =
      /* Write your code here */
    }
  }

  public Room getRoom(Building building, String roomNumber) {
    return null;
  }

  public List<Room> filterRooms(Integer minCapacity, Building building) {
    RoomPredicate predicate = r ->
      (minCapacity == null || r.getCapacity() >= minCapacity) &&
      (building == null || r.getBuilding() == building);
    return out;
  }

  public ErrorCode removeRoom(Building building, String roomNumber) {
    ;
  }
}
"#;

    fn extract_task(task_id: u32) -> Extraction {
        let rubric = Rubric::builtin();
        extract(SUBMISSION, rubric.task(task_id).unwrap())
    }

    #[test]
    fn method_body_keeps_inner_braces_and_whitespace() {
        let extraction = extract_task(1);
        assert!(!extraction.not_implemented);
        assert_eq!(
            extraction.fragment,
            "if (other == null) return 1;\n      int cap = Integer.compare(this.capacity, other.capacity);\n      if (cap != 0) { return cap; }\n      return this.roomNumber.compareTo(other.roomNumber);"
        );
    }

    #[test]
    fn placeholder_comment_is_not_implemented() {
        assert_eq!(extract_task(2), Extraction::missing());
    }

    #[test]
    fn unterminated_field_initializer_is_not_implemented() {
        assert!(extract_task(3).not_implemented);
    }

    #[test]
    fn absent_method_is_not_implemented() {
        assert!(extract_task(4).not_implemented);
    }

    #[test]
    fn short_body_is_not_implemented() {
        assert!(extract_task(5).not_implemented);
    }

    #[test]
    fn statement_expression() {
        let extraction = extract_task(7);
        assert_eq!(
            extraction.fragment,
            "r ->\n      (minCapacity == null || r.getCapacity() >= minCapacity) &&\n      (building == null || r.getBuilding() == building)"
        );
    }

    #[test]
    fn short_but_real_body_is_kept() {
        assert_eq!(extract_task(6).fragment, "return null;");
    }

    #[test]
    fn student_header() {
        let info = extract_student_info(SUBMISSION);
        assert_eq!(info.name, "Ada Lovelace");
        assert_eq!(info.id_number, "2023A7PS0001");
        assert_eq!(info.lab_number, NOT_PROVIDED);
        assert_eq!(info.system_number, "42");
    }

    #[test]
    fn empty_header_does_not_spill_into_next_line() {
        let info = extract_student_info("/**\n * Name:\n * ID Number: 7\n */");
        assert_eq!(info.name, NOT_PROVIDED);
        assert_eq!(info.id_number, "7");
    }

    #[test]
    fn missing_header_uses_sentinel() {
        assert_eq!(extract_student_info("class A {}"), StudentInfo::default());
    }
}
