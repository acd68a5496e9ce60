//! Static description of the gradable tasks, their sub-criteria, and mark weights.
//!
//! Each task carries the [`FragmentShape`] that tells the extractor and injector where its code
//! lives, so a new task only needs a new rubric entry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lexer::{locate, SourceMap};

#[derive(Error, Debug)]
pub enum RubricError {
    #[error("could not read rubric {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rubric is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rubric has no tasks")]
    Empty,
    #[error("task {task_id} ({name}) has an empty anchor")]
    EmptyAnchor { task_id: u32, name: String },
    #[error("sub-criterion {sub_id} does not belong to task {task_id}")]
    ForeignSubtask { task_id: u32, sub_id: String },
    #[error("task {task_id} has invalid marks: {marks}")]
    InvalidMarks { task_id: u32, marks: f64 },
    #[error("template has no region for task {task_id} ({name})")]
    MissingRegion { task_id: u32, name: String },
}

/// How a task's fragment sits in the source, and the declaration signature that anchors it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum FragmentShape {
    /// Everything between the braces of a method.
    MethodBody { anchor: String },
    /// The expression assigned to a field, e.g. a comparator lambda.
    FieldInitializer { anchor: String },
    /// The expression assigned in a single local declaration statement.
    StatementExpression { anchor: String },
}

impl FragmentShape {
    pub fn anchor(&self) -> &str {
        match self {
            FragmentShape::MethodBody { anchor }
            | FragmentShape::FieldInitializer { anchor }
            | FragmentShape::StatementExpression { anchor } => anchor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub marks: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub compilation_marks: f64,
    pub fragment: FragmentShape,
    pub subtasks: IndexMap<String, SubtaskSpec>,
}

impl TaskSpec {
    pub fn subtask_marks(&self) -> f64 {
        self.subtasks.values().map(|s| s.marks).sum()
    }

    pub fn total_maximum_marks(&self) -> f64 {
        self.subtask_marks() + self.compilation_marks
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rubric {
    tasks: BTreeMap<u32, TaskSpec>,
}

impl Rubric {
    pub fn new(tasks: BTreeMap<u32, TaskSpec>) -> Result<Self, RubricError> {
        let rubric = Self { tasks };
        rubric.validate()?;
        Ok(rubric)
    }

    pub fn from_path(path: &Path) -> Result<Self, RubricError> {
        let text = fs::read_to_string(path).map_err(|source| RubricError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, RubricError> {
        let rubric: Rubric = serde_json::from_str(text)?;
        rubric.validate()?;
        Ok(rubric)
    }

    fn validate(&self) -> Result<(), RubricError> {
        if self.tasks.is_empty() {
            return Err(RubricError::Empty);
        }
        for (&task_id, task) in &self.tasks {
            if task.fragment.anchor().trim().is_empty() {
                return Err(RubricError::EmptyAnchor {
                    task_id,
                    name: task.name.clone(),
                });
            }
            let prefix = format!("{task_id}.");
            let mut marks = std::iter::once(task.compilation_marks)
                .chain(task.subtasks.values().map(|s| s.marks));
            if let Some(bad) = marks.find(|m| !m.is_finite() || *m < 0.0) {
                return Err(RubricError::InvalidMarks {
                    task_id,
                    marks: bad,
                });
            }
            if let Some(sub_id) = task.subtasks.keys().find(|id| !id.starts_with(&prefix)) {
                return Err(RubricError::ForeignSubtask {
                    task_id,
                    sub_id: sub_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Every task must be locatable in the reference template before any grading starts.
    pub fn check_template(&self, template: &str) -> Result<(), RubricError> {
        let map = SourceMap::new(template);
        for (&task_id, task) in &self.tasks {
            if locate(&map, &task.fragment).is_none() {
                return Err(RubricError::MissingRegion {
                    task_id,
                    name: task.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Tasks in ascending id order.
    pub fn tasks(&self) -> impl Iterator<Item = (u32, &TaskSpec)> {
        self.tasks.iter().map(|(&id, task)| (id, task))
    }

    pub fn task(&self, task_id: u32) -> Option<&TaskSpec> {
        self.tasks.get(&task_id)
    }

    pub fn max_marks(&self) -> f64 {
        self.tasks.values().map(TaskSpec::total_maximum_marks).sum()
    }

    /// The RoomsService mid-semester rubric.
    pub fn builtin() -> Self {
        use FragmentShape::*;

        let tasks = [
            task(
                1,
                "compareTo",
                2.0,
                MethodBody {
                    anchor: "public int compareTo(Room other)".into(),
                },
                &[
                    (2.0, "Different capacities"),
                    (2.0, "Same capacity, different room numbers"),
                ],
            ),
            task(
                2,
                "equals",
                2.0,
                MethodBody {
                    anchor: "public boolean equals(Object o)".into(),
                },
                &[
                    (1.0, "Same building, different room number"),
                    (1.0, "Different building, same room number"),
                    (1.0, "Different building and room number"),
                    (1.0, "Same building and room number"),
                ],
            ),
            task(
                3,
                "BY_BUILDING_THEN_ROOM",
                2.0,
                FieldInitializer {
                    anchor: "public static final java.util.Comparator<Room> BY_BUILDING_THEN_ROOM"
                        .into(),
                },
                &[
                    (2.0, "Different buildings"),
                    (2.0, "Same building, different room numbers"),
                ],
            ),
            task(
                4,
                "addRoom",
                3.0,
                MethodBody {
                    anchor: "public ErrorCode addRoom(Room room)".into(),
                },
                &[
                    (1.0, "Invalid room number"),
                    (1.0, "Invalid capacity"),
                    (1.5, "Duplicate room"),
                    (1.0, "Add room to list"),
                    (1.5, "Initialize bookingsByRoomKey"),
                    (1.0, "Return OK"),
                ],
            ),
            task(
                5,
                "removeRoom",
                2.0,
                MethodBody {
                    anchor: "public ErrorCode removeRoom(Building building, String roomNumber)"
                        .into(),
                },
                &[
                    (2.0, "Remove from list"),
                    (2.0, "Remove from bookingsByRoomKey"),
                    (1.0, "Return OK"),
                    (1.0, "Return ROOM_NOT_FOUND"),
                ],
            ),
            task(
                6,
                "getRoom",
                1.5,
                MethodBody {
                    anchor: "public Room getRoom(Building building, String roomNumber)".into(),
                },
                &[(2.0, "Return room"), (1.5, "Return null")],
            ),
            task(
                7,
                "filterRooms",
                2.0,
                StatementExpression {
                    anchor: "RoomPredicate predicate".into(),
                },
                &[
                    (1.0, "Filter by capacity"),
                    (1.0, "Filter by building"),
                    (2.0, "Filter by projector"),
                    (2.0, "Filter by internet"),
                ],
            ),
            task(
                8,
                "bookRoom",
                3.0,
                MethodBody {
                    anchor: "public ErrorCode bookRoom".into(),
                },
                &[
                    (0.5, "Invalid hour"),
                    (0.5, "Room not found"),
                    (0.5, "Insufficient capacity"),
                    (0.5, "Projector not available"),
                    (0.5, "Internet not available"),
                    (0.5, "Already booked"),
                    (3.0, "Add to bookingsByRoomKey"),
                    (1.0, "Return OK"),
                ],
            ),
            task(
                9,
                "isAvailable",
                2.0,
                MethodBody {
                    anchor:
                        "public ErrorCode isAvailable(Building building, String roomNumber, int hour)"
                            .into(),
                },
                &[
                    (1.0, "Invalid hour"),
                    (1.0, "Room not found"),
                    (2.0, "Return OK if not booked"),
                    (2.0, "Return ALREADY_BOOKED if booked"),
                ],
            ),
            task(
                10,
                "getAvailableRoomsByHour",
                2.0,
                MethodBody {
                    anchor: "public List<Room> getAvailableRoomsByHour".into(),
                },
                &[
                    (1.0, "Invalid hour returns empty list"),
                    (2.0, "Filter rooms correctly"),
                    (3.0, "Return available rooms"),
                ],
            ),
        ];

        Self {
            tasks: tasks.into_iter().collect(),
        }
    }
}

fn task(
    task_id: u32,
    name: &str,
    compilation_marks: f64,
    fragment: FragmentShape,
    subtasks: &[(f64, &str)],
) -> (u32, TaskSpec) {
    let subtasks = subtasks
        .iter()
        .enumerate()
        .map(|(i, &(marks, description))| {
            (
                format!("{task_id}.{}", i + 1),
                SubtaskSpec {
                    marks,
                    description: description.to_string(),
                },
            )
        })
        .collect();

    (
        task_id,
        TaskSpec {
            name: name.to_string(),
            compilation_marks,
            fragment,
            subtasks,
        },
    )
}
