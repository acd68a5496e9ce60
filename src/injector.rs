use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::lexer::{locate, SourceMap};
use crate::rubric::{FragmentShape, TaskSpec};

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("template has no region for task {task_id} ({name})")]
    RegionNotFound { task_id: u32, name: String },
}

/// Where spliced units are copied for later inspection. Writing there never affects grading.
#[derive(Debug, Clone)]
pub struct AuditSink {
    dir: PathBuf,
    identity: String,
    extension: String,
}

impl AuditSink {
    pub fn new(dir: &Path, identity: &str, extension: &str) -> Self {
        let identity = identity
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        Self {
            dir: dir.to_path_buf(),
            identity,
            extension: extension.to_string(),
        }
    }

    pub fn artifact_path(&self, task_id: u32) -> PathBuf {
        self.dir
            .join(format!("{}_task{task_id}.{}", self.identity, self.extension))
    }

    fn persist(&self, task_id: u32, unit: &str) {
        let path = self.artifact_path(task_id);
        match fs::write(&path, unit) {
            Ok(()) => debug!("Saved spliced unit to {path:?}"),
            Err(e) => warn!("Could not save spliced unit to {path:?}: {e}"),
        }
    }
}

/// Replaces task `task_id`'s region of `template` with `fragment`, leaving every other byte of the
/// template as it was.
pub fn inject(
    template: &str,
    task_id: u32,
    task: &TaskSpec,
    fragment: &str,
    audit: Option<&AuditSink>,
) -> Result<String, InjectError> {
    let map = SourceMap::new(template);
    let region = locate(&map, &task.fragment)
        .ok_or_else(|| InjectError::RegionNotFound {
            task_id,
            name: task.name.clone(),
        })?
        .region;

    let replacement = match task.fragment {
        FragmentShape::MethodBody { .. } => {
            // keep the template's indentation in front of the closing brace
            let body = &template[region.clone()];
            let closing = &body[body.trim_end().len()..];
            let closing = if closing.contains('\n') { closing } else { "\n" };
            format!("\n{fragment}{closing}")
        }
        FragmentShape::FieldInitializer { .. } | FragmentShape::StatementExpression { .. } => {
            format!(" {fragment}")
        }
    };

    let mut unit = String::with_capacity(template.len() + replacement.len());
    unit.push_str(&template[..region.start]);
    unit.push_str(&replacement);
    unit.push_str(&template[region.end..]);

    if let Some(audit) = audit {
        audit.persist(task_id, &unit);
    }

    Ok(unit)
}
