use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use std::{fmt, fs, io};

use tempdir::TempDir;
use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::config::Toolchain;

pub const TIMEOUT_SENTINEL: &str = "Execution timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => write!(f, "compilation"),
            Stage::Run => write!(f, "execution"),
        }
    }
}

/// How a finished child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Termination::Exited(code),
            (None, Some(signal)) => Termination::Signaled(signal),
            (None, None) => Termination::Exited(-1),
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Termination::Exited(code) => write!(f, "exit code {code}"),
            Termination::Signaled(signal) => match signal_name(signal) {
                Some(name) => write!(f, "signal {name}"),
                None => write!(f, "signal {signal}"),
            },
        }
    }
}

fn signal_name(signal: i32) -> Option<&'static str> {
    Some(match signal {
        libc::SIGABRT => "SIGABRT",
        libc::SIGBUS => "SIGBUS",
        libc::SIGFPE => "SIGFPE",
        libc::SIGILL => "SIGILL",
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGTERM => "SIGTERM",
        _ => return None,
    })
}

/// Output of a program that compiled, ran, and exited cleanly within its time limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Error, Debug)]
pub enum ToolingError {
    #[error("compiler failed with {status}")]
    Compile {
        status: Termination,
        stdout: String,
        stderr: String,
    },
    #[error("{stage} exceeded {}s", .limit.as_secs_f32())]
    Timeout { stage: Stage, limit: Duration },
    #[error("program failed with {status}")]
    Runtime {
        status: Termination,
        stdout: String,
        stderr: String,
    },
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("empty {0} command")]
    EmptyCommand(Stage),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ToolingError {
    /// Everything except a failing or hanging program counts as "did not compile".
    pub fn is_compile_failure(&self) -> bool {
        !matches!(
            self,
            ToolingError::Runtime { .. }
                | ToolingError::Timeout {
                    stage: Stage::Run,
                    ..
                }
        )
    }

    /// Text worth showing to the student.
    pub fn diagnostic(&self) -> String {
        match self {
            ToolingError::Compile { stdout, stderr, .. }
            | ToolingError::Runtime { stdout, stderr, .. } => {
                let text = if stderr.trim().is_empty() { stdout } else { stderr };
                if text.trim().is_empty() {
                    self.to_string()
                } else {
                    text.clone()
                }
            }
            ToolingError::Timeout { .. } => TIMEOUT_SENTINEL.to_string(),
            other => other.to_string(),
        }
    }
}

struct Captured {
    /// `None` when the process was killed for exceeding its limit.
    status: Option<ExitStatus>,
    stdout: String,
    stderr: String,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // a partial read still leaves whatever arrived in buf
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn kill_group(pgid: libc::pid_t) {
    // SAFETY: killpg only sends a signal; a group that already exited yields ESRCH.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        debug!("killpg({pgid}): {}", io::Error::last_os_error());
    }
}

fn execute(argv: &[String], dir: &Path, limit: Duration, stage: Stage) -> Result<Captured, ToolingError> {
    let (program, args) = argv.split_first().ok_or(ToolingError::EmptyCommand(stage))?;
    debug!("Running {stage}: {argv:?} (limit {limit:?})");

    // Own process group, so descendants holding the pipes die with the child.
    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|source| ToolingError::Spawn {
            program: program.clone(),
            source,
        })?;
    let pgid = child.id() as libc::pid_t;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match child.wait_timeout(limit) {
        Ok(Some(status)) => Some(status),
        Ok(None) => {
            kill_group(pgid);
            child.wait()?;
            None
        }
        Err(e) => {
            kill_group(pgid);
            if let Err(reap) = child.wait() {
                debug!("Reaping after failed wait: {reap}");
            }
            let _ = (stdout.join(), stderr.join());
            return Err(e.into());
        }
    };
    // Background descendants must not outlive the stage.
    kill_group(pgid);

    Ok(Captured {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

/// Compiles and runs `unit` in a private scratch directory that is removed before returning.
pub fn run(unit: &str, toolchain: &Toolchain) -> Result<ProcessOutcome, ToolingError> {
    let scratch = TempDir::new("rubric_grader")?;
    let dir = scratch.path();
    fs::write(dir.join(&toolchain.source_name), unit)?;

    let compiled = execute(
        &toolchain.expand(&toolchain.compile, dir),
        dir,
        toolchain.compile_limit,
        Stage::Compile,
    )?;
    match compiled.status {
        None => {
            return Err(ToolingError::Timeout {
                stage: Stage::Compile,
                limit: toolchain.compile_limit,
            })
        }
        Some(status) if !status.success() => {
            return Err(ToolingError::Compile {
                status: status.into(),
                stdout: compiled.stdout,
                stderr: compiled.stderr,
            })
        }
        Some(_) => {}
    }

    let ran = execute(
        &toolchain.expand(&toolchain.run, dir),
        dir,
        toolchain.run_limit,
        Stage::Run,
    )?;
    match ran.status {
        None => Err(ToolingError::Timeout {
            stage: Stage::Run,
            limit: toolchain.run_limit,
        }),
        Some(status) if !status.success() => Err(ToolingError::Runtime {
            status: status.into(),
            stdout: ran.stdout,
            stderr: ran.stderr,
        }),
        Some(_) => Ok(ProcessOutcome {
            stdout: ran.stdout,
            stderr: ran.stderr,
        }),
    }
}
