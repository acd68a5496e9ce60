use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::rubric::Rubric;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Terminal coloring
    #[arg(short = 'c', long, value_parser = ["on", "off"], global = true)]
    pub color: Option<String>,

    /// Quiet (use -q through -qqq)
    #[arg(short = 'q', action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Debug information
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Grade a single submission file
    Evaluate(EvaluateArgs),
    /// Grade every student folder under a submissions directory
    Batch(BatchArgs),
    /// Compare two generations of reports and list changed marks as CSV
    Diff(DiffArgs),
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Student source file
    pub student: PathBuf,

    /// Directory for the report and spliced-source copies
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Produce autograder output
    #[arg(long)]
    pub autograder: bool,

    #[command(flatten)]
    pub grading: GradingArgs,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Directory holding one folder per student
    #[arg(short = 's', long, default_value = "student_solutions")]
    pub submissions: PathBuf,

    /// Directory receiving one report folder per student
    #[arg(short = 'o', long, default_value = "evaluation_reports")]
    pub output: PathBuf,

    /// Number of submissions to grade in parallel
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u32).range(1..), default_value = "1")]
    pub parallel: u32,

    #[command(flatten)]
    pub grading: GradingArgs,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Root of the older generation of reports
    #[arg(long, default_value = "input_old")]
    pub old: PathBuf,

    /// Root of the newer generation of reports
    #[arg(long, default_value = "input_new")]
    pub new: PathBuf,

    /// CSV file to write
    #[arg(short = 'o', long, default_value = "marks_changed_report.csv")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct GradingArgs {
    /// Reference template with the self-checking harness
    #[arg(short = 't', long, default_value = "solution/RoomsService.java")]
    pub template: PathBuf,

    /// Rubric JSON (defaults to the built-in RoomsService rubric)
    #[arg(short = 'r', long)]
    pub rubric: Option<PathBuf>,

    /// Compile command; {source}, {main} and {dir} are substituted
    #[arg(long, default_value = "javac {source}")]
    pub compile_cmd: String,

    /// Run command; {source}, {main} and {dir} are substituted
    #[arg(long, default_value = "java -cp {dir} {main}")]
    pub run_cmd: String,

    /// Compiler time limit (10 seconds)
    #[arg(long, value_parser = clap::value_parser!(u32), default_value = "10")]
    pub limit_compile: u32,

    /// Execution time limit (10 seconds)
    #[arg(long, value_parser = clap::value_parser!(u32), default_value = "10")]
    pub limit_run: u32,
}

impl GradingArgs {
    pub fn rubric(&self) -> Result<Rubric> {
        match &self.rubric {
            Some(path) => Rubric::from_path(path).with_context(|| format!("Bad rubric {path:?}")),
            None => Ok(Rubric::builtin()),
        }
    }

    /// Reads the template and checks that every rubric task can be spliced into it.
    pub fn template(&self, rubric: &Rubric) -> Result<String> {
        if !self.template.is_file() {
            bail!("Reference template {:?} not found", self.template);
        }
        let template = fs::read_to_string(&self.template)
            .with_context(|| format!("Failed to read template {:?}", self.template))?;
        rubric
            .check_template(&template)
            .with_context(|| format!("Template {:?} does not fit the rubric", self.template))?;

        Ok(template)
    }

    pub fn toolchain(&self) -> Result<Toolchain> {
        let source_name = self
            .template
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Template path {:?} has no file name", self.template))?;

        Ok(Toolchain {
            compile: split_command(&self.compile_cmd)?,
            run: split_command(&self.run_cmd)?,
            source_name: source_name.to_string(),
            compile_limit: Duration::from_secs(self.limit_compile.into()),
            run_limit: Duration::from_secs(self.limit_run.into()),
        })
    }
}

fn split_command(cmd: &str) -> Result<Vec<String>> {
    let argv: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        bail!("Expected a command, got an empty string");
    }
    Ok(argv)
}

/// External compiler and runtime used for every spliced unit.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub compile: Vec<String>,
    pub run: Vec<String>,
    /// File name the spliced unit is written under inside the scratch directory.
    pub source_name: String,
    pub compile_limit: Duration,
    pub run_limit: Duration,
}

impl Toolchain {
    pub fn java(source_name: &str) -> Self {
        Self {
            compile: vec!["javac".into(), "{source}".into()],
            run: vec!["java".into(), "-cp".into(), "{dir}".into(), "{main}".into()],
            source_name: source_name.to_string(),
            compile_limit: Duration::from_secs(10),
            run_limit: Duration::from_secs(10),
        }
    }

    pub fn main_name(&self) -> &str {
        Path::new(&self.source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.source_name)
    }

    pub fn extension(&self) -> &str {
        Path::new(&self.source_name)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("txt")
    }

    pub fn expand(&self, argv: &[String], dir: &Path) -> Vec<String> {
        let dir = dir.to_string_lossy();
        argv.iter()
            .map(|arg| {
                arg.replace("{source}", &self.source_name)
                    .replace("{main}", self.main_name())
                    .replace("{dir}", &dir)
            })
            .collect()
    }
}

impl Cli {
    pub fn init_logging(&self) {
        let default = if self.debug {
            "debug"
        } else if self.quiet > 0 {
            "error"
        } else {
            "warn"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        // a subscriber may already be installed when embedded
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    pub fn apply_color(&self) {
        match self.color.as_deref() {
            Some("on") => colored::control::set_override(true),
            Some("off") => colored::control::set_override(false),
            _ => {}
        }
    }
}
