use std::fs;

use anyhow::{bail, Context};
use colored::Colorize;

use config::{BatchArgs, Cli, Commands, DiffArgs, EvaluateArgs};
use evaluator::Evaluator;
use report::REPORT_FILENAME;
use summary::{BatchSummary, SUMMARY_FILENAME};

pub mod batch;
pub mod config;
pub mod diff;
pub mod evaluator;
pub mod extractor;
pub mod injector;
pub mod lexer;
pub mod report;
pub mod rubric;
pub mod runner;
pub mod scorer;
pub mod summary;
pub mod test_parser;

pub fn run(cli: Cli) -> anyhow::Result<()> {
    cli.init_logging();
    cli.apply_color();
    let quiet = cli.quiet > 0;

    match cli.command {
        Commands::Evaluate(args) => evaluate_cmd(args, quiet),
        Commands::Batch(args) => batch_cmd(args, quiet),
        Commands::Diff(args) => diff_cmd(args),
    }
}

fn evaluate_cmd(args: EvaluateArgs, quiet: bool) -> anyhow::Result<()> {
    let rubric = args.grading.rubric()?;
    let template = args.grading.template(&rubric)?;
    let toolchain = args.grading.toolchain()?;
    let source = fs::read_to_string(&args.student)
        .with_context(|| format!("Failed to read submission {:?}", args.student))?;

    if let Some(output) = &args.output {
        fs::create_dir_all(output).with_context(|| format!("Failed to create {output:?}"))?;
    }

    let evaluator = Evaluator::new(&rubric, &template, &toolchain).quiet(quiet);
    let report = evaluator.evaluate(&source, args.output.as_deref());

    println!(
        "Score: {}/{} ({}%)",
        report.total_marks, report.max_marks, report.percentage
    );

    if let Some(output) = &args.output {
        let path = output.join(REPORT_FILENAME);
        report.save(&path)?;
        println!("Report saved to {}", path.display());
    }

    if args.autograder {
        println!("{}", report.to_json()?);
    }

    Ok(())
}

fn batch_cmd(args: BatchArgs, quiet: bool) -> anyhow::Result<()> {
    if !args.submissions.is_dir() {
        bail!("Submissions directory {:?} not found", args.submissions);
    }
    let rubric = args.grading.rubric()?;
    let template = args.grading.template(&rubric)?;
    let toolchain = args.grading.toolchain()?;

    let evaluator = Evaluator::new(&rubric, &template, &toolchain).quiet(quiet);
    let reports = batch::run_batch(
        &evaluator,
        &args.submissions,
        &args.output,
        args.parallel as usize,
    )?;

    let summary = BatchSummary::from_reports(&reports);
    let path = args.output.join(SUMMARY_FILENAME);
    summary.save(&path)?;

    println!("\n{}", "Batch evaluation complete".bold());
    println!("Students evaluated: {}", summary.total_students);
    println!(
        "Average score: {}%",
        summary.overall_stats.average_percentage
    );
    println!("Summary saved to {}", path.display());

    Ok(())
}

fn diff_cmd(args: DiffArgs) -> anyhow::Result<()> {
    diff::run_diff(&args.old, &args.new, &args.output)?;
    Ok(())
}
