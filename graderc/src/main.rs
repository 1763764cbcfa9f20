use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use colored::Colorize;
use tracing::Level;

use grader::{
    Grade, Grader, GraderConfig, Harness, Outcome, Report, Submission, TestVector,
    REFERENCE_FRAGMENT,
};
use graderlib::{
    code::{class_file::ClassFile, debug::disassemble_class},
    CompilerOptions, Diagnostics, Severity, Template,
};
use gradervm::ClassResolver;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// Template file, the packaged `Solution.template` when omitted.
    #[arg(long)]
    template: Option<PathBuf>,

    /// File with the fragment to grade, the reference fragment when omitted.
    #[arg(long)]
    fragment: Option<PathBuf>,

    /// Class file version to compile to.
    #[arg(long)]
    target: Option<u16>,

    #[arg(long, default_value_t = false)]
    verbose: bool,

    #[arg(long, default_value_t = false)]
    debug_info: bool,

    #[arg(long, default_value_t = false)]
    json: bool,

    /// Print the bytecode of the compiled unit.
    #[arg(long, default_value_t = false)]
    disassemble: bool,

    /// Test vector as INPUT:EXPECTED, may be repeated.
    #[arg(long = "vector")]
    vectors: Vec<TestVector>,

    #[arg(long, default_value_t = Level::WARN)]
    log_level: Level,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let mut options = CompilerOptions {
        verbose: args.verbose,
        debug_info: args.debug_info,
        ..Default::default()
    };
    if let Some(target) = args.target {
        options.target = target;
    }
    let mut grader = Grader::new(GraderConfig {
        options,
        ..Default::default()
    })
    .wrap_err("invalid compiler options")?;
    if let Some(path) = &args.template {
        grader = grader.with_template(Template::from_path(path)?);
    }

    let fragment = match &args.fragment {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read fragment `{}`", path.display()))?,
        None => REFERENCE_FRAGMENT.to_owned(),
    };
    let harness = if args.vectors.is_empty() {
        Harness::default()
    } else {
        Harness::new(args.vectors.clone())
    };

    let submission = grader.new_impl(&fragment);
    if args.disassemble {
        disassemble(&submission, &grader.config().qualified_name())?;
    }
    let report = harness.run(submission.solution.as_ref());

    if args.json {
        let grade = Grade {
            report,
            diagnostics: submission.diagnostics,
        };
        println!("{}", serde_json::to_string_pretty(&grade)?);
        return Ok(());
    }
    print_report(&report);
    print_diagnostics(&submission.diagnostics);
    Ok(())
}

fn disassemble(submission: &Submission, qualified_name: &str) -> Result<()> {
    let Some(bytes) = submission.registry.find_resource(qualified_name) else {
        println!("{}", format!("// {qualified_name} was not compiled").dimmed());
        return Ok(());
    };
    let class = ClassFile::from_bytes(&bytes).wrap_err("compiled unit is malformed")?;
    println!("{}", disassemble_class(&class));
    Ok(())
}

fn print_report(report: &Report) {
    for verdict in &report.verdicts {
        let outcome = match verdict.outcome {
            Outcome::Correct => verdict.outcome.to_string().green(),
            Outcome::Incorrect => verdict.outcome.to_string().red(),
        };
        println!("{} -> {}", verdict.input, outcome);
        if let Some(err) = &verdict.error {
            println!("{}", err.dimmed());
        }
    }
    let summary = format!("{}/{} correct", report.passed, report.total);
    if report.fallback {
        println!("{} {}", summary.bold(), "(fallback solution)".yellow());
    } else {
        println!("{}", summary.bold());
    }
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics {
        let line = diagnostic.to_string();
        match diagnostic.severity {
            Severity::Error => eprintln!("{}", line.red()),
            Severity::Warning => eprintln!("{}", line.yellow()),
            Severity::Note => eprintln!("{}", line.dimmed()),
        }
    }
}
