use anyhow::Context;
use clap::Parser;
use nowtaint::AnalysisEngine;
use nowtaint::cli::{AnalyzeArgs, Args, Command, OutputFormat};
use nowtaint::config::{self, TaintConfig};
use nowtaint::diagnostics::Diagnostic;
use nowtaint::instrument_block;
use nowtaint::ir::Program;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    nowtaint::telemetry::init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Some(Command::Dump { programs }) => dump_command(&programs),
        Some(Command::Analyze(analyze)) => analyze_command(analyze),
        None => analyze_command(args.analyze),
    }
}

fn dump_command(programs: &[PathBuf]) -> anyhow::Result<ExitCode> {
    for path in programs {
        let program = load_program(path)?;
        print!("{program}");
    }
    Ok(ExitCode::SUCCESS)
}

fn analyze_command(args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let start_dir = infer_start_dir(&args)?;
    let loaded_cfg = config::load_config(args.config.as_deref(), &start_dir)?;
    let cfg = match loaded_cfg {
        Some((_path, cfg)) => cfg,
        None => TaintConfig::default(),
    };
    cfg.validate()?;
    let engine = AnalysisEngine::new(cfg);

    let mut total_diags = 0usize;

    match args.format {
        OutputFormat::Json => {
            let mut out: Vec<JsonDiagnostic> = Vec::new();

            if args.programs.is_empty() {
                let program = load_program_stdin()?;
                collect_json(&engine, &program, &mut out)?;
            } else {
                for path in &args.programs {
                    let program = load_program(path)?;
                    collect_json(&engine, &program, &mut out)?;
                }
            }

            total_diags = out.len();
            out.sort_by(|a, b| {
                (a.file.as_str(), a.line, a.column, a.callee.as_str()).cmp(&(
                    b.file.as_str(),
                    b.line,
                    b.column,
                    b.callee.as_str(),
                ))
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Pretty | OutputFormat::Github => {
            if args.programs.is_empty() {
                let program = load_program_stdin()?;
                total_diags +=
                    render_text(&engine, &program, "stdin", args.format, args.deny_warnings)?;
            } else {
                for path in &args.programs {
                    let program = load_program(path)?;
                    let label = path.display().to_string();
                    total_diags +=
                        render_text(&engine, &program, &label, args.format, args.deny_warnings)?;
                }
            }
        }
    }

    if args.deny_warnings && total_diags > 0 {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Debug, Serialize)]
struct JsonDiagnostic {
    file: String,
    line: u32,
    column: u32,
    callee: String,
    message: String,
}

fn collect_json(
    engine: &AnalysisEngine,
    program: &Program,
    out: &mut Vec<JsonDiagnostic>,
) -> anyhow::Result<()> {
    let diagnostics = analyze(engine, program)?;
    out.extend(diagnostics.into_iter().map(|d| JsonDiagnostic {
        file: d.position.file,
        line: d.position.line,
        column: d.position.column,
        callee: d.callee,
        message: d.message,
    }));
    Ok(())
}

fn render_text(
    engine: &AnalysisEngine,
    program: &Program,
    label: &str,
    format: OutputFormat,
    deny_warnings: bool,
) -> anyhow::Result<usize> {
    let diagnostics = analyze(engine, program)?;

    match format {
        OutputFormat::Pretty => {
            for diag in &diagnostics {
                println!("{}: warning: {}", diag.position, diag.message);
            }
            println!("{} diagnostics for {}", diagnostics.len(), label);
        }
        OutputFormat::Github => {
            let kind = if deny_warnings { "error" } else { "warning" };
            for diag in &diagnostics {
                println!(
                    "::{} file={},line={},col={},title=nowtaint::{}",
                    kind,
                    github_escape(&diag.position.file),
                    diag.position.line,
                    diag.position.column,
                    github_escape(&diag.message)
                );
            }
        }
        OutputFormat::Json => unreachable!("json handled elsewhere"),
    }

    Ok(diagnostics.len())
}

fn analyze(engine: &AnalysisEngine, program: &Program) -> anyhow::Result<Vec<Diagnostic>> {
    instrument_block!("analyze", {
        engine.analyze(program).map_err(|e| e.into_anyhow())
    })
}

fn load_program(path: &Path) -> anyhow::Result<Program> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read program dump: {}", path.display()))?;
    Program::from_json(&raw)
        .map_err(|e| e.into_anyhow())
        .with_context(|| format!("failed to load program dump: {}", path.display()))
}

fn load_program_stdin() -> anyhow::Result<Program> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    Program::from_json(&raw)
        .map_err(|e| e.into_anyhow())
        .context("failed to load program dump from stdin")
}

fn github_escape(s: &str) -> String {
    s.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn infer_start_dir(args: &AnalyzeArgs) -> anyhow::Result<PathBuf> {
    let base = if let Some(p) = args.programs.first() {
        p.clone()
    } else {
        std::env::current_dir()?
    };

    let base = if base.is_file() {
        base.parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        base
    };

    Ok(base)
}
