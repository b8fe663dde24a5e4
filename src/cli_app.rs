//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use pdf_redactor::core::config::Config;
use pdf_redactor::core::errors::RedactError;
use pdf_redactor::document::OutputOptions;
use pdf_redactor::document::manifest::ManifestOpener;
use pdf_redactor::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use pdf_redactor::logger::jsonl::JsonlConfig;
use pdf_redactor::pipeline::Pipeline;
use pdf_redactor::pipeline::batch::{
    BatchOptions, BatchRunner, BatchSummary, FileOutcome, discover_inputs,
};

/// Context-aware PDF redaction engine.
#[derive(Debug, Parser)]
#[command(
    name = "pdfr",
    author,
    version,
    about = "Context-aware redaction of sensitive text and logos",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Preview what would be redacted without modifying anything.
    Scan(ScanArgs),
    /// Redact documents and write the results to an output directory.
    Process(ProcessArgs),
    /// View and validate configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Args)]
struct InputArgs {
    /// Document manifests, or directories holding them.
    #[arg(value_name = "PATH", required = true)]
    inputs: Vec<PathBuf>,
    /// File extension picked up from directories.
    #[arg(long, default_value = "json", value_name = "EXT")]
    ext: String,
    /// Worker threads (defaults to `processing.max_workers`).
    #[arg(long, value_name = "N")]
    workers: Option<usize>,
    /// Do not write the JSONL activity log.
    #[arg(long)]
    no_log: bool,
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    #[command(flatten)]
    input: InputArgs,
}

#[derive(Debug, Clone, Args)]
struct ProcessArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Directory receiving redacted documents.
    #[arg(long, short = 'o', value_name = "DIR")]
    output_dir: PathBuf,
    /// Detect and report only; nothing is applied or saved.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate the configuration and print its hash.
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Some files in the batch failed.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Scan(args) => run_batch(cli, &args.input, None, true),
        Command::Process(args) => {
            run_batch(cli, &args.input, Some(args.output_dir.as_path()), args.dry_run)
        }
        Command::Config(args) => run_config(cli, args),
    }
}

// ---------------------------------------------------------------------------
// scan / process
// ---------------------------------------------------------------------------

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::User(e.to_string()))
}

fn collect_inputs(args: &InputArgs) -> Result<Vec<PathBuf>, CliError> {
    let mut inputs = Vec::new();
    for path in &args.inputs {
        if path.is_dir() {
            let found =
                discover_inputs(path, &args.ext).map_err(|e| CliError::Runtime(e.to_string()))?;
            inputs.extend(found);
        } else {
            inputs.push(path.clone());
        }
    }
    if inputs.is_empty() {
        return Err(CliError::User(format!(
            "no *.{} inputs found under the given paths",
            args.ext
        )));
    }
    Ok(inputs)
}

fn start_logger(
    config: &Config,
    disabled: bool,
) -> (Option<ActivityLoggerHandle>, Option<JoinHandle<()>>) {
    if disabled {
        return (None, None);
    }
    match spawn_logger(JsonlConfig::at(&config.paths.jsonl_log)) {
        Ok((handle, join)) => (Some(handle), Some(join)),
        Err(e) => {
            eprintln!("[PDFR-LOG] activity log disabled: {e}");
            (None, None)
        }
    }
}

fn stop_logger(handle: Option<ActivityLoggerHandle>, join: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        handle.shutdown();
    }
    if let Some(join) = join {
        let _ = join.join();
    }
}

fn run_batch(
    cli: &Cli,
    args: &InputArgs,
    output_dir: Option<&Path>,
    preview: bool,
) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let inputs = collect_inputs(args)?;
    let config_hash = config
        .stable_hash()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let (pipeline, rejected) =
        Pipeline::from_config(&config).map_err(|e| CliError::User(e.to_string()))?;
    let (logger, join) = start_logger(&config, args.no_log);
    for error in &rejected {
        if !cli.quiet {
            eprintln!("{} {error}", "warning:".yellow().bold());
        }
        if let Some(logger) = &logger {
            logger.send(ActivityEvent::TemplateRejected {
                template: template_name(error),
                error_code: error.code().to_string(),
                error_message: error.to_string(),
            });
        }
    }

    let pipeline = pipeline.with_logger(logger.clone());
    let options = BatchOptions {
        workers: args.workers.unwrap_or(config.processing.max_workers),
        output_dir: output_dir.map(Path::to_path_buf),
        preview,
        config_hash,
    };
    let opener = ManifestOpener::new(OutputOptions::from_config(&config.processing));
    let result = BatchRunner::new(&pipeline, &opener, options, logger.clone()).run(&inputs);
    drop(pipeline);
    stop_logger(logger, join);
    let summary = result.map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => print_summary_human(cli, &summary),
        OutputMode::Json => {
            let payload = json!({
                "command": if summary.preview { "scan" } else { "process" },
                "summary": serde_json::to_value(&summary)?,
            });
            write_json_line(&payload)?;
        }
    }

    if summary.failed > 0 {
        return Err(CliError::Partial(format!(
            "{} of {} files failed",
            summary.failed,
            summary.files.len()
        )));
    }
    Ok(())
}

fn template_name(error: &RedactError) -> String {
    match error {
        RedactError::TemplateLoad { name, .. } => name.clone(),
        _ => String::new(),
    }
}

fn print_summary_human(cli: &Cli, summary: &BatchSummary) {
    if cli.quiet {
        for file in summary.files.iter().filter(|f| !f.is_success()) {
            print_failure(file);
        }
        return;
    }

    let heading = if summary.preview {
        "Redaction Preview"
    } else {
        "Redaction Results"
    };
    println!("{}", heading.bold());
    for file in &summary.files {
        if !file.is_success() {
            print_failure(file);
            continue;
        }
        let units = file.units();
        println!(
            "  {} {}  ({} redaction{})",
            "ok".green(),
            file.source.display(),
            units.len(),
            if units.len() == 1 { "" } else { "s" }
        );
        for unit in units {
            let text = unit.text.as_deref().unwrap_or("");
            println!(
                "      p{:<3} {:<5} {:<20} {:>5.2}  {}",
                unit.page + 1,
                unit.kind.as_str(),
                unit.label,
                unit.confidence,
                text
            );
            if cli.verbose
                && let Some(scores) = unit.scores
            {
                println!(
                    "            proximity={:.2} font={:.2} zone={:.2} schematic={:.2}",
                    scores.proximity, scores.font, scores.zone, scores.schematic_penalty
                );
            }
        }
        if let Some(report) = &file.report {
            for diag in &report.diagnostics {
                println!(
                    "      {} page {} skipped: {}",
                    "warn".yellow(),
                    diag.page + 1,
                    diag.message
                );
            }
            if let Some(output) = &report.output {
                println!("      saved to {}", output.display());
            }
        }
    }
    println!();
    println!(
        "  Files: {} succeeded, {} failed   Redactions: {}   Pages skipped: {}   ({:.1}s)",
        summary.succeeded,
        summary.failed,
        summary.units,
        summary.skipped_pages,
        ms_to_secs(summary.duration_ms),
    );
    if summary.preview {
        println!("  Preview only; run 'pdfr process' to apply.");
    }
}

fn print_failure(file: &FileOutcome) {
    let message = file.error.as_ref().map_or("unknown failure", |e| e.message.as_str());
    eprintln!("  {} {}  {message}", "FAILED".red().bold(), file.source.display());
}

#[allow(clippy::cast_precision_loss)]
fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config
                    .stable_hash()
                    .map_err(|e| CliError::Runtime(e.to_string()))?;
                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("{}", "Configuration is valid.".green());
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("{} {e}", "Configuration is INVALID:".red().bold());
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("configuration invalid ({})", e.code())))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// output helpers
// ---------------------------------------------------------------------------

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("PDFR_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
