//! gazeflux CLI - Command-line interface for gaze-flux
//!
//! Commands:
//! - analyze: Run the full pipeline over a frame file and write the report
//! - validate: Check frame records against the schema and the AOI table
//! - doctor: Diagnose configuration health
//! - schema: Print input, configuration and report format information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use gaze_flux::config::AnalysisConfig;
use gaze_flux::encoder::{ReportEncoder, REPORT_VERSION};
use gaze_flux::pipeline::GazeProcessor;
use gaze_flux::schema::{FrameAdapter, FrameRecord, SCHEMA_VERSION};
use gaze_flux::{ComputeError, GAZE_FLUX_VERSION, PRODUCER_NAME};

/// gazeflux - Gaze annotation analytics
#[derive(Parser)]
#[command(name = "gazeflux")]
#[command(version = GAZE_FLUX_VERSION)]
#[command(about = "Turn per-frame gaze annotations into attention metrics", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze frame records and write the aggregated report
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Analysis configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Report output path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Report format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Write per-trial metric records (NDJSON) for the modeling side
        #[arg(long)]
        model_records: Option<PathBuf>,

        /// Write per-trial fixations, transitions and matches (NDJSON)
        #[arg(long)]
        details: Option<PathBuf>,

        /// Worker threads for per-trial processing
        #[arg(long, default_value = "1")]
        workers: usize,
    },

    /// Validate frame records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Also check (object, region) labels against this configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration health
    Doctor {
        /// Configuration file to check
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one frame per line)
    Ndjson,
    /// JSON array of frames
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (gaze.frame.v1)
    Input,
    /// Analysis configuration
    Config,
    /// Report schema (gaze.report.v1)
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), GazeCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            config,
            output,
            input_format,
            output_format,
            model_records,
            details,
            workers,
        } => cmd_analyze(
            &input,
            &config,
            &output,
            input_format,
            output_format,
            model_records.as_deref(),
            details.as_deref(),
            workers,
        ),

        Commands::Validate {
            input,
            input_format,
            config,
            json,
        } => cmd_validate(&input, input_format, config.as_deref(), json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_analyze(
    input: &Path,
    config: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    model_records: Option<&Path>,
    details: Option<&Path>,
    workers: usize,
) -> Result<(), GazeCliError> {
    let config = AnalysisConfig::from_file(config)?;
    let processor = GazeProcessor::new(config)?;

    let frames = read_frames(input, &input_format)?;
    if frames.is_empty() {
        return Err(GazeCliError::NoFrames);
    }

    let trials = processor.to_trials(&frames)?;
    let report = processor.run_parallel(&trials, workers)?;

    let encoder = ReportEncoder::new();
    let payload = encoder.encode(&report);
    let output_data = match output_format {
        OutputFormat::Json => serde_json::to_string(&payload)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&payload)?,
    };
    write_output(output, &(output_data + "\n"))?;

    if let Some(path) = model_records {
        write_output(path, &encoder.model_records_ndjson(&report)?)?;
    }
    if let Some(path) = details {
        write_output(path, &encoder.trial_details_ndjson(&report)?)?;
    }

    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    config: Option<&Path>,
    json: bool,
) -> Result<(), GazeCliError> {
    let frames = read_frames(input, &input_format)?;
    let results = FrameAdapter::validate_frames(&frames);

    let label_issues = match config {
        Some(path) => {
            let processor = GazeProcessor::new(AnalysisConfig::from_file(path)?)?;
            FrameAdapter::unclassifiable_frames(&frames, processor.classifier())
        }
        None => Vec::new(),
    };

    let mut errors: Vec<ValidationErrorDetail> = results
        .iter()
        .map(|r| ValidationErrorDetail {
            index: r.index,
            location: r.location.clone(),
            error: r.error.to_string(),
        })
        .collect();
    errors.extend(label_issues.iter().map(|issue| ValidationErrorDetail {
        index: issue.index,
        location: issue.location.clone(),
        error: format!(
            "Unknown AOI pair ({}, {})",
            issue.object, issue.region
        ),
    }));
    errors.sort_by_key(|e| e.index);

    let report = ValidationReport {
        total_frames: frames.len(),
        valid_frames: frames.len() - errors.len(),
        invalid_frames: errors.len(),
        labels_checked: config.is_some(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total frames:   {}", report.total_frames);
        println!("Valid frames:   {}", report.valid_frames);
        println!("Invalid frames: {}", report.invalid_frames);
        if !report.labels_checked {
            println!("(labels not checked; pass --config to check them)");
        }

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {}: {}", err.location, err.error);
            }
        }
    }

    if report.invalid_frames > 0 {
        Err(GazeCliError::ValidationFailed(report.invalid_frames))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), GazeCliError> {
    let mut checks: Vec<DoctorCheck> = vec![
        DoctorCheck::ok("gaze_flux_version", format!("gaze-flux version {}", GAZE_FLUX_VERSION)),
        DoctorCheck::ok("schema_version", format!("Input schema: {}", SCHEMA_VERSION)),
    ];

    match config {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: format!("Configuration file {} does not exist", path.display()),
        }),
        Some(path) => checks.extend(config_checks(path)),
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "No configuration given; pass --config to check one".to_string(),
        }),
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck::ok("stdin", "stdin is a TTY (interactive mode)".to_string())
    } else {
        DoctorCheck::ok("stdin", "stdin is a pipe (ready for --input -)".to_string())
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: GAZE_FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("gazeflux Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(GazeCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn config_checks(path: &Path) -> Vec<DoctorCheck> {
    let config = match AnalysisConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            return vec![DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }]
        }
    };

    let mut checks = vec![
        DoctorCheck::ok("config", format!("Configuration {} is valid", path.display())),
        DoctorCheck::ok(
            "aoi_table",
            format!(
                "{} AOI pairs mapped to {} categories; off-target sentinel ({}, {})",
                config.aoi_table.entries.len(),
                config.aoi_table.categories().len(),
                config.aoi_table.off_target.object,
                config.aoi_table.off_target.region
            ),
        ),
        DoctorCheck::ok(
            "segmentation",
            format!(
                "Minimum fixation {} frames at {} Hz",
                config.min_fixation_frames, config.sampling_rate_hz
            ),
        ),
    ];

    checks.push(if config.patterns.is_empty() {
        DoctorCheck {
            name: "patterns".to_string(),
            status: CheckStatus::Warning,
            message: "No patterns configured".to_string(),
        }
    } else {
        DoctorCheck::ok(
            "patterns",
            format!(
                "{} patterns, gap tolerance {}{}",
                config.patterns.len(),
                config.max_pattern_gap,
                if config.confine_patterns_to_episodes {
                    ", confined to episodes"
                } else {
                    ""
                }
            ),
        )
    });

    checks.push(match GazeProcessor::new(config.clone()) {
        Ok(_) if config.metrics.is_empty() => DoctorCheck {
            name: "metrics".to_string(),
            status: CheckStatus::Warning,
            message: "No metrics configured; no model records will be produced".to_string(),
        },
        Ok(_) => DoctorCheck::ok(
            "metrics",
            format!("{} metrics, all with a weight source", config.metrics.len()),
        ),
        Err(e) => DoctorCheck {
            name: "metrics".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    checks
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), GazeCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One record per annotated video frame:");
                println!();
                println!("- participant_id, trial_id: trial identity");
                println!("- cohort, condition: group labels (constant within a trial)");
                println!("- ordinal: frame index, strictly increasing within a trial");
                println!("- object, region: annotated label pair, looked up in the AOI table");
                println!("- timestamp_ms: frame timestamp in milliseconds");
                println!("- schema_version: optional, must be {} when present", SCHEMA_VERSION);
            }
        }
        SchemaType::Config => {
            if json_schema {
                println!("{}", get_config_json_schema());
            } else {
                println!("Analysis configuration (JSON)");
                println!();
                println!("- min_fixation_frames: minimum run length (default 3, >= 1)");
                println!("- sampling_rate_hz: frame rate for durations (default 30)");
                println!("- aoi_table: {{ off_target: {{ object, region }}, entries: [{{ object, region, category, actor? }}] }}");
                println!("- patterns: [{{ name, steps: [step, step, step] }}]; a step is a category or a list of categories");
                println!("- max_pattern_gap: fixations allowed between pattern steps (default 1)");
                println!("- confine_patterns_to_episodes: forbid matches across off-target breaks (default false)");
                println!("- metrics: [{{ metric, ..., weight, name? }}]; weight is required");
                println!();
                println!("Metric kinds: attention_proportion, transition_proportion, pattern_count,");
                println!("              pattern_rate, fixation_count, mean_fixation_duration");
                println!("Weight sources: transition_count, fixation_count, fixation_frames,");
                println!("                on_target_frames, total_frames");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Report Schema: {}", REPORT_VERSION);
                println!();
                println!("- producer: {{ name, version, instance_id }}");
                println!("- computed_at_utc");
                println!("- transition_tables: per (cohort, condition), full category grid with counts and probabilities");
                println!("- pattern_summaries: per (cohort, condition, pattern) match counts");
                println!("- weighted_metrics: weighted mean, variance, effective n, SE, 95% CI, unweighted mean (audit)");
                println!("- contrasts: pairwise group differences per metric");
                println!("- exclusions: degenerate trials and excluded observations");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_frames(input: &Path, format: &InputFormat) -> Result<Vec<FrameRecord>, GazeCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let frames = match format {
        InputFormat::Ndjson => FrameAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => FrameAdapter::parse_array(&input_data)?,
    };
    log::info!("Read {} frame records", frames.len());
    Ok(frames)
}

fn write_output(path: &Path, data: &str) -> Result<(), GazeCliError> {
    if path.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Annotated gaze frame",
        "type": "object",
        "required": [
            "participant_id", "trial_id", "condition", "cohort",
            "ordinal", "object", "region", "timestamp_ms"
        ],
        "properties": {
            "schema_version": { "type": "string", "const": SCHEMA_VERSION },
            "participant_id": { "type": "string", "minLength": 1 },
            "trial_id": { "type": "string", "minLength": 1 },
            "condition": { "type": "string", "minLength": 1 },
            "cohort": { "type": "string", "minLength": 1 },
            "ordinal": { "type": "integer", "minimum": 0 },
            "object": { "type": "string" },
            "region": { "type": "string" },
            "timestamp_ms": { "type": "number" }
        }
    })
    .to_string()
}

fn get_config_json_schema() -> String {
    let pair = serde_json::json!({
        "type": "object",
        "required": ["object", "region"],
        "properties": {
            "object": { "type": "string" },
            "region": { "type": "string" }
        }
    });
    let step = serde_json::json!({
        "oneOf": [
            { "type": "string" },
            { "type": "array", "items": { "type": "string" }, "minItems": 1 }
        ]
    });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "gaze-flux analysis configuration",
        "type": "object",
        "required": ["aoi_table"],
        "properties": {
            "min_fixation_frames": { "type": "integer", "minimum": 1, "default": 3 },
            "sampling_rate_hz": { "type": "number", "exclusiveMinimum": 0, "default": 30.0 },
            "aoi_table": {
                "type": "object",
                "required": ["off_target", "entries"],
                "properties": {
                    "off_target": pair,
                    "entries": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "required": ["object", "region", "category"],
                            "properties": {
                                "object": { "type": "string" },
                                "region": { "type": "string" },
                                "category": { "type": "string" },
                                "actor": { "type": "string" }
                            }
                        }
                    }
                }
            },
            "patterns": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "steps"],
                    "properties": {
                        "name": { "type": "string" },
                        "steps": { "type": "array", "items": step, "minItems": 3, "maxItems": 3 }
                    }
                }
            },
            "max_pattern_gap": { "type": "integer", "minimum": 0, "default": 1 },
            "confine_patterns_to_episodes": { "type": "boolean", "default": false },
            "metrics": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["metric", "weight"],
                    "properties": {
                        "metric": {
                            "type": "string",
                            "enum": [
                                "attention_proportion", "transition_proportion", "pattern_count",
                                "pattern_rate", "fixation_count", "mean_fixation_duration"
                            ]
                        },
                        "weight": {
                            "type": "string",
                            "enum": [
                                "transition_count", "fixation_count", "fixation_frames",
                                "on_target_frames", "total_frames"
                            ]
                        },
                        "name": { "type": "string" }
                    }
                }
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": REPORT_VERSION,
        "description": "gaze-flux batch report",
        "type": "object",
        "required": [
            "report_version", "producer", "computed_at_utc", "transition_tables",
            "pattern_summaries", "weighted_metrics", "contrasts", "exclusions"
        ],
        "properties": {
            "report_version": { "type": "string", "const": REPORT_VERSION },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            },
            "computed_at_utc": { "type": "string", "format": "date-time" },
            "transition_tables": { "type": "array", "items": { "type": "object" } },
            "pattern_summaries": { "type": "array", "items": { "type": "object" } },
            "weighted_metrics": { "type": "array", "items": { "type": "object" } },
            "contrasts": { "type": "array", "items": { "type": "object" } },
            "exclusions": {
                "type": "object",
                "properties": {
                    "trial_count": { "type": "integer" },
                    "degenerate_trial_count": { "type": "integer" },
                    "degenerate_trials": { "type": "array" },
                    "excluded_observations": { "type": "integer" }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum GazeCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoFrames,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for GazeCliError {
    fn from(e: io::Error) -> Self {
        GazeCliError::Io(e)
    }
}

impl From<ComputeError> for GazeCliError {
    fn from(e: ComputeError) -> Self {
        GazeCliError::Compute(e)
    }
}

impl From<serde_json::Error> for GazeCliError {
    fn from(e: serde_json::Error) -> Self {
        GazeCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GazeCliError> for CliError {
    fn from(e: GazeCliError) -> Self {
        match e {
            GazeCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GazeCliError::Compute(e) => compute_error(e),
            GazeCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            GazeCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            GazeCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} frames failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            GazeCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn compute_error(e: ComputeError) -> CliError {
    let (code, hint) = match &e {
        ComputeError::Classification { .. } => (
            "CLASSIFICATION_ERROR",
            "Add the pair to the AOI table or fix the annotation",
        ),
        ComputeError::MissingField { .. }
        | ComputeError::NonMonotonicOrdinal { .. }
        | ComputeError::InconsistentTrial { .. } => (
            "STRUCTURAL_ERROR",
            "Run 'gazeflux validate' for details",
        ),
        ComputeError::ConfigError(_) => ("CONFIG_ERROR", "Run 'gazeflux doctor --config <file>'"),
        ComputeError::MissingWeightField(_) => (
            "MISSING_WEIGHT",
            "Set a weight source for every metric; see 'gazeflux schema config'",
        ),
        ComputeError::ParseError(_) | ComputeError::JsonError(_) => (
            "PARSE_ERROR",
            "Ensure input matches the gaze.frame.v1 schema",
        ),
        ComputeError::EncodingError(_) => ("ENCODING_ERROR", "Report this as a bug"),
    };

    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: Some(hint.to_string()),
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_frames: usize,
    valid_frames: usize,
    invalid_frames: usize,
    labels_checked: bool,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    location: String,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message,
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
