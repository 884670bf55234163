//! Insights CLI - Command-line interface for Physio Insights
//!
//! Commands:
//! - analyze: Build a context packet from an observation file
//! - validate: Validate observation input without analyzing
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use physio_insights::pipeline::InsightsEngine;
use physio_insights::store::{parse_array, parse_ndjson};
use physio_insights::types::Observation;
use physio_insights::{AnalysisConfig, UserState, ENGINE_VERSION, SCHEMA_VERSION};

/// Physio Insights - context packets from wearable time-series
#[derive(Parser)]
#[command(name = "insights")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Analyze physiological observations into a context packet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a context packet from an observation file
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Pretty-print the packet
        #[arg(long)]
        pretty: bool,

        /// User identifier recorded in packet meta
        #[arg(long)]
        user_id: Option<String>,

        /// Configuration file (JSON); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Load per-user state from file
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Save updated per-user state to file after analyzing
        #[arg(long)]
        save_state: Option<PathBuf>,
    },

    /// Validate observation input without analyzing
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one observation per line)
    Ndjson,
    /// JSON array of observations
    Json,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Observation input schema
    Input,
    /// Context packet output schema
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("insights: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            input_format,
            pretty,
            user_id,
            config,
            load_state,
            save_state,
        } => cmd_analyze(
            &input,
            &output,
            input_format,
            pretty,
            user_id.as_deref(),
            config.as_deref(),
            load_state.as_deref(),
            save_state.as_deref(),
        ),
        Commands::Validate {
            input,
            input_format,
        } => cmd_validate(&input, input_format),
        Commands::Schema { schema_type } => {
            cmd_schema(schema_type);
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_analyze(
    input: &PathBuf,
    output: &PathBuf,
    input_format: InputFormat,
    pretty: bool,
    user_id: Option<&str>,
    config: Option<&std::path::Path>,
    load_state: Option<&std::path::Path>,
    save_state: Option<&std::path::Path>,
) -> Result<(), CliError> {
    let observations = read_observations(input, input_format)?;

    let analysis_config: AnalysisConfig = match config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => AnalysisConfig::default(),
    };
    let engine = InsightsEngine::new(analysis_config)?;

    let state = match load_state {
        Some(path) => UserState::from_json(&fs::read_to_string(path)?)?,
        None => UserState::default(),
    };

    let run = engine.run(observations, user_id, state)?;

    if let Some(path) = save_state {
        fs::write(path, run.state.to_json()?)?;
    }

    let packet_json = if pretty {
        serde_json::to_string_pretty(&run.packet)?
    } else {
        serde_json::to_string(&run.packet)?
    };

    if output.to_string_lossy() == "-" {
        println!("{packet_json}");
    } else {
        fs::write(output, packet_json)?;
    }
    Ok(())
}

fn cmd_validate(input: &PathBuf, input_format: InputFormat) -> Result<(), CliError> {
    let observations = read_observations(input, input_format)?;
    println!("{} observations parsed successfully", observations.len());
    Ok(())
}

fn cmd_schema(schema_type: SchemaType) {
    match schema_type {
        SchemaType::Input => {
            println!("Input: observations (version {SCHEMA_VERSION})");
            println!();
            println!("Each observation is a JSON object:");
            println!("  timestamp   - user-local, RFC 3339 without offset (e.g. 2024-03-01T09:00:00)");
            println!("  signal_kind - reaction_time, readiness_score, agility_score,");
            println!("                heart_rate, hrv_rmssd, skin_temp, sleep_stage,");
            println!("                motion_epoch, self_report_stress, self_report_sleepiness");
            println!("  value       - numeric reading (stage code 0-3 for sleep_stage)");
            println!("  unit        - unit string, e.g. ms, bpm, score");
            println!("  source_tag  - originating device or app");
        }
        SchemaType::Output => {
            println!("Output: context packet (schema_version {SCHEMA_VERSION})");
            println!();
            println!("Top-level keys:");
            println!("  meta              - generated_at, engine, user_id, per-signal coverage");
            println!("  baseline          - personal best anchors");
            println!("  latest_day        - most recent daily summary");
            println!("  daily_summaries   - per-day per-signal statistics");
            println!("  weekly_summaries  - 7-day aggregates with week-over-week deltas");
            println!("  trends            - readiness slope and HRV summary");
            println!("  patterns          - detected observations with confidence");
            println!("  circadian_profile - cosinor fit per configured signal");
            println!("  task_matching     - suitability per task category");
            println!("  sleep_sessions    - reported or reconstructed nights");
            println!("  sleep_debt        - decaying debt ledger");
            println!("  recovery          - 0-100 score with zone");
            println!("  strain            - bounded daily load scores");
            println!("  insights          - conversational one-liners");
            println!();
            println!("Sections that could not be computed carry");
            println!("  {{\"status\": \"unavailable\"}}");
        }
    }
}

fn read_observations(
    input: &PathBuf,
    format: InputFormat,
) -> Result<Vec<Observation>, CliError> {
    let data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };
    let observations = match format {
        InputFormat::Ndjson => parse_ndjson(&data)?,
        InputFormat::Json => parse_array(&data)?,
    };
    Ok(observations)
}

#[derive(Debug)]
enum CliError {
    Io(io::Error),
    Json(serde_json::Error),
    Analysis(physio_insights::AnalysisError),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "{e}"),
            CliError::Json(e) => write!(f, "{e}"),
            CliError::Analysis(e) => write!(f, "{e}"),
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

impl From<physio_insights::AnalysisError> for CliError {
    fn from(e: physio_insights::AnalysisError) -> Self {
        CliError::Analysis(e)
    }
}
