pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use skinfit_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

use crate::commands::similar::{QuerySource, SimilarArgs};
use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "skinfit",
    about = "SkinFit decision engine CLI",
    long_about = "Score catalog items, build budget-aware routines, check active conflicts and find similar products.",
    after_help = "Examples:\n  skinfit evaluate --request turn.json\n  skinfit conflicts --actives \"Glycolic Acid,Retinol\"\n  skinfit similar --request turn.json --anchor serum-01 --cheaper\n  skinfit doctor --json"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Config file path (defaults to skinfit.toml, then config/skinfit.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the configured log level")]
    log_level: Option<String>,
    #[arg(long, global = true, value_parser = parse_log_format, help = "compact, pretty or json")]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Score, build, repair and negotiate a routine for one turn request")]
    Evaluate {
        #[arg(long, help = "Turn request JSON file")]
        request: PathBuf,
    },
    #[command(about = "Return fit score breakdowns for every catalog item in a turn request")]
    Score {
        #[arg(long, help = "Turn request JSON file")]
        request: PathBuf,
    },
    #[command(about = "Check actives for same-application conflicts, or against another set")]
    Conflicts {
        #[arg(long, value_delimiter = ',', required = true, help = "Comma-separated actives")]
        actives: Vec<String>,
        #[arg(long, value_delimiter = ',', help = "Actives already in use; compares across the two sets")]
        against: Option<Vec<String>>,
    },
    #[command(about = "Find catalog items similar to an anchor item or a raw embedding")]
    Similar {
        #[arg(long, help = "Turn request JSON file carrying the catalog and embeddings")]
        request: PathBuf,
        #[arg(long, conflicts_with = "embedding_file", required_unless_present = "embedding_file")]
        anchor: Option<String>,
        #[arg(long, help = "JSON array of floats to query with")]
        embedding_file: Option<PathBuf>,
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long, help = "Only items priced below the anchor")]
        cheaper: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, engine assembly and an optional request file")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
        #[arg(long, help = "Turn request JSON file to validate")]
        request: Option<PathBuf>,
    },
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse::<LogFormat>().map_err(|error| error.to_string())
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        config_path: cli.global.config.clone(),
        require_file: cli.global.config.is_some(),
        overrides: ConfigOverrides {
            log_level: cli.global.log_level.clone(),
            log_format: cli.global.log_format,
            ..ConfigOverrides::default()
        },
    };

    // Commands report config failures themselves; logging falls back to defaults.
    let logging_config = AppConfig::load(options.clone()).unwrap_or_default();
    if let Err(error) = init_logging(&logging_config) {
        eprintln!("logging disabled: {error}");
    }

    let result = match cli.command {
        Command::Evaluate { request } => commands::evaluate::run(&options, &request),
        Command::Score { request } => commands::score::run(&options, &request),
        Command::Conflicts { actives, against } => commands::conflicts::run(&actives, against.as_deref()),
        Command::Similar { request, anchor, embedding_file, k, region, cheaper } => {
            let source = match (anchor, embedding_file) {
                (Some(anchor), _) => QuerySource::Anchor(anchor),
                (None, Some(path)) => QuerySource::EmbeddingFile(path),
                (None, None) => {
                    return emit(CommandResult::failure(
                        "similar",
                        "invalid_request",
                        "either --anchor or --embedding-file is required",
                        3,
                    ));
                }
            };
            commands::similar::run(&options, &SimilarArgs { request, source, k, region, cheaper })
        }
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(&options) },
        Command::Doctor { json, request } => {
            CommandResult { exit_code: 0, output: commands::doctor::run(&options, json, request.as_deref()) }
        }
    };

    emit(result)
}

fn emit(result: CommandResult) -> ExitCode {
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so command payloads on stdout stay machine-readable.
fn init_logging(config: &AppConfig) -> Result<()> {
    use skinfit_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.logging.level))?;
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr);

    let installed = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
    installed.map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}
