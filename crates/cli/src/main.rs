// odflow CLI - origin-destination freight flow estimation

mod estimate;
mod exit_codes;
mod resolve;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use odflow_distribution::DistributionError;

use exit_codes::{distribution_exit_code, EXIT_ESTIMATE_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "odflow")]
#[command(about = "Estimate origin-destination freight flows from regional production and consumption")]
#[command(version)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn", env = "ODFLOW_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate per-product flows from a TOML config file
    #[command(after_help = "\
Examples:
  odflow estimate estimate.toml
  odflow estimate estimate.toml --json
  odflow estimate estimate.toml --output flows.csv --result result.json
  odflow estimate estimate.toml --strict --log-level info")]
    Estimate {
        /// Path to the estimate config (.toml)
        config: PathBuf,

        /// Output the full result as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the long-form flow table (CSV); overrides [output] flows
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Write the full result (JSON); overrides [output] result
        #[arg(long)]
        result: Option<PathBuf>,

        /// Exit non-zero when any product fails to converge
        #[arg(long)]
        strict: bool,
    },

    /// Validate an estimate config without running
    #[command(after_help = "\
Examples:
  odflow validate estimate.toml")]
    Validate {
        /// Path to the estimate config (.toml)
        config: PathBuf,
    },

    /// Show which region each free-text label resolves to, with scores
    #[command(after_help = "\
Examples:
  odflow resolve nuts.csv 'North Regio' 'Sout Region'
  odflow resolve nuts.csv Θεσσαλονικη --level 3 --country EL
  odflow resolve nuts.csv 'Evros' --min-similarity 0.8 --json")]
    Resolve {
        /// Boundary table with NUTS_ID / NUTS_NAME / LEVL_CODE / CNTR_CODE columns
        regions: PathBuf,

        /// Labels to resolve
        #[arg(required = true)]
        labels: Vec<String>,

        /// Only match regions at this level
        #[arg(long)]
        level: Option<u8>,

        /// Only match regions of this country code
        #[arg(long)]
        country: Option<String>,

        /// Boundary table delimiter
        #[arg(long, default_value = ",")]
        delimiter: char,

        /// Reject matches scoring below this (0..=1)
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Estimate { config, json, output, result, strict } => {
            estimate::cmd_estimate(config, json, output, result, strict)
        }
        Commands::Validate { config } => estimate::cmd_validate(config),
        Commands::Resolve { regions, labels, level, country, delimiter, min_similarity, json } => {
            resolve::cmd_resolve(resolve::ResolveArgs {
                regions,
                labels,
                level,
                country,
                delimiter,
                min_similarity,
                json,
            })
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ESTIMATE_IO, msg)
    }

    /// Create error from an engine error with its registry exit code.
    pub fn engine(err: DistributionError) -> Self {
        let hint = match &err {
            DistributionError::EmptyUniverse { .. } => {
                Some("check the level and country filters against the boundary table".to_string())
            }
            DistributionError::AmbiguousMatch { .. } => {
                Some("preview scores with `odflow resolve`, or lower prior.min_similarity".to_string())
            }
            DistributionError::MissingColumn { .. } => {
                Some("column names are configured under [<section>.columns]".to_string())
            }
            _ => None,
        };
        Self { code: distribution_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
