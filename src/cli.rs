use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::fields::TableMode;
use crate::state::sort::LAST_TIME_RECEIVED;

#[derive(Parser, Debug)]
#[command(
    name = "flowmon",
    version,
    about = "Aggregate and rank decoded IPFIX/NetFlow records"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: log::LevelFilter,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Ingest a recorded stream and print one ranked snapshot
    Replay(ReplayArgs),
    /// Ingest continuously and print a snapshot every interval
    Monitor(MonitorArgs),
    /// List the field vocabulary and the reserved sort names
    Fields(FieldsArgs),
}

/// Arguments shared by every command that builds a flow table.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Field vocabulary
    #[arg(long, value_enum, default_value = "normal")]
    pub mode: TableMode,

    /// Comma-separated key fields to aggregate by [default: all fields]
    #[arg(long, value_delimiter = ',')]
    pub keys: Option<Vec<String>>,

    /// Ranking criterion: a reserved metric or an active key field
    #[arg(long, default_value = LAST_TIME_RECEIVED)]
    pub sort: String,

    /// Number of ingest worker threads [default: 4]
    #[arg(long, default_value_t = 4, value_parser = validate_workers)]
    pub workers: usize,

    /// Enrichment catalog (JSON); enables the mode's enricher
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Decoded-record input, one JSON object per line ("-" for stdin)
    pub input: PathBuf,
}

impl EngineArgs {
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }
}

/// Arguments specific to replay mode.
#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Output format [default: tsv]
    #[arg(long, default_value = "tsv")]
    pub format: OutputFormat,

    /// Print at most this many aggregates
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Arguments specific to monitor mode.
#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Refresh interval in seconds [default: 1.0]
    #[arg(long, default_value_t = 1.0, value_parser = validate_interval)]
    pub interval: f64,

    /// Print at most this many aggregates per refresh
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct FieldsArgs {
    /// Field vocabulary
    #[arg(long, value_enum, default_value = "normal")]
    pub mode: TableMode,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Tsv,
    Json,
    Pretty,
}

fn validate_interval(s: &str) -> Result<f64, String> {
    let val: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if val < 0.1 {
        Err("interval must be at least 0.1 seconds".to_string())
    } else if val > 10.0 {
        Err("interval must be at most 10.0 seconds".to_string())
    } else {
        Ok(val)
    }
}

fn validate_workers(s: &str) -> Result<usize, String> {
    let val: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid integer"))?;
    if val < 1 {
        Err("workers must be at least 1".to_string())
    } else if val > 64 {
        Err("workers must be at most 64".to_string())
    } else {
        Ok(val)
    }
}
