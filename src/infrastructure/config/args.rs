use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "readmark",
    version,
    about = "Replays chat events through the read-state engine",
    long_about = None
)]
pub struct CliArgs {
    /// JSON-lines event script. Reads stdin when omitted.
    #[arg(value_name = "SCRIPT")]
    pub script: Option<PathBuf>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding persisted read positions.
    #[arg(long, value_name = "PATH", env = "READMARK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Messages kept in memory per entity.
    #[arg(long)]
    pub max_retained_messages: Option<usize>,

    /// Minimum delay between two seen reports, in milliseconds.
    #[arg(long)]
    pub throttle_ms: Option<u64>,

    /// Visible fraction above which a message counts as visible.
    #[arg(long)]
    pub visibility_threshold: Option<f64>,

    /// Notify for every room message by default.
    #[arg(long)]
    pub notify_all: Option<bool>,

    /// Rows visible in the replay viewport.
    #[arg(long, default_value_t = 10)]
    pub viewport_rows: u16,
}
