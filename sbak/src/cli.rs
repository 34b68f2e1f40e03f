use std::{fmt, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use crate::backup::DirectoryLayout;
use crate::models::ConversationType;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Slack user token (xoxp-...)
    #[arg(long, env = "SLACK_USER_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Slack Web API base URL
    #[arg(long, env = "SLACK_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Log verbosity
    #[arg(short, long, value_name = "LEVEL", default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Back up conversations into a directory tree
    Backup(BackupArgs),
    /// Check Slack API connectivity, authentication and rate limiting
    Status(StatusArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct BackupArgs {
    /// Output directory
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Conversation types, comma separated [default: im,mpim,private_channel]
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<ConversationType>,

    /// Back up only this conversation (channel, group or DM id)
    #[arg(long, value_name = "ID")]
    pub conversation_id: Option<String>,

    /// Oldest message timestamp, fractional epoch seconds
    #[arg(long, value_name = "TS")]
    pub oldest: Option<f64>,

    /// Latest message timestamp, fractional epoch seconds
    #[arg(long, value_name = "TS")]
    pub latest: Option<f64>,

    /// Process conversations again even if already backed up
    #[arg(long)]
    pub force: bool,

    /// Number of conversations processed concurrently [default: 1]
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Directory naming of conversations
    #[arg(long, value_enum, default_value_t = DirectoryLayout::Label)]
    pub layout: DirectoryLayout,

    /// Longest single wait after a rate limit response [default: 300]
    #[arg(long, value_name = "SECS")]
    pub max_retry_wait: Option<u64>,

    /// Give up after this many rate limited attempts of one request
    #[arg(long, value_name = "N")]
    pub max_retry_attempts: Option<u32>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Only check authentication
    #[arg(long)]
    pub quick: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl From<LogLevel> for LevelFilter {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Off => write!(f, "off"),
        }
    }
}
