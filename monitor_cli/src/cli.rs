//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "monitor_cli", version, about = "Heating-cycle monitor CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        default_value = "etc/monitor.toml"
    )]
    pub config: PathBuf,

    /// Emit JSON lines on stdout instead of human summaries (logs go to stderr)
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(
        long = "log-level",
        global = true,
        value_name = "LEVEL",
        default_value = "info"
    )]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the FSM worker against the configured sample source
    Run {
        /// Production line id (overrides the config's line_id)
        #[arg(long, value_name = "ID")]
        line: Option<String>,
        /// Stop after approximately N worker ticks instead of running
        /// until interrupted
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
    },
    /// Print the persisted run summary and zone stages for a line
    Status {
        /// Production line id (overrides the config's line_id)
        #[arg(long, value_name = "ID")]
        line: Option<String>,
    },
    /// Close the currently open run as aborted
    Abort {
        /// Production line id (overrides the config's line_id)
        #[arg(long, value_name = "ID")]
        line: Option<String>,
        /// Free-text reason recorded in the run's event log
        #[arg(long, value_name = "TEXT")]
        reason: Option<String>,
    },
    /// Validate configuration without running
    SelfCheck,
}
