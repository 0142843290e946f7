#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! CLI entrypoint for the heating-cycle monitor.
//!
//! Responsibilities:
//! - Parse config/flags and assemble the sample source, state sink, and worker
//! - Initialize tracing and manage log sinks
//! - Offer `--json` mode emitting stable JSONL lines to stdout (logs to stderr)
//! - Map fatal error kinds to stable exit codes

mod cli;
mod commands;
mod error_fmt;
mod tracing_setup;

use std::fs;

use clap::Parser;
use eyre::WrapErr;
use monitor_core::BuildError;

use cli::{Cli, Commands, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use tracing_setup::init_tracing;

fn main() -> eyre::Result<()> {
    // Initialize pretty error reports early
    let _ = color_eyre::install();

    // Set up graceful shutdown handler
    let shutdown = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let shutdown_clone = std::sync::Arc::clone(&shutdown);

    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nReceived shutdown signal, stopping gracefully...");
        shutdown_clone.store(true, std::sync::atomic::Ordering::SeqCst);
    }) {
        eprintln!("Warning: Failed to set signal handler: {e}");
    }

    if let Err(e) = real_main(shutdown) {
        let json = *JSON_MODE.get().unwrap_or(&false);
        let code = exit_code_for_error(&e);
        if json {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(code);
    }
    Ok(())
}

fn real_main(shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>) -> eyre::Result<()> {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    // 1) Load typed config from TOML
    let cfg_text = fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {:?}", cli.config))?;
    let cfg = monitor_config::load_toml(&cfg_text).map_err(|e| {
        eyre::Report::new(BuildError::InvalidConfig(format!(
            "parse {:?}: {e}",
            cli.config
        )))
    })?;

    // 2) Validate configuration with clear errors; nothing runs otherwise
    cfg.validate()
        .map_err(|e| eyre::Report::new(BuildError::InvalidConfig(e.to_string())))?;

    init_tracing(cli.json, &cli.log_level, &cfg.logging);

    match cli.cmd {
        Commands::Run { line, ticks } => commands::run_line(&cfg, line, ticks, cli.json, shutdown),
        Commands::Status { line } => commands::print_status(&cfg, line, cli.json),
        Commands::Abort { line, reason } => commands::abort_line(&cfg, line, reason, cli.json),
        Commands::SelfCheck => commands::self_check(&cfg, cli.json),
    }
}
