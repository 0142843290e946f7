//! Human-readable error descriptions, stable exit codes, and structured
//! JSON error output.

use monitor_core::BuildError;
use monitor_traits::SinkError;

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSource => {
                "What happened: No sample source was provided to the worker.\nLikely causes: The configured source adapter failed to initialize or was not wired into the builder.\nHow to fix: Check the [io.source] section of the config; the simulated source needs no extra setup.".to_string()
            }
            BuildError::MissingSink => {
                "What happened: No state sink was provided to the worker.\nLikely causes: The state directory could not be prepared or the sink was not wired into the builder.\nHow to fix: Check io.state_dir in the config and its filesystem permissions.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. `monitor_cli self-check` validates without running."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SinkError>() {
        return format!(
            "What happened: The state sink refused an operation ({se}).\nLikely causes: The state directory is missing, full, or not writable.\nHow to fix: Check io.state_dir in the config and its filesystem permissions."
        );
    }

    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 0 success, 1 generic, 2 invalid configuration,
/// 3 unavailable state sink.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(_) => 2,
            _ => 1,
        };
    }
    if err.downcast_ref::<SinkError>().is_some() {
        return 3;
    }
    1
}

fn error_kind_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(_) => "ConfigInvalid",
            BuildError::MissingSource => "MissingSource",
            BuildError::MissingSink => "MissingSink",
        };
    }
    if err.downcast_ref::<SinkError>().is_some() {
        return "SinkUnavailable";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": error_kind_name(err), "message": humanize(err) }).to_string()
}
