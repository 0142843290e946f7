//! Fatal, construction-time errors for the monitoring core.
//!
//! `step()`/`observe()`/`tick()` never return `Result` — bad samples,
//! faults, and timeouts are data that flows through
//! `DetectorEvent`/`StageOutcome`/`TerminationKind`. The only genuinely
//! fatal condition is an invalid configuration, refused before a worker
//! ever starts.
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sample source")]
    MissingSource,
    #[error("missing state sink")]
    MissingSink,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
