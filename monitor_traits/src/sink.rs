use thiserror::Error;

use crate::types::{Event, RunRecord, StageRecord};

/// Errors a `StateSink` may surface for the write-path calls. Read-path
/// (`load_runtime_state`) failures use the same type; an unavailable sink
/// on a write puts the worker into the degraded mode of the concurrency
/// model (buffered events, checkpoint retried once).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("state sink write timed out")]
    Timeout,
    #[error("state sink unavailable")]
    Unavailable,
    #[error("state sink io error: {0}")]
    Io(String),
}

/// Narrow boundary the core requires from whatever persists state.
///
/// `on_run_closed` must be invoked exactly once per opened run; a crash
/// between computing a `RunRecord` and this call is the one window where
/// that guarantee depends on the caller (the worker) not retrying it twice.
pub trait StateSink: Send + Sync {
    /// Idempotent overwrite of the line's runtime-state checkpoint blob.
    fn save_runtime_state(&self, line_id: &str, blob: &[u8]) -> Result<(), SinkError>;

    /// Used on startup for recovery; `None` if no checkpoint exists.
    fn load_runtime_state(&self, line_id: &str) -> Result<Option<Vec<u8>>, SinkError>;

    /// Best-effort append; event loss must not corrupt state.
    fn append_event(&self, line_id: &str, event: &Event) -> Result<(), SinkError>;

    fn on_stage_closed(&self, line_id: &str, record: &StageRecord);

    fn on_run_closed(&self, line_id: &str, record: &RunRecord);
}

impl<T: ?Sized + StateSink> StateSink for Box<T> {
    fn save_runtime_state(&self, line_id: &str, blob: &[u8]) -> Result<(), SinkError> {
        (**self).save_runtime_state(line_id, blob)
    }

    fn load_runtime_state(&self, line_id: &str) -> Result<Option<Vec<u8>>, SinkError> {
        (**self).load_runtime_state(line_id)
    }

    fn append_event(&self, line_id: &str, event: &Event) -> Result<(), SinkError> {
        (**self).append_event(line_id, event)
    }

    fn on_stage_closed(&self, line_id: &str, record: &StageRecord) {
        (**self).on_stage_closed(line_id, record)
    }

    fn on_run_closed(&self, line_id: &str, record: &RunRecord) {
        (**self).on_run_closed(line_id, record)
    }
}
