use thiserror::Error;

use crate::types::Sample;
use crate::zone::Zone;

/// Errors a `SampleSource` may surface. These never reach the detector or
/// coordinator directly; the worker maps them into `valid=false` samples.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("sample source timed out")]
    Timeout,
    #[error("sample source disconnected")]
    Disconnected,
    #[error("sample source io error: {0}")]
    Io(String),
}

/// Abstract provider of the most recent reading for a zone.
///
/// Implementations must be safe for concurrent read by multiple line
/// workers (the sample source is the one resource shared across lines).
pub trait SampleSource: Send + Sync {
    /// Returns the most recent sample for `zone`, non-blocking from the
    /// worker's perspective (bounded by the caller's own timeout policy).
    fn get_latest(&self, zone: Zone) -> Result<Sample, SourceError>;
}

impl<T: ?Sized + SampleSource> SampleSource for Box<T> {
    fn get_latest(&self, zone: Zone) -> Result<Sample, SourceError> {
        (**self).get_latest(zone)
    }
}
