//! Test doubles for `SampleSource` and `StateSink`: a source that always
//! fails for exercising error paths, a scriptable source for driving
//! scenarios deterministically, and sinks that accept or reject everything.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use monitor_traits::{SampleSource, Sample, SinkError, SourceError, StateSink, Zone};
use monitor_traits::{Event, RunRecord, StageRecord};

/// A source that always fails; useful for exercising the worker's
/// stale/missing-sample handling without a real feed.
pub struct NoopSource;

impl SampleSource for NoopSource {
    fn get_latest(&self, _zone: Zone) -> Result<Sample, SourceError> {
        Err(SourceError::Disconnected)
    }
}

/// Scriptable source: holds the next sample to hand back for each zone.
/// Tests push samples in with `set`; `get_latest` returns whatever was last
/// set, or `SourceError::Timeout` if nothing has been set yet.
///
/// Cloning shares state (the inner mutex is `Arc`-wrapped), so a test can
/// hand one clone to a worker and keep another to drive it.
#[derive(Clone)]
pub struct MockSampleSource {
    next: Arc<Mutex<[Option<Sample>; 3]>>,
}

impl MockSampleSource {
    pub fn new() -> Self {
        Self {
            next: Arc::new(Mutex::new([None, None, None])),
        }
    }

    pub fn set(&self, sample: Sample) {
        if let Ok(mut slots) = self.next.lock() {
            slots[sample.zone.canonical_index()] = Some(sample);
        }
    }
}

impl Default for MockSampleSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for MockSampleSource {
    fn get_latest(&self, zone: Zone) -> Result<Sample, SourceError> {
        self.next
            .lock()
            .ok()
            .and_then(|slots| slots[zone.canonical_index()])
            .ok_or(SourceError::Timeout)
    }
}

/// A sink that accepts everything and remembers nothing beyond the last
/// checkpoint blob, for builder/worker tests that don't care about
/// persistence.
#[derive(Default)]
pub struct NullSink {
    last_checkpoint: Mutex<Option<Vec<u8>>>,
}

impl StateSink for NullSink {
    fn save_runtime_state(&self, _line_id: &str, blob: &[u8]) -> Result<(), SinkError> {
        if let Ok(mut slot) = self.last_checkpoint.lock() {
            *slot = Some(blob.to_vec());
        }
        Ok(())
    }

    fn load_runtime_state(&self, _line_id: &str) -> Result<Option<Vec<u8>>, SinkError> {
        Ok(self
            .last_checkpoint
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or_default())
    }

    fn append_event(&self, _line_id: &str, _event: &Event) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_stage_closed(&self, _line_id: &str, _record: &StageRecord) {}

    fn on_run_closed(&self, _line_id: &str, _record: &RunRecord) {}
}

/// A sink whose writes always fail, for exercising the worker's degraded
/// buffering path.
#[derive(Default)]
pub struct FaultingSink;

impl StateSink for FaultingSink {
    fn save_runtime_state(&self, _line_id: &str, _blob: &[u8]) -> Result<(), SinkError> {
        Err(SinkError::Unavailable)
    }

    fn load_runtime_state(&self, _line_id: &str) -> Result<Option<Vec<u8>>, SinkError> {
        Err(SinkError::Unavailable)
    }

    fn append_event(&self, _line_id: &str, _event: &Event) -> Result<(), SinkError> {
        Err(SinkError::Unavailable)
    }

    fn on_stage_closed(&self, _line_id: &str, _record: &StageRecord) {}

    fn on_run_closed(&self, _line_id: &str, _record: &RunRecord) {}
}

/// Builds a valid sample for `zone` at time `t_ms`, convenient default for
/// scenario tests that only care about temperature and setpoint.
pub fn sample_at(zone: Zone, t_ms: u64, temperature_f: f64, setpoint_f: f64) -> Sample {
    Sample {
        zone,
        t_monotonic_ms: t_ms,
        t_wall: Utc::now(),
        temperature_f,
        setpoint_f,
        valid: true,
    }
}
