#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Boundary traits and shared vocabulary for the heating-cycle monitoring core.
//!
//! - `SampleSource` is the abstract provider of per-zone readings.
//! - `StateSink` is the narrow persistence/observability boundary.
//! - `clock` offers a `MonotonicClock` for real time and a `TestClock` for
//!   deterministic tests.
//!
//! The data types here (`Sample`, `Event`, `RunRecord`, ...) are the shared
//! currency between `monitor_core` (which is otherwise I/O-free) and the
//! adapters in `monitor_io` that implement `SampleSource`/`StateSink`.
pub mod clock;
pub mod sink;
pub mod source;
pub mod types;
pub mod zone;

pub use clock::{Clock, MonotonicClock};
pub use sink::{SinkError, StateSink};
pub use source::{SampleSource, SourceError};
pub use types::{
    DetectorEvent, Event, EventKind, FaultKind, RunRecord, RunZoneSummary, Sample, StageKind,
    StageOutcome, StageRecord, StatsSnapshot, TerminationKind,
};
pub use zone::Zone;
