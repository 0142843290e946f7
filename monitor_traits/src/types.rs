use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::zone::Zone;

/// A single (temperature, setpoint) reading for one zone.
///
/// `t_monotonic_ms` must never decrease for a given zone; detectors rely on
/// this to reject clock regressions (`FaultKind::TimeWentBackward`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub zone: Zone,
    pub t_monotonic_ms: u64,
    pub t_wall: DateTime<Utc>,
    pub temperature_f: f64,
    pub setpoint_f: f64,
    pub valid: bool,
}

/// Lifecycle phase of a single zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Idle,
    Ramp,
    Stable,
    End,
}

/// Terminal outcome recorded for a finished (or skipped) stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    TimedOut,
    Faulted,
    Skipped,
}

/// Reason a zone detector raised a `Fault` event. Never propagated as a
/// `Result` error: these are data, reported through events and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    SensorInvalid,
    TimeWentBackward,
    TimeoutRamp,
    TimeoutStage,
}

impl FaultKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            FaultKind::SensorInvalid => "sensor_invalid",
            FaultKind::TimeWentBackward => "time_went_backward",
            FaultKind::TimeoutRamp => "timeout_ramp",
            FaultKind::TimeoutStage => "timeout_stage",
        }
    }
}

/// How a run concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    Completed,
    PartialQuiet,
    Faulted,
    Aborted,
}

/// Event emitted by a `ZoneDetector::step`. Same sample sequence always
/// produces the same event sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectorEvent {
    RampStarted {
        zone: Zone,
        baseline_f: f64,
        t: u64,
    },
    Stable {
        zone: Zone,
        t: u64,
    },
    StageEnded {
        zone: Zone,
        outcome: StageOutcome,
        t: u64,
    },
    Fault {
        zone: Zone,
        reason: FaultKind,
        t: u64,
    },
}

impl DetectorEvent {
    pub const fn zone(&self) -> Zone {
        match self {
            DetectorEvent::RampStarted { zone, .. }
            | DetectorEvent::Stable { zone, .. }
            | DetectorEvent::StageEnded { zone, .. }
            | DetectorEvent::Fault { zone, .. } => *zone,
        }
    }

    pub const fn t(&self) -> u64 {
        match self {
            DetectorEvent::RampStarted { t, .. }
            | DetectorEvent::Stable { t, .. }
            | DetectorEvent::StageEnded { t, .. }
            | DetectorEvent::Fault { t, .. } => *t,
        }
    }
}

/// Observability-level event kind, broader than `DetectorEvent`: includes
/// coordinator/worker level occurrences that are not stage transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RampStarted,
    Stable,
    StageEnded,
    Fault,
    Anomaly,
    Degraded,
    Heartbeat,
}

/// Flattened event record, the shape appended via `StateSink::append_event`
/// and embedded in `RunRecord::events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub t: u64,
    pub kind: EventKind,
    pub zone: Option<Zone>,
    pub detail: String,
}

impl From<&DetectorEvent> for Event {
    fn from(ev: &DetectorEvent) -> Self {
        match ev {
            DetectorEvent::RampStarted { zone, baseline_f, t } => Event {
                t: *t,
                kind: EventKind::RampStarted,
                zone: Some(*zone),
                detail: format!("baseline_f={baseline_f:.1}"),
            },
            DetectorEvent::Stable { zone, t } => Event {
                t: *t,
                kind: EventKind::Stable,
                zone: Some(*zone),
                detail: String::new(),
            },
            DetectorEvent::StageEnded { zone, outcome, t } => Event {
                t: *t,
                kind: EventKind::StageEnded,
                zone: Some(*zone),
                detail: format!("{outcome:?}"),
            },
            DetectorEvent::Fault { zone, reason, t } => Event {
                t: *t,
                kind: EventKind::Fault,
                zone: Some(*zone),
                detail: reason.as_str().to_string(),
            },
        }
    }
}

/// Point-in-time snapshot of a `RunningStats` accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub n: u64,
    pub mean: f64,
    pub variance: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub first_t: Option<u64>,
    pub last_t: Option<u64>,
}

impl StatsSnapshot {
    /// The all-NaN snapshot reported for a stage that closed with zero
    /// valid samples.
    pub const fn empty() -> Self {
        Self {
            n: 0,
            mean: f64::NAN,
            variance: f64::NAN,
            stddev: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            first_t: None,
            last_t: None,
        }
    }
}

/// Finalized record for one zone's traversal of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub zone: Zone,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: StageOutcome,
    pub stats: StatsSnapshot,
    pub setpoint_f: f64,
}

/// One zone's entry in a closed `RunRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunZoneSummary {
    pub zone: Zone,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: StageOutcome,
    pub samples_n: u64,
    pub mean_f: f64,
    pub stddev_f: f64,
    pub min_f: f64,
    pub max_f: f64,
    pub setpoint_f: f64,
}

/// The structured record produced exactly once per run, on close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub line_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub termination: TerminationKind,
    pub partial: bool,
    pub zones: Vec<RunZoneSummary>,
    pub events: Vec<Event>,
}
