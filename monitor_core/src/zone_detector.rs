//! Per-zone Stage-Detection Finite State Machine.
//!
//! `ZoneDetector` consumes one zone's sample stream and emits stage
//! lifecycle events. It is deterministic and pure: no I/O, no clock reads
//! of its own — every notion of "now" arrives via `sample.t_monotonic_ms`.

use std::collections::VecDeque;

use monitor_traits::{DetectorEvent, FaultKind, Sample, StageKind, StageOutcome, Zone};
use serde::{Deserialize, Serialize};

use crate::config::DetectorCfg;
use crate::stats::RunningStats;
use crate::util::trailing_slope_per_min;

const TRAILING_WINDOW_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PendingSetpoint {
    value: f64,
    first_seen_at: u64,
}

/// Side-channel signal that never affects the per-zone stage grammar: a
/// clock regression or a sustained sensor dropout. Surfaced to the
/// coordinator/state sink as observability, not as a `DetectorEvent`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anomaly {
    TimeWentBackward { zone: Zone, at: u64 },
    Degraded { zone: Zone, at: u64 },
}

#[derive(Debug, Default)]
pub struct StepOutput {
    pub events: Vec<DetectorEvent>,
    pub anomalies: Vec<Anomaly>,
}

/// Everything a detector needs to resume exactly where it left off,
/// Welford moments included. Part of the line's runtime-state checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorState {
    stage: StageKind,
    stage_entered_at: u64,
    last_t: Option<u64>,
    last_valid_t: Option<u64>,
    invalid_streak: u32,
    invalid_since: Option<u64>,
    last_accepted_setpoint: Option<f64>,
    pending_setpoint: Option<PendingSetpoint>,
    in_band_since: Option<u64>,
    out_of_band_since: Option<u64>,
    baseline_temp: Option<f64>,
    window: Vec<(u64, f64)>,
    stats: RunningStats,
    setpoint_at_stage_entry: Option<f64>,
}

/// One zone's state machine for the lifetime of a single run. A fresh
/// instance is created lazily at the zone's first sample of a run and
/// retained until the run closes.
#[derive(Debug, Clone)]
pub struct ZoneDetector {
    zone: Zone,
    cfg: DetectorCfg,

    stage: StageKind,
    stage_entered_at: u64,

    last_t: Option<u64>,
    last_valid_t: Option<u64>,
    invalid_streak: u32,
    invalid_since: Option<u64>,

    last_accepted_setpoint: Option<f64>,
    pending_setpoint: Option<PendingSetpoint>,

    in_band_since: Option<u64>,
    out_of_band_since: Option<u64>,
    baseline_temp: Option<f64>,

    window: VecDeque<(u64, f64)>,
    stats: RunningStats,
    setpoint_at_stage_entry: Option<f64>,
}

impl ZoneDetector {
    pub fn new(zone: Zone, cfg: DetectorCfg) -> Self {
        Self {
            zone,
            cfg,
            stage: StageKind::Idle,
            stage_entered_at: 0,
            last_t: None,
            last_valid_t: None,
            invalid_streak: 0,
            invalid_since: None,
            last_accepted_setpoint: None,
            pending_setpoint: None,
            in_band_since: None,
            out_of_band_since: None,
            baseline_temp: None,
            window: VecDeque::new(),
            stats: RunningStats::new(),
            setpoint_at_stage_entry: None,
        }
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    pub fn setpoint_at_stage_entry(&self) -> Option<f64> {
        self.setpoint_at_stage_entry
    }

    pub fn stage_entered_at(&self) -> u64 {
        self.stage_entered_at
    }

    /// Monotonic time of the first sample in the current uninterrupted
    /// invalid streak, if the stream is currently invalid.
    pub fn invalid_since(&self) -> Option<u64> {
        self.invalid_since
    }

    pub fn state(&self) -> DetectorState {
        DetectorState {
            stage: self.stage,
            stage_entered_at: self.stage_entered_at,
            last_t: self.last_t,
            last_valid_t: self.last_valid_t,
            invalid_streak: self.invalid_streak,
            invalid_since: self.invalid_since,
            last_accepted_setpoint: self.last_accepted_setpoint,
            pending_setpoint: self.pending_setpoint,
            in_band_since: self.in_band_since,
            out_of_band_since: self.out_of_band_since,
            baseline_temp: self.baseline_temp,
            window: self.window.iter().copied().collect(),
            stats: self.stats,
            setpoint_at_stage_entry: self.setpoint_at_stage_entry,
        }
    }

    pub fn from_state(zone: Zone, cfg: DetectorCfg, state: DetectorState) -> Self {
        Self {
            zone,
            cfg,
            stage: state.stage,
            stage_entered_at: state.stage_entered_at,
            last_t: state.last_t,
            last_valid_t: state.last_valid_t,
            invalid_streak: state.invalid_streak,
            invalid_since: state.invalid_since,
            last_accepted_setpoint: state.last_accepted_setpoint,
            pending_setpoint: state.pending_setpoint,
            in_band_since: state.in_band_since,
            out_of_band_since: state.out_of_band_since,
            baseline_temp: state.baseline_temp,
            window: state.window.into_iter().collect(),
            stats: state.stats,
            setpoint_at_stage_entry: state.setpoint_at_stage_entry,
        }
    }

    /// Feed one sample and return the events (and side-channel anomalies)
    /// it produced. Deterministic: the same sequence of calls always
    /// produces the same sequence of outputs.
    pub fn step(&mut self, sample: Sample) -> StepOutput {
        debug_assert_eq!(sample.zone, self.zone);
        let mut out = StepOutput::default();

        if let Some(last_t) = self.last_t {
            if sample.t_monotonic_ms < last_t {
                out.anomalies.push(Anomaly::TimeWentBackward {
                    zone: self.zone,
                    at: last_t,
                });
                return out; // no state mutation
            }
        }
        self.last_t = Some(sample.t_monotonic_ms);

        if !sample.valid {
            self.invalid_streak = self.invalid_streak.saturating_add(1);
            if self.invalid_since.is_none() {
                self.invalid_since = Some(sample.t_monotonic_ms);
            }
            if self.invalid_streak > 2 {
                out.anomalies.push(Anomaly::Degraded {
                    zone: self.zone,
                    at: sample.t_monotonic_ms,
                });
            }
            return out;
        }
        self.invalid_streak = 0;
        self.invalid_since = None;

        match self.stage {
            StageKind::Idle => self.step_idle(&sample, &mut out.events),
            StageKind::Ramp => self.step_ramp(&sample, &mut out.events),
            StageKind::Stable => self.step_stable(&sample, &mut out.events),
            StageKind::End => {}
        }

        out
    }

    /// Close the zone's in-flight stage as `Faulted` without a triggering
    /// sample. Used for conditions the detector cannot see on its own, such
    /// as a sustained dropout the coordinator has decided to give up on.
    pub fn force_fault(&mut self, t: u64, reason: FaultKind) -> Vec<DetectorEvent> {
        let mut events = Vec::new();
        if matches!(self.stage, StageKind::Ramp | StageKind::Stable) {
            events.push(DetectorEvent::Fault {
                zone: self.zone,
                reason,
                t,
            });
            self.close_stage(t, StageOutcome::Faulted, &mut events);
        }
        events
    }

    fn push_window(&mut self, t: u64, temp: f64) {
        self.window.push_back((t, temp));
        // Keep one sample at or beyond the window edge so the window spans
        // the full trailing interval once enough history exists.
        while self
            .window
            .get(1)
            .is_some_and(|&(second_t, _)| t.saturating_sub(second_t) >= TRAILING_WINDOW_MS)
        {
            self.window.pop_front();
        }
    }

    /// True once the trailing window holds a full interval of history.
    fn window_spans_trailing_interval(&self) -> bool {
        self.window
            .front()
            .zip(self.window.back())
            .is_some_and(|(&(first, _), &(last, _))| {
                last.saturating_sub(first) >= TRAILING_WINDOW_MS
            })
    }

    fn gap_since_last_valid(&self, t: u64) -> Option<u64> {
        self.last_valid_t.map(|last| t.saturating_sub(last))
    }

    fn enter_ramp(
        &mut self,
        t: u64,
        baseline: f64,
        temperature: f64,
        setpoint: f64,
        events: &mut Vec<DetectorEvent>,
    ) {
        self.stage = StageKind::Ramp;
        self.stage_entered_at = t;
        self.baseline_temp = Some(baseline);
        // An entering sample already inside the band starts the dwell.
        self.in_band_since = if (temperature - setpoint).abs() <= self.cfg.tol_f {
            Some(t)
        } else {
            None
        };
        self.out_of_band_since = None;
        self.stats = RunningStats::new();
        self.window.clear();
        self.setpoint_at_stage_entry = Some(setpoint);
        events.push(DetectorEvent::RampStarted {
            zone: self.zone,
            baseline_f: baseline,
            t,
        });
    }

    fn close_stage(&mut self, t: u64, outcome: StageOutcome, events: &mut Vec<DetectorEvent>) {
        self.stage = StageKind::End;
        events.push(DetectorEvent::StageEnded {
            zone: self.zone,
            outcome,
            t,
        });
    }

    fn step_idle(&mut self, sample: &Sample, events: &mut Vec<DetectorEvent>) {
        if let Some(accepted) = self.last_accepted_setpoint {
            let jump = sample.setpoint_f - accepted;
            if jump.abs() >= self.cfg.s_min_f {
                let accept_now = match self.pending_setpoint {
                    Some(p) if (p.value - sample.setpoint_f).abs() < f64::EPSILON => {
                        sample.t_monotonic_ms.saturating_sub(p.first_seen_at)
                            >= self.cfg.t_sp_sustain_ms()
                    }
                    _ => false,
                };
                if accept_now {
                    self.pending_setpoint = None;
                    self.last_accepted_setpoint = Some(sample.setpoint_f);
                    let baseline = sample.temperature_f;
                    self.enter_ramp(
                        sample.t_monotonic_ms,
                        baseline,
                        sample.temperature_f,
                        sample.setpoint_f,
                        events,
                    );
                    self.stats.update(sample.temperature_f, sample.t_monotonic_ms);
                    self.push_window(sample.t_monotonic_ms, sample.temperature_f);
                    self.last_valid_t = Some(sample.t_monotonic_ms);
                    return;
                }
                match &mut self.pending_setpoint {
                    Some(p) if (p.value - sample.setpoint_f).abs() < f64::EPSILON => {}
                    _ => {
                        self.pending_setpoint = Some(PendingSetpoint {
                            value: sample.setpoint_f,
                            first_seen_at: sample.t_monotonic_ms,
                        });
                    }
                }
            } else {
                self.pending_setpoint = None;
            }
        } else {
            self.last_accepted_setpoint = Some(sample.setpoint_f);
        }

        self.push_window(sample.t_monotonic_ms, sample.temperature_f);
        self.last_valid_t = Some(sample.t_monotonic_ms);

        // Setpoint jump wins over thermal ramp when both would fire on the
        // same sample (the jump carries the better baseline). The slope is
        // only trusted once the trailing window spans its full interval; a
        // fast rise over a few seconds of history is not a confirmed ramp.
        if !self.window_spans_trailing_interval() {
            return;
        }
        if let Some((slope, window_min)) =
            trailing_slope_per_min(&self.window.iter().copied().collect::<Vec<_>>())
        {
            if window_min.is_finite() {
                let rise = sample.temperature_f - window_min;
                tracing::trace!(
                    zone = %self.zone,
                    t = sample.t_monotonic_ms,
                    slope,
                    rise,
                    "thermal ramp check"
                );
                if rise >= self.cfg.delta_ramp_f && slope >= self.cfg.dt_min_f_per_min {
                    self.enter_ramp(
                        sample.t_monotonic_ms,
                        window_min,
                        sample.temperature_f,
                        sample.setpoint_f,
                        events,
                    );
                    self.stats.update(sample.temperature_f, sample.t_monotonic_ms);
                }
            }
        }
    }

    fn step_ramp(&mut self, sample: &Sample, events: &mut Vec<DetectorEvent>) {
        if let Some(gap) = self.gap_since_last_valid(sample.t_monotonic_ms) {
            if gap > self.cfg.gap_tolerance_ms() {
                self.in_band_since = None;
            }
        }

        let abs_diff = (sample.temperature_f - sample.setpoint_f).abs();
        if abs_diff <= self.cfg.tol_f {
            if self.in_band_since.is_none() {
                self.in_band_since = Some(sample.t_monotonic_ms);
            }
        } else {
            self.in_band_since = None;
        }

        self.stats.update(sample.temperature_f, sample.t_monotonic_ms);
        self.last_valid_t = Some(sample.t_monotonic_ms);

        if let Some(since) = self.in_band_since {
            if sample.t_monotonic_ms.saturating_sub(since) >= self.cfg.t_stable_ms() {
                self.stage = StageKind::Stable;
                self.out_of_band_since = None;
                events.push(DetectorEvent::Stable {
                    zone: self.zone,
                    t: sample.t_monotonic_ms,
                });
                return;
            }
        }

        if sample.t_monotonic_ms.saturating_sub(self.stage_entered_at) >= self.cfg.max_ramp_ms() {
            events.push(DetectorEvent::Fault {
                zone: self.zone,
                reason: FaultKind::TimeoutRamp,
                t: sample.t_monotonic_ms,
            });
            self.close_stage(sample.t_monotonic_ms, StageOutcome::Faulted, events);
        }
    }

    fn step_stable(&mut self, sample: &Sample, events: &mut Vec<DetectorEvent>) {
        // All comparisons in STABLE reference the setpoint this stage
        // stabilized at, so transient operator edits below S_min_F cannot
        // shift the band out from under the dwell timers.
        let accepted = self.last_accepted_setpoint.unwrap_or(sample.setpoint_f);
        let jump = sample.setpoint_f - accepted;

        if jump >= self.cfg.s_min_f {
            // Upward setpoint edit: this stage is done at the old setpoint
            // and a fresh ramp begins toward the new one.
            self.close_stage(sample.t_monotonic_ms, StageOutcome::Completed, events);
            self.last_accepted_setpoint = Some(sample.setpoint_f);
            self.enter_ramp(
                sample.t_monotonic_ms,
                sample.temperature_f,
                sample.temperature_f,
                sample.setpoint_f,
                events,
            );
            self.stats.update(sample.temperature_f, sample.t_monotonic_ms);
            self.push_window(sample.t_monotonic_ms, sample.temperature_f);
            self.last_valid_t = Some(sample.t_monotonic_ms);
            return;
        }

        if let Some(gap) = self.gap_since_last_valid(sample.t_monotonic_ms) {
            if gap > self.cfg.gap_tolerance_ms() {
                self.out_of_band_since = None;
            }
        }

        // Two cooldown signals arm the end-of-stage dwell: the temperature
        // falling DeltaOff_F below the stage setpoint, or the setpoint
        // itself being cut by at least DeltaOff_F. Downward edits smaller
        // than that are transients.
        let temp_dropped = accepted - sample.temperature_f >= self.cfg.delta_off_f;
        let setpoint_dropped = jump <= -self.cfg.delta_off_f;
        if temp_dropped || setpoint_dropped {
            if self.out_of_band_since.is_none() {
                self.out_of_band_since = Some(sample.t_monotonic_ms);
            }
        } else {
            self.out_of_band_since = None;
        }

        self.stats.update(sample.temperature_f, sample.t_monotonic_ms);
        self.last_valid_t = Some(sample.t_monotonic_ms);

        if let Some(since) = self.out_of_band_since {
            if sample.t_monotonic_ms.saturating_sub(since) >= self.cfg.t_off_sustain_ms() {
                self.close_stage(sample.t_monotonic_ms, StageOutcome::Completed, events);
                return;
            }
        }

        if sample.t_monotonic_ms.saturating_sub(self.stage_entered_at) >= self.cfg.max_stage_ms() {
            events.push(DetectorEvent::Fault {
                zone: self.zone,
                reason: FaultKind::TimeoutStage,
                t: sample.t_monotonic_ms,
            });
            self.close_stage(sample.t_monotonic_ms, StageOutcome::TimedOut, events);
        }
    }
}
