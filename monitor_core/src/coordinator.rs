//! Run Coordinator: composes the per-zone detectors for one production
//! line into a linear cycle, owns run-id lifecycle, and emits `RunRecord`.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use monitor_traits::{
    DetectorEvent, Event, EventKind, FaultKind, RunRecord, RunZoneSummary, Sample, StageKind,
    StageOutcome, StageRecord, TerminationKind, Zone,
};
use serde::{Deserialize, Serialize};

use crate::config::{CoordinatorCfg, DetectorCfg, MonitorConfig};
use crate::util::trailing_slope_per_min;
use crate::zone_detector::{Anomaly, DetectorState, ZoneDetector};

const QUIET_RING_EXTRA: usize = 8;
/// A run's cumulative event log is bounded; when full, observability
/// chatter (anomalies, degraded notices) is evicted before stage history.
const RUN_EVENTS_CAP: usize = 1024;

#[derive(Debug, Default)]
pub struct TickOutcome {
    pub events: Vec<Event>,
    pub stage_closed: Vec<StageRecord>,
    pub run_closed: Option<RunRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneRunInfo {
    started_at_wall: Option<DateTime<Utc>>,
    ended_at_wall: Option<DateTime<Utc>>,
    outcome: StageOutcome,
    setpoint_f: Option<f64>,
}

impl Default for ZoneRunInfo {
    fn default() -> Self {
        Self {
            started_at_wall: None,
            ended_at_wall: None,
            outcome: StageOutcome::Skipped,
            setpoint_f: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActiveRun {
    run_id: String,
    started_at_wall: DateTime<Utc>,
    current_zone_idx: usize,
    zone_info: Vec<(Zone, ZoneRunInfo)>,
    fault_recovery_deadline: Option<u64>,
    events: Vec<Event>,
}

impl ActiveRun {
    fn info_mut(&mut self, zone: Zone) -> &mut ZoneRunInfo {
        if let Some(idx) = self.zone_info.iter().position(|(z, _)| *z == zone) {
            return &mut self.zone_info[idx].1;
        }
        self.zone_info.push((zone, ZoneRunInfo::default()));
        let last = self.zone_info.len() - 1;
        &mut self.zone_info[last].1
    }

    fn info(&self, zone: Zone) -> Option<&ZoneRunInfo> {
        self.zone_info.iter().find(|(z, _)| *z == zone).map(|(_, i)| i)
    }

    fn push_event(&mut self, ev: Event) {
        if self.events.len() >= RUN_EVENTS_CAP {
            if let Some(pos) = self
                .events
                .iter()
                .position(|e| matches!(e.kind, EventKind::Anomaly | EventKind::Degraded | EventKind::Heartbeat))
            {
                self.events.remove(pos);
            } else {
                self.events.remove(0);
            }
        }
        self.events.push(ev);
    }
}

/// Full dynamic state of one line's coordinator, serialized into the
/// runtime-state checkpoint and restored on startup. Config thresholds are
/// not part of it; they are re-supplied from the live configuration, which
/// must carry the same version for the state to be accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorState {
    config_version: u32,
    line_id: String,
    run_seq: u64,
    last_t: u64,
    detectors: Vec<(Zone, DetectorState)>,
    quiet_rings: Vec<(Zone, Vec<(u64, f64)>)>,
    run: Option<ActiveRun>,
}

/// Point-in-time view of a line for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneStatus {
    pub zone: Zone,
    pub stage: StageKind,
    pub stage_entered_at: u64,
    pub samples_n: u64,
    pub mean_f: f64,
    pub min_f: f64,
    pub max_f: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineStatus {
    pub line_id: String,
    pub run_id: Option<String>,
    pub run_started_at: Option<DateTime<Utc>>,
    pub current_zone: Option<Zone>,
    pub zones: Vec<ZoneStatus>,
}

/// Composes the enabled zones of one line into the `Preheat -> Main -> Rib`
/// cycle, opening and closing runs as zones transition.
pub struct RunCoordinator {
    line_id: String,
    config_version: u32,
    cycle_order: Vec<Zone>,
    detector_cfg: DetectorCfg,
    coord_cfg: CoordinatorCfg,
    detectors: HashMap<Zone, ZoneDetector>,
    quiet_ring: HashMap<Zone, VecDeque<(u64, f64)>>,
    run: Option<ActiveRun>,
    run_seq: u64,
    last_t: u64,
}

impl RunCoordinator {
    pub fn new(cfg: &MonitorConfig) -> Self {
        let cycle_order: Vec<Zone> = Zone::CANONICAL_ORDER
            .into_iter()
            .filter(|z| cfg.zones.is_enabled(*z))
            .collect();
        let detectors = cycle_order
            .iter()
            .map(|&z| (z, ZoneDetector::new(z, cfg.detector)))
            .collect();
        let quiet_ring = cycle_order.iter().map(|&z| (z, VecDeque::new())).collect();
        Self {
            line_id: cfg.line_id.clone(),
            config_version: cfg.version,
            cycle_order,
            detector_cfg: cfg.detector,
            coord_cfg: cfg.coordinator,
            detectors,
            quiet_ring,
            run: None,
            run_seq: 0,
            last_t: 0,
        }
    }

    pub fn line_id(&self) -> &str {
        &self.line_id
    }

    pub fn cycle_order(&self) -> &[Zone] {
        &self.cycle_order
    }

    pub fn is_run_open(&self) -> bool {
        self.run.is_some()
    }

    /// Highest monotonic timestamp observed across all zones.
    pub fn last_t(&self) -> u64 {
        self.last_t
    }

    pub fn current_zone(&self) -> Option<Zone> {
        self.run
            .as_ref()
            .and_then(|r| self.cycle_order.get(r.current_zone_idx).copied())
    }

    /// Serialize the coordinator's dynamic state for checkpointing.
    pub fn state(&self) -> CoordinatorState {
        CoordinatorState {
            config_version: self.config_version,
            line_id: self.line_id.clone(),
            run_seq: self.run_seq,
            last_t: self.last_t,
            detectors: self
                .cycle_order
                .iter()
                .map(|&z| (z, self.detectors[&z].state()))
                .collect(),
            quiet_rings: self
                .cycle_order
                .iter()
                .map(|&z| (z, self.quiet_ring[&z].iter().copied().collect()))
                .collect(),
            run: self.run.clone(),
        }
    }

    /// Reconstitute a coordinator from a checkpoint. Returns `None` when the
    /// state was written by a different line or config version, in which
    /// case the caller starts fresh.
    pub fn restore(cfg: &MonitorConfig, state: CoordinatorState) -> Option<Self> {
        if state.line_id != cfg.line_id || state.config_version != cfg.version {
            return None;
        }
        let mut coordinator = Self::new(cfg);
        let state_zones: Vec<Zone> = state.detectors.iter().map(|(z, _)| *z).collect();
        if state_zones != coordinator.cycle_order {
            return None;
        }
        for (zone, det_state) in state.detectors {
            coordinator
                .detectors
                .insert(zone, ZoneDetector::from_state(zone, cfg.detector, det_state));
        }
        for (zone, ring) in state.quiet_rings {
            coordinator.quiet_ring.insert(zone, ring.into_iter().collect());
        }
        coordinator.run = state.run;
        coordinator.run_seq = state.run_seq;
        coordinator.last_t = state.last_t;
        Some(coordinator)
    }

    pub fn to_checkpoint(&self) -> Vec<u8> {
        serde_json::to_vec(&self.state()).unwrap_or_default()
    }

    pub fn from_checkpoint(cfg: &MonitorConfig, blob: &[u8]) -> Option<Self> {
        let state: CoordinatorState = serde_json::from_slice(blob).ok()?;
        Self::restore(cfg, state)
    }

    pub fn status(&self) -> LineStatus {
        LineStatus {
            line_id: self.line_id.clone(),
            run_id: self.run.as_ref().map(|r| r.run_id.clone()),
            run_started_at: self.run.as_ref().map(|r| r.started_at_wall),
            current_zone: self.current_zone(),
            zones: self
                .cycle_order
                .iter()
                .map(|&z| {
                    let d = &self.detectors[&z];
                    let snap = d.stats().snapshot();
                    ZoneStatus {
                        zone: z,
                        stage: d.stage(),
                        stage_entered_at: d.stage_entered_at(),
                        samples_n: snap.n,
                        mean_f: snap.mean,
                        min_f: snap.min,
                        max_f: snap.max,
                    }
                })
                .collect(),
        }
    }

    fn quiet_ring_cap_hint(&self) -> usize {
        let period_ms = self.detector_cfg.sampling_period_ms().max(1);
        (self.coord_cfg.quiet_window_ms() / period_ms) as usize + QUIET_RING_EXTRA
    }

    fn push_quiet_ring(&mut self, zone: Zone, sample: &Sample) {
        if !sample.valid {
            return;
        }
        let window_ms = self.coord_cfg.quiet_window_ms();
        let cap_hint = self.quiet_ring_cap_hint();
        let ring = self.quiet_ring.entry(zone).or_default();
        ring.push_back((sample.t_monotonic_ms, sample.temperature_f));
        while let Some(&(t, _)) = ring.front() {
            if sample.t_monotonic_ms.saturating_sub(t) > window_ms {
                ring.pop_front();
            } else {
                break;
            }
        }
        while ring.len() > cap_hint {
            ring.pop_front();
        }
    }

    /// One worker tick: step every enabled zone's detector and apply the
    /// resulting events to run lifecycle.
    pub fn observe(&mut self, samples: &HashMap<Zone, Sample>) -> TickOutcome {
        let mut out = TickOutcome::default();
        let mut detector_events: Vec<(Zone, DetectorEvent)> = Vec::new();

        for zone in self.cycle_order.clone() {
            let Some(sample) = samples.get(&zone) else {
                continue;
            };
            self.last_t = self.last_t.max(sample.t_monotonic_ms);
            self.push_quiet_ring(zone, sample);
            let Some(detector) = self.detectors.get_mut(&zone) else {
                continue;
            };
            let step_out = detector.step(*sample);
            for a in step_out.anomalies {
                self.emit(anomaly_to_event(a), &mut out);
            }
            for e in step_out.events {
                detector_events.push((zone, e));
            }
        }

        for (zone, ev) in detector_events {
            self.handle_zone_event(zone, ev, samples, &mut out);
        }

        self.check_sustained_invalidity(samples, &mut out);
        self.check_recovery_deadline(samples, &mut out);

        if self.run.is_some() && !self.recovery_window_open() && self.all_zones_end_or_idle() {
            if let Some(kind) = self.quiet_termination_kind() {
                tracing::debug!(?kind, "quiet window satisfied, closing run");
                self.close_run(kind, samples, &mut out);
            }
        }

        out
    }

    fn recovery_window_open(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|r| r.fault_recovery_deadline.is_some())
    }

    /// A current zone mid-stage whose sensor has been invalid for longer
    /// than half the ramp budget is unrecoverable by waiting; fault it.
    fn check_sustained_invalidity(&mut self, samples: &HashMap<Zone, Sample>, out: &mut TickOutcome) {
        let Some(run) = self.run.as_ref() else { return };
        let Some(&zone) = self.cycle_order.get(run.current_zone_idx) else {
            return;
        };
        let Some(detector) = self.detectors.get_mut(&zone) else {
            return;
        };
        if !matches!(detector.stage(), StageKind::Ramp | StageKind::Stable) {
            return;
        }
        let Some(since) = detector.invalid_since() else {
            return;
        };
        if self.last_t.saturating_sub(since) > self.detector_cfg.max_ramp_ms() / 2 {
            let events = detector.force_fault(self.last_t, FaultKind::SensorInvalid);
            for ev in events {
                self.handle_zone_event(zone, ev, samples, out);
            }
        }
    }

    /// A faulted zone keeps the run open only while a successor ramp can
    /// still arrive; past the deadline the run closes as faulted.
    fn check_recovery_deadline(&mut self, samples: &HashMap<Zone, Sample>, out: &mut TickOutcome) {
        let expired = self
            .run
            .as_ref()
            .and_then(|r| r.fault_recovery_deadline)
            .is_some_and(|deadline| self.last_t > deadline);
        if expired {
            self.close_run(TerminationKind::Faulted, samples, out);
        }
    }

    fn all_zones_end_or_idle(&self) -> bool {
        self.cycle_order
            .iter()
            .all(|z| matches!(self.detectors[z].stage(), StageKind::End | StageKind::Idle))
    }

    /// `Some(kind)` once every enabled zone's quiet ring both spans the
    /// full `quiet_window_s` and shows a flat trailing slope.
    fn quiet_termination_kind(&self) -> Option<TerminationKind> {
        let window_ms = self.coord_cfg.quiet_window_ms();
        for zone in &self.cycle_order {
            let ring = &self.quiet_ring[zone];
            let (Some(&(oldest, _)), Some(&(newest, _))) = (ring.front(), ring.back()) else {
                return None;
            };
            if newest.saturating_sub(oldest) < window_ms {
                return None;
            }
            let pts: Vec<_> = ring.iter().copied().collect();
            let Some((slope, _)) = trailing_slope_per_min(&pts) else {
                return None;
            };
            if slope.abs() > self.coord_cfg.dt_quiet_f_per_min {
                return None;
            }
        }
        let partial = self
            .cycle_order
            .iter()
            .any(|z| !matches!(self.zone_outcome(*z), StageOutcome::Completed));
        Some(if partial {
            TerminationKind::PartialQuiet
        } else {
            TerminationKind::Completed
        })
    }

    /// Push an event to this tick's outcome and, if a run is open, to that
    /// run's cumulative event log (what ends up in `RunRecord::events`).
    fn emit(&mut self, ev: Event, out: &mut TickOutcome) {
        if let Some(run) = self.run.as_mut() {
            run.push_event(ev.clone());
        }
        out.events.push(ev);
    }

    fn zone_outcome(&self, zone: Zone) -> StageOutcome {
        self.run
            .as_ref()
            .and_then(|r| r.info(zone))
            .map(|i| i.outcome)
            .unwrap_or(StageOutcome::Skipped)
    }

    fn handle_zone_event(
        &mut self,
        zone: Zone,
        ev: DetectorEvent,
        samples: &HashMap<Zone, Sample>,
        out: &mut TickOutcome,
    ) {
        match ev {
            DetectorEvent::RampStarted { t, baseline_f, .. } => {
                self.on_ramp_started(zone, t, baseline_f, samples, out)
            }
            DetectorEvent::Stable { .. } | DetectorEvent::Fault { .. } => {
                let e = Event::from(&ev);
                self.emit(e, out);
            }
            DetectorEvent::StageEnded { outcome, t, .. } => {
                self.on_stage_ended(zone, outcome, t, samples, out)
            }
        }
    }

    fn on_ramp_started(
        &mut self,
        zone: Zone,
        t: u64,
        baseline_f: f64,
        samples: &HashMap<Zone, Sample>,
        out: &mut TickOutcome,
    ) {
        let wall = samples.get(&zone).map(|s| s.t_wall).unwrap_or_else(Utc::now);
        let setpoint_f = samples.get(&zone).map(|s| s.setpoint_f);

        if self.run.is_none() {
            let Some(idx) = self.cycle_order.iter().position(|&z| z == zone) else {
                return;
            };
            if idx != 0 && !self.coord_cfg.allow_main_without_preheat {
                // The flag gates which zone may open a run at all; a ramp
                // elsewhere is routine controller activity, not an anomaly.
                return;
            }
            let run_id = self.next_run_id(wall);
            self.run = Some(ActiveRun {
                run_id,
                started_at_wall: wall,
                current_zone_idx: idx,
                zone_info: Vec::new(),
                fault_recovery_deadline: None,
                events: Vec::new(),
            });
        }

        let Some(run) = self.run.as_mut() else { return };
        let current_zone = self.cycle_order[run.current_zone_idx];

        if zone == current_zone {
            *run.info_mut(zone) = ZoneRunInfo {
                started_at_wall: Some(wall),
                ended_at_wall: None,
                outcome: StageOutcome::Skipped,
                setpoint_f,
            };
            let ev = Event {
                t,
                kind: EventKind::RampStarted,
                zone: Some(zone),
                detail: format!("baseline_f={baseline_f:.1}"),
            };
            run.push_event(ev.clone());
            out.events.push(ev);
            return;
        }

        let Some(zone_idx) = self.cycle_order.iter().position(|&z| z == zone) else {
            return;
        };
        if zone_idx < run.current_zone_idx {
            tracing::debug!(%zone, t, "ramp from earlier zone ignored");
            let ev = Event {
                t,
                kind: EventKind::Anomaly,
                zone: Some(zone),
                detail: "ramp from earlier zone ignored (out of order)".to_string(),
            };
            run.push_event(ev.clone());
            out.events.push(ev);
            return;
        }

        // Later zone: a recovery hint. Only acts if we are within the
        // fault-recovery window opened by the current zone's Fault.
        if let Some(deadline) = run.fault_recovery_deadline {
            if t <= deadline {
                run.current_zone_idx = zone_idx;
                run.fault_recovery_deadline = None;
                *run.info_mut(zone) = ZoneRunInfo {
                    started_at_wall: Some(wall),
                    ended_at_wall: None,
                    outcome: StageOutcome::Skipped,
                    setpoint_f,
                };
                let ev = Event {
                    t,
                    kind: EventKind::RampStarted,
                    zone: Some(zone),
                    detail: format!("baseline_f={baseline_f:.1} (recovered)"),
                };
                run.push_event(ev.clone());
                out.events.push(ev);
            }
        }
    }

    fn on_stage_ended(
        &mut self,
        zone: Zone,
        outcome: StageOutcome,
        t: u64,
        samples: &HashMap<Zone, Sample>,
        out: &mut TickOutcome,
    ) {
        let stats = self
            .detectors
            .get(&zone)
            .map(|d| d.stats().snapshot())
            .unwrap_or_else(monitor_traits::StatsSnapshot::empty);
        let reentered_ramp = self
            .detectors
            .get(&zone)
            .is_some_and(|d| d.stage() == StageKind::Ramp);

        let Some(run) = self.run.as_mut() else { return };
        let current_zone = self.cycle_order[run.current_zone_idx];
        if zone != current_zone {
            let ev = Event {
                t,
                kind: EventKind::Anomaly,
                zone: Some(zone),
                detail: "stage-ended from non-current zone ignored".to_string(),
            };
            run.push_event(ev.clone());
            out.events.push(ev);
            return;
        }

        let wall = samples.get(&zone).map(|s| s.t_wall).unwrap_or_else(Utc::now);
        let info = run.info_mut(zone);
        info.ended_at_wall = Some(wall);
        info.outcome = outcome;

        let record = StageRecord {
            zone,
            started_at: info.started_at_wall.unwrap_or(wall),
            ended_at: Some(wall),
            outcome,
            stats,
            setpoint_f: info.setpoint_f.unwrap_or(f64::NAN),
        };
        out.stage_closed.push(record);
        let ev = Event {
            t,
            kind: EventKind::StageEnded,
            zone: Some(zone),
            detail: format!("{outcome:?}"),
        };
        run.push_event(ev.clone());
        out.events.push(ev);

        if reentered_ramp {
            // The detector already opened a fresh stage on the same zone
            // (upward setpoint edit in STABLE); the cycle does not advance.
            return;
        }

        match outcome {
            StageOutcome::Faulted => {
                let has_successor = run.current_zone_idx + 1 < self.cycle_order.len();
                if self.coord_cfg.continue_after_fault_if_next_stage_ramps && has_successor {
                    run.fault_recovery_deadline = Some(t + 2 * self.detector_cfg.max_ramp_ms());
                } else {
                    self.close_run(TerminationKind::Faulted, samples, out);
                }
            }
            _ => {
                if run.current_zone_idx + 1 >= self.cycle_order.len() {
                    self.close_run(TerminationKind::Completed, samples, out);
                } else {
                    run.current_zone_idx += 1;
                }
            }
        }
    }

    /// External request: close the open run as `Aborted`. Any zone mid
    /// stage is folded in with its current accumulated stats.
    pub fn abort_run(
        &mut self,
        now_t: u64,
        now_wall: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Option<RunRecord> {
        self.run.as_ref()?;
        let mut out = TickOutcome::default();
        if let Some(run) = self.run.as_mut() {
            run.push_event(Event {
                t: now_t,
                kind: EventKind::Anomaly,
                zone: None,
                detail: match reason {
                    Some(r) => format!("abort requested: {r}"),
                    None => "abort requested".to_string(),
                },
            });
        }
        self.finalize_in_progress_zone(now_wall);
        self.close_run_at(TerminationKind::Aborted, now_wall, &mut out);
        out.run_closed
    }

    fn finalize_in_progress_zone(&mut self, now_wall: DateTime<Utc>) {
        let Some(run) = self.run.as_mut() else { return };
        let current_zone = self.cycle_order[run.current_zone_idx];
        if matches!(
            self.detectors[&current_zone].stage(),
            StageKind::Ramp | StageKind::Stable
        ) {
            let entry = run.info_mut(current_zone);
            if entry.started_at_wall.is_some() && entry.ended_at_wall.is_none() {
                entry.ended_at_wall = Some(now_wall);
                entry.outcome = StageOutcome::Faulted;
            }
        }
    }

    fn close_run(&mut self, kind: TerminationKind, samples: &HashMap<Zone, Sample>, out: &mut TickOutcome) {
        let wall = self
            .cycle_order
            .iter()
            .find_map(|z| samples.get(z).map(|s| s.t_wall))
            .unwrap_or_else(Utc::now);
        self.close_run_at(kind, wall, out);
    }

    fn close_run_at(
        &mut self,
        kind: TerminationKind,
        ended_at_wall: DateTime<Utc>,
        out: &mut TickOutcome,
    ) {
        let Some(run) = self.run.take() else { return };
        let partial = self
            .cycle_order
            .iter()
            .any(|z| {
                !run.info(*z)
                    .is_some_and(|i| matches!(i.outcome, StageOutcome::Completed))
            });

        let zones = self
            .cycle_order
            .iter()
            .map(|&zone| {
                let info = run.info(zone).cloned().unwrap_or_default();
                let stats = self.detectors[&zone].stats().snapshot();
                RunZoneSummary {
                    zone,
                    started_at: info.started_at_wall,
                    ended_at: info.ended_at_wall,
                    outcome: info.outcome,
                    samples_n: stats.n,
                    mean_f: stats.mean,
                    stddev_f: stats.stddev,
                    min_f: stats.min,
                    max_f: stats.max,
                    setpoint_f: info.setpoint_f.unwrap_or(f64::NAN),
                }
            })
            .collect();

        let record = RunRecord {
            run_id: run.run_id,
            line_id: self.line_id.clone(),
            started_at: run.started_at_wall,
            ended_at: ended_at_wall,
            termination: kind,
            partial: matches!(kind, TerminationKind::PartialQuiet) || partial,
            zones,
            events: run.events,
        };

        // Reset all detectors for the next run.
        for zone in self.cycle_order.clone() {
            self.detectors
                .insert(zone, ZoneDetector::new(zone, self.detector_cfg));
            self.quiet_ring.insert(zone, VecDeque::new());
        }

        out.run_closed = Some(record);
    }

    fn next_run_id(&mut self, wall: DateTime<Utc>) -> String {
        let seq = self.run_seq;
        self.run_seq += 1;
        format!("{}-{:012x}{:06x}", self.line_id, wall.timestamp_millis().max(0), seq)
    }
}

fn anomaly_to_event(a: Anomaly) -> Event {
    match a {
        Anomaly::TimeWentBackward { zone, at } => Event {
            t: at,
            kind: EventKind::Anomaly,
            zone: Some(zone),
            detail: "time went backward".to_string(),
        },
        Anomaly::Degraded { zone, at } => Event {
            t: at,
            kind: EventKind::Degraded,
            zone: Some(zone),
            detail: "sustained invalid samples".to_string(),
        },
    }
}
