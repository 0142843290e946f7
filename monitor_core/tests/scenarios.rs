//! Cycle scenarios driven tick-by-tick through `RunCoordinator` with
//! synthesized sample streams at a 2 s period: nominal completion, ramp
//! timeout, fault recovery, quiet partial close, setpoint churn, and a
//! mid-stable sensor dropout.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use monitor_core::{MonitorConfig, RunCoordinator, ZoneEnable};
use monitor_traits::{
    Event, EventKind, RunRecord, Sample, StageKind, StageOutcome, TerminationKind, Zone,
};

const PERIOD_S: u64 = 2;

fn wall(t_ms: u64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + t_ms as i64)
        .single()
        .unwrap()
}

fn sample(zone: Zone, t_s: u64, temp: f64, sp: f64, valid: bool) -> Sample {
    Sample {
        zone,
        t_monotonic_ms: t_s * 1000,
        t_wall: wall(t_s * 1000),
        temperature_f: temp,
        setpoint_f: sp,
        valid,
    }
}

fn cfg(preheat: bool, main: bool, rib: bool) -> MonitorConfig {
    MonitorConfig {
        zones: ZoneEnable { preheat, main, rib },
        ..MonitorConfig::default()
    }
}

struct Harness {
    coordinator: RunCoordinator,
    events: Vec<Event>,
    runs: Vec<RunRecord>,
}

impl Harness {
    fn new(config: &MonitorConfig) -> Self {
        Self {
            coordinator: RunCoordinator::new(config),
            events: Vec::new(),
            runs: Vec::new(),
        }
    }

    fn tick(&mut self, samples: HashMap<Zone, Sample>) {
        let out = self.coordinator.observe(&samples);
        self.events.extend(out.events);
        if let Some(run) = out.run_closed {
            self.runs.push(run);
        }
    }

    fn events_of(&self, kind: EventKind) -> Vec<&Event> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }
}

/// Nominal single-zone profile: setpoint steps 75 -> 300 at t=10 s, the
/// temperature rises linearly once the step is accepted, holds at 300 +/- 3,
/// and the operator cuts the setpoint back to 75 at t=330 s.
fn nominal_preheat(t_s: u64) -> (f64, f64) {
    let sp = if (10..330).contains(&t_s) { 300.0 } else { 75.0 };
    let temp = if t_s < 30 {
        75.0
    } else if t_s < 150 {
        75.0 + (t_s - 30) as f64 * 1.875
    } else if t_s < 330 {
        if (t_s / 2) % 2 == 0 { 303.0 } else { 297.0 }
    } else {
        (300.0 - (t_s - 330) as f64 * 2.0).max(200.0)
    };
    (temp, sp)
}

#[test]
fn nominal_preheat_only_cycle() {
    let config = cfg(true, false, false);
    let mut h = Harness::new(&config);
    for t_s in (0..=400).step_by(PERIOD_S as usize) {
        let (temp, sp) = nominal_preheat(t_s);
        let mut samples = HashMap::new();
        samples.insert(Zone::Preheat, sample(Zone::Preheat, t_s, temp, sp, true));
        h.tick(samples);
    }

    // setpoint step seen at 10 s, accepted after the 20 s sustain
    let ramps = h.events_of(EventKind::RampStarted);
    assert_eq!(ramps.len(), 1);
    assert_eq!(ramps[0].t, 30_000);

    // in-band from 146 s, stable after the 90 s dwell
    let stables = h.events_of(EventKind::Stable);
    assert_eq!(stables.len(), 1);
    assert_eq!(stables[0].t, 236_000);

    // the setpoint cut at 330 s arms the end dwell; 45 s later on the 2 s
    // grid is 376 s
    let ends = h.events_of(EventKind::StageEnded);
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].t, 376_000);

    assert_eq!(h.runs.len(), 1);
    let run = &h.runs[0];
    assert_eq!(run.termination, TerminationKind::Completed);
    assert!(!run.partial);
    assert_eq!(run.zones.len(), 1);
    let z = &run.zones[0];
    assert_eq!(z.zone, Zone::Preheat);
    assert_eq!(z.outcome, StageOutcome::Completed);
    assert_eq!(z.setpoint_f, 300.0);
    // stage spans 30..=376 s at 2 s: 174 samples, all valid
    assert_eq!(z.samples_n, 174);
    assert_eq!(z.min_f, 75.0);
    assert!((z.max_f - 303.0).abs() < 1e-9);
    assert!(z.mean_f > 245.0 && z.mean_f < 266.0, "mean was {}", z.mean_f);
    // event timestamps never go backward
    let ts: Vec<u64> = run.events.iter().map(|e| e.t).collect();
    assert!(ts.windows(2).all(|w| w[0] <= w[1]));
}

fn sluggish_preheat(t_s: u64) -> (f64, f64) {
    let sp = if t_s < 2 { 75.0 } else { 400.0 };
    let temp = (75.0 + t_s as f64 / 12.0).min(150.0);
    (temp, sp)
}

#[test]
fn ramp_timeout_without_successor_ramp_closes_faulted() {
    // preheat + main enabled; main never ramps, so the recovery window
    // opened by the preheat fault expires 2 * Max_ramp_s later
    let config = cfg(true, true, false);
    let mut h = Harness::new(&config);
    for t_s in (0..=2724).step_by(PERIOD_S as usize) {
        let (temp, sp) = sluggish_preheat(t_s);
        let mut samples = HashMap::new();
        samples.insert(Zone::Preheat, sample(Zone::Preheat, t_s, temp, sp, true));
        samples.insert(Zone::Main, sample(Zone::Main, t_s, 75.0, 75.0, true));
        h.tick(samples);
    }

    assert!(h.events_of(EventKind::Stable).is_empty());
    let faults = h.events_of(EventKind::Fault);
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].t, 922_000, "ramp entered at 22 s, budget 900 s");
    assert_eq!(faults[0].detail, "timeout_ramp");

    assert_eq!(h.runs.len(), 1);
    let run = &h.runs[0];
    assert_eq!(run.termination, TerminationKind::Faulted);
    assert!(run.partial);
    assert_eq!(run.zones[0].outcome, StageOutcome::Faulted);
    assert_eq!(run.zones[1].outcome, StageOutcome::Skipped);
    // held open for the whole recovery window, not closed by quiet timeout
    assert!(run.ended_at >= wall(2_722_000));
}

fn recovered_main(t_s: u64) -> (f64, f64) {
    let sp = if t_s < 1000 { 75.0 } else { 500.0 };
    let temp = if t_s < 1020 {
        75.0
    } else if t_s < 1220 {
        75.0 + (t_s - 1020) as f64 * 2.125
    } else if t_s < 1400 {
        500.0
    } else {
        (500.0 - (t_s - 1400) as f64 * 3.0).max(300.0)
    };
    (temp, sp)
}

#[test]
fn successor_ramp_recovers_a_faulted_cycle() {
    let config = cfg(true, true, false);
    let mut h = Harness::new(&config);
    for t_s in (0..=1460).step_by(PERIOD_S as usize) {
        let (p_temp, p_sp) = sluggish_preheat(t_s);
        let (m_temp, m_sp) = recovered_main(t_s);
        let mut samples = HashMap::new();
        samples.insert(Zone::Preheat, sample(Zone::Preheat, t_s, p_temp, p_sp, true));
        samples.insert(Zone::Main, sample(Zone::Main, t_s, m_temp, m_sp, true));
        h.tick(samples);
    }

    // preheat faulted at 922 s, main's ramp at 1020 s lands inside the
    // recovery window and the cycle advances instead of closing
    assert_eq!(h.runs.len(), 1);
    let run = &h.runs[0];
    assert_eq!(run.termination, TerminationKind::Completed);
    assert!(run.partial, "a faulted zone keeps the run partial");
    assert_eq!(run.zones[0].zone, Zone::Preheat);
    assert_eq!(run.zones[0].outcome, StageOutcome::Faulted);
    assert_eq!(run.zones[1].zone, Zone::Main);
    assert_eq!(run.zones[1].outcome, StageOutcome::Completed);
    let ramps = h.events_of(EventKind::RampStarted);
    assert_eq!(ramps.len(), 2);
    assert_eq!(ramps[1].zone, Some(Zone::Main));
    assert_eq!(ramps[1].t, 1_020_000);
}

#[test]
fn quiet_timeout_closes_a_partial_run() {
    let config = cfg(true, true, true);
    let mut h = Harness::new(&config);
    for t_s in (0..=1200).step_by(PERIOD_S as usize) {
        let (temp, sp) = if t_s <= 380 {
            nominal_preheat(t_s)
        } else {
            // afterwards the zone just drifts +/- 1 F
            (if (t_s / 2) % 2 == 0 { 201.0 } else { 199.0 }, 75.0)
        };
        let mut samples = HashMap::new();
        samples.insert(Zone::Preheat, sample(Zone::Preheat, t_s, temp, sp, true));
        samples.insert(Zone::Main, sample(Zone::Main, t_s, 75.0, 75.0, true));
        samples.insert(Zone::Rib, sample(Zone::Rib, t_s, 75.0, 75.0, true));
        h.tick(samples);
    }

    assert_eq!(h.runs.len(), 1);
    let run = &h.runs[0];
    assert_eq!(run.termination, TerminationKind::PartialQuiet);
    assert!(run.partial);
    assert_eq!(run.zones[0].outcome, StageOutcome::Completed);
    assert_eq!(run.zones[1].outcome, StageOutcome::Skipped);
    assert_eq!(run.zones[2].outcome, StageOutcome::Skipped);
}

#[test]
fn setpoint_churn_below_threshold_keeps_stable() {
    let config = cfg(true, false, false);
    let mut h = Harness::new(&config);
    for t_s in (0..=238).step_by(PERIOD_S as usize) {
        let (temp, sp) = nominal_preheat(t_s);
        let mut samples = HashMap::new();
        samples.insert(Zone::Preheat, sample(Zone::Preheat, t_s, temp, sp, true));
        h.tick(samples);
    }
    assert_eq!(h.events_of(EventKind::Stable).len(), 1);

    // oscillate the setpoint 300 <-> 308 every 10 s while the zone holds
    // 302 F; the 8 F jumps stay below S_min_F
    for t_s in (240..=540).step_by(PERIOD_S as usize) {
        let sp = if (t_s / 10) % 2 == 0 { 300.0 } else { 308.0 };
        let mut samples = HashMap::new();
        samples.insert(Zone::Preheat, sample(Zone::Preheat, t_s, 302.0, sp, true));
        h.tick(samples);
    }

    assert_eq!(h.events_of(EventKind::RampStarted).len(), 1);
    assert!(h.events_of(EventKind::StageEnded).is_empty());
    assert!(h.runs.is_empty(), "run stays open through the churn");
    let status = h.coordinator.status();
    assert_eq!(status.zones[0].stage, StageKind::Stable);
    // samples 30..=540 s at 2 s, all valid, none lost to the churn
    assert_eq!(status.zones[0].samples_n, 256);
}

#[test]
fn sensor_dropout_mid_stable_is_tolerated() {
    let config = cfg(true, false, false);
    let mut h = Harness::new(&config);
    for t_s in (0..=300).step_by(PERIOD_S as usize) {
        let valid = !(250..=256).contains(&t_s);
        let (temp, sp) = if t_s < 240 {
            nominal_preheat(t_s)
        } else {
            (300.0, 300.0)
        };
        let mut samples = HashMap::new();
        samples.insert(
            Zone::Preheat,
            sample(Zone::Preheat, t_s, if valid { temp } else { 0.0 }, if valid { sp } else { 0.0 }, valid),
        );
        h.tick(samples);
    }

    assert!(h.events_of(EventKind::Fault).is_empty());
    assert!(h.events_of(EventKind::StageEnded).is_empty());
    assert!(
        !h.events_of(EventKind::Degraded).is_empty(),
        "a multi-tick dropout is reported"
    );
    let status = h.coordinator.status();
    assert_eq!(status.zones[0].stage, StageKind::Stable);
    // 136 stage samples minus the 4 invalid ones
    assert_eq!(status.zones[0].samples_n, 132);
}
