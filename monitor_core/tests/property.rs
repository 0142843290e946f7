use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use monitor_core::{DetectorCfg, MonitorConfig, RunCoordinator, RunningStats, ZoneDetector, ZoneEnable};
use monitor_traits::{DetectorEvent, EventKind, Sample, Zone};
use proptest::prelude::*;

fn wall(t_ms: u64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + t_ms as i64)
        .single()
        .unwrap()
}

fn sample(zone: Zone, t_ms: u64, temp: f64, sp: f64, valid: bool) -> Sample {
    Sample {
        zone,
        t_monotonic_ms: t_ms,
        t_wall: wall(t_ms),
        temperature_f: temp,
        setpoint_f: sp,
        valid,
    }
}

/// One arbitrary detector input: time advance, a temperature, a setpoint
/// drawn from a small plausible set, and occasional invalid readings.
fn step_strategy() -> impl Strategy<Value = (u64, f64, f64, bool)> {
    (
        500u64..6000,
        0.0f64..500.0,
        prop::sample::select(vec![75.0, 300.0, 320.0, 500.0]),
        prop::bool::weighted(0.9),
    )
}

/// The per-zone stage grammar: stages open with a ramp, may stabilize, and
/// always close before another opens. Faults only occur inside a stage.
fn assert_stage_grammar(events: &[DetectorEvent]) {
    #[derive(PartialEq, Debug)]
    enum S {
        Closed,
        Ramp,
        Stable,
    }
    let mut s = S::Closed;
    for e in events {
        match e {
            DetectorEvent::RampStarted { .. } => {
                assert_eq!(s, S::Closed, "ramp inside an open stage");
                s = S::Ramp;
            }
            DetectorEvent::Stable { .. } => {
                assert_eq!(s, S::Ramp, "stable without a ramp");
                s = S::Stable;
            }
            DetectorEvent::Fault { .. } => {
                assert_ne!(s, S::Closed, "fault outside a stage");
            }
            DetectorEvent::StageEnded { .. } => {
                assert_ne!(s, S::Closed, "end without a stage");
                s = S::Closed;
            }
        }
    }
}

/// The nominal profile used by the scenario suite; guarantees the stream
/// opens and closes a run so split/replay has something to disagree about.
fn nominal_stream() -> Vec<Sample> {
    (0..=400u64)
        .step_by(2)
        .map(|t_s| {
            let sp = if (10..330).contains(&t_s) { 300.0 } else { 75.0 };
            let temp = if t_s < 30 {
                75.0
            } else if t_s < 150 {
                75.0 + (t_s - 30) as f64 * 1.875
            } else if t_s < 330 {
                300.0
            } else {
                (300.0 - (t_s - 330) as f64 * 2.0).max(200.0)
            };
            sample(Zone::Preheat, t_s * 1000, temp, sp, true)
        })
        .collect()
}

fn preheat_only_cfg() -> MonitorConfig {
    MonitorConfig {
        zones: ZoneEnable {
            preheat: true,
            main: false,
            rib: false,
        },
        ..MonitorConfig::default()
    }
}

fn drive(coordinator: &mut RunCoordinator, stream: &[Sample]) -> (usize, Vec<serde_json::Value>) {
    let mut closes = 0;
    let mut records = Vec::new();
    for s in stream {
        let mut samples = HashMap::new();
        samples.insert(s.zone, *s);
        let out = coordinator.observe(&samples);
        if let Some(run) = out.run_closed {
            closes += 1;
            records.push(serde_json::to_value(&run).expect("run record serializes"));
        }
    }
    (closes, records)
}

proptest! {
    #[test]
    fn snapshot_bounds_hold_for_any_finite_sequence(xs in prop::collection::vec(-500.0f64..500.0, 1..200)) {
        let mut stats = RunningStats::new();
        for (i, x) in xs.iter().enumerate() {
            stats.update(*x, i as u64 * 1000);
        }
        let snap = stats.snapshot();
        prop_assert_eq!(snap.n, xs.len() as u64);
        prop_assert!(snap.min <= snap.mean + 1e-6);
        prop_assert!(snap.mean <= snap.max + 1e-6);
        prop_assert!(snap.min >= xs.iter().cloned().fold(f64::INFINITY, f64::min) - 1e-6);
        prop_assert!(snap.max <= xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max) + 1e-6);
    }

    #[test]
    fn running_mean_matches_batch_mean(xs in prop::collection::vec(-500.0f64..500.0, 1..500)) {
        let mut stats = RunningStats::new();
        for (i, x) in xs.iter().enumerate() {
            stats.update(*x, i as u64 * 1000);
        }
        let batch = xs.iter().sum::<f64>() / xs.len() as f64;
        let online = stats.snapshot().mean;
        let scale = batch.abs().max(1.0);
        prop_assert!((online - batch).abs() / scale < 1e-9);
    }

    #[test]
    fn nan_and_infinite_samples_never_change_count(
        xs in prop::collection::vec(-500.0f64..500.0, 0..50),
        junk_positions in prop::collection::vec(0usize..60, 0..10),
    ) {
        let mut stats = RunningStats::new();
        let mut expected_n = 0u64;
        let mut t = 0u64;
        for x in &xs {
            stats.update(*x, t);
            expected_n += 1;
            t += 1000;
        }
        for _ in &junk_positions {
            stats.update(f64::NAN, t);
            stats.update(f64::INFINITY, t);
            t += 1000;
        }
        prop_assert_eq!(stats.n(), expected_n);
    }

    #[test]
    fn detector_events_are_ordered_and_grammatical(
        steps in prop::collection::vec(step_strategy(), 1..300),
    ) {
        let mut d = ZoneDetector::new(Zone::Preheat, DetectorCfg::default());
        let mut t = 0u64;
        let mut events = Vec::new();
        for (dt, temp, sp, valid) in steps {
            t += dt;
            let out = d.step(sample(Zone::Preheat, t, temp, sp, valid));
            events.extend(out.events);
        }
        let ts: Vec<u64> = events.iter().map(DetectorEvent::t).collect();
        prop_assert!(ts.windows(2).all(|w| w[0] <= w[1]), "timestamps regressed: {ts:?}");
        assert_stage_grammar(&events);
    }

    #[test]
    fn split_checkpoint_replay_yields_the_same_run_record(split in 1usize..200) {
        let stream = nominal_stream();
        let cfg = preheat_only_cfg();

        let mut uninterrupted = RunCoordinator::new(&cfg);
        let (closes_a, records_a) = drive(&mut uninterrupted, &stream);

        let mut first_half = RunCoordinator::new(&cfg);
        let (mut closes_b, mut records_b) = drive(&mut first_half, &stream[..split]);
        let blob = first_half.to_checkpoint();
        let mut resumed = RunCoordinator::from_checkpoint(&cfg, &blob)
            .expect("checkpoint written by the same config restores");
        let (closes_tail, records_tail) = drive(&mut resumed, &stream[split..]);
        closes_b += closes_tail;
        records_b.extend(records_tail);

        prop_assert_eq!(closes_a, closes_b);
        prop_assert_eq!(records_a, records_b);
    }

    #[test]
    fn runs_close_at_most_once_per_opening(
        steps in prop::collection::vec(step_strategy(), 1..400),
    ) {
        let cfg = preheat_only_cfg();
        let mut coordinator = RunCoordinator::new(&cfg);
        let mut t = 0u64;
        let mut ramps = 0usize;
        let mut closes = 0usize;
        for (dt, temp, sp, valid) in steps {
            t += dt;
            let mut samples = HashMap::new();
            samples.insert(Zone::Preheat, sample(Zone::Preheat, t, temp, sp, valid));
            let out = coordinator.observe(&samples);
            ramps += out
                .events
                .iter()
                .filter(|e| e.kind == EventKind::RampStarted)
                .count();
            if out.run_closed.is_some() {
                closes += 1;
            }
        }
        prop_assert!(closes <= ramps, "{closes} closes for {ramps} ramps");
        if coordinator.is_run_open() {
            prop_assert!(ramps > closes);
        }
    }
}
