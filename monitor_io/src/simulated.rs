//! Synthetic `SampleSource`, the default adapter for `monitor_cli run` when
//! no field controller is wired up. Each `get_latest` call advances the
//! simulated zone by one sampling tick.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use monitor_traits::{Sample, SampleSource, SourceError, Zone};
use rand::Rng;

#[derive(Debug, Clone, Copy)]
struct ZoneState {
    temperature_f: f64,
    setpoint_f: f64,
    t_monotonic_ms: u64,
    scheduled: Option<(u64, f64)>,
}

/// A first-order thermal lag toward the current setpoint plus small sensor
/// noise. Good enough to exercise the full stage grammar (RAMP, STABLE,
/// quiet-timeout) without real hardware.
pub struct SimulatedSampleSource {
    period_ms: u64,
    approach_rate: f64,
    noise_f: f64,
    zones: Mutex<HashMap<Zone, ZoneState>>,
}

impl SimulatedSampleSource {
    pub fn new(period_ms: u64) -> Self {
        Self::with_params(period_ms, 0.03, 0.3)
    }

    pub fn with_params(period_ms: u64, approach_rate: f64, noise_f: f64) -> Self {
        let zones = Zone::CANONICAL_ORDER
            .into_iter()
            .map(|z| {
                (
                    z,
                    ZoneState {
                        temperature_f: 70.0,
                        setpoint_f: 70.0,
                        t_monotonic_ms: 0,
                        scheduled: None,
                    },
                )
            })
            .collect();
        Self {
            period_ms: period_ms.max(1),
            approach_rate,
            noise_f,
            zones: Mutex::new(zones),
        }
    }

    /// Change a zone's target temperature; the next `get_latest` calls drive
    /// the simulated sensor toward it at `approach_rate`.
    pub fn set_setpoint(&self, zone: Zone, setpoint_f: f64) {
        if let Some(state) = self.zones.lock().unwrap().get_mut(&zone) {
            state.setpoint_f = setpoint_f;
        }
    }

    /// Apply a setpoint step once the zone's sample clock reaches `at_ms`.
    /// The earlier samples keep the idle setpoint, so a consumer observes a
    /// real operator-style step edit rather than starting life at target.
    pub fn schedule_setpoint(&self, zone: Zone, setpoint_f: f64, at_ms: u64) {
        if let Some(state) = self.zones.lock().unwrap().get_mut(&zone) {
            state.scheduled = Some((at_ms, setpoint_f));
        }
    }
}

impl SampleSource for SimulatedSampleSource {
    fn get_latest(&self, zone: Zone) -> Result<Sample, SourceError> {
        let mut zones = self.zones.lock().unwrap();
        let state = zones
            .get_mut(&zone)
            .ok_or_else(|| SourceError::Io(format!("unconfigured zone {zone}")))?;

        state.t_monotonic_ms += self.period_ms;
        if let Some((at_ms, setpoint_f)) = state.scheduled {
            if state.t_monotonic_ms >= at_ms {
                state.setpoint_f = setpoint_f;
                state.scheduled = None;
            }
        }
        let noise = rand::thread_rng().gen_range(-self.noise_f..=self.noise_f);
        state.temperature_f += (state.setpoint_f - state.temperature_f) * self.approach_rate + noise;

        Ok(Sample {
            zone,
            t_monotonic_ms: state.t_monotonic_ms,
            t_wall: Utc::now(),
            temperature_f: state.temperature_f,
            setpoint_f: state.setpoint_f,
            valid: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approaches_setpoint_over_time() {
        let src = SimulatedSampleSource::with_params(1000, 0.1, 0.0);
        src.set_setpoint(Zone::Preheat, 300.0);
        let mut last = 70.0;
        for _ in 0..200 {
            let s = src.get_latest(Zone::Preheat).unwrap();
            assert!(s.temperature_f >= last - 1e-9);
            last = s.temperature_f;
        }
        assert!((last - 300.0).abs() < 1.0);
    }

    #[test]
    fn t_monotonic_ms_always_increases() {
        let src = SimulatedSampleSource::new(500);
        let mut last = 0;
        for _ in 0..10 {
            let s = src.get_latest(Zone::Main).unwrap();
            assert!(s.t_monotonic_ms > last);
            last = s.t_monotonic_ms;
        }
    }

    #[test]
    fn scheduled_setpoint_applies_at_its_time() {
        let src = SimulatedSampleSource::with_params(1000, 0.1, 0.0);
        src.schedule_setpoint(Zone::Preheat, 300.0, 3_000);
        assert_eq!(src.get_latest(Zone::Preheat).unwrap().setpoint_f, 70.0); // t=1s
        assert_eq!(src.get_latest(Zone::Preheat).unwrap().setpoint_f, 70.0); // t=2s
        assert_eq!(src.get_latest(Zone::Preheat).unwrap().setpoint_f, 300.0); // t=3s
        assert_eq!(src.get_latest(Zone::Preheat).unwrap().setpoint_f, 300.0);
    }
}
