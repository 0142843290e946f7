//! Runtime configuration types for the heating-cycle monitoring core.
//!
//! These are the structs `ZoneDetector`/`RunCoordinator`/`FsmWorker` consume
//! directly. They are separate from the TOML-deserialized config in
//! `monitor_config`, which bridges into these via `From` impls.

use crate::util::secs_to_ms;

/// Thresholds governing a single zone detector's state transitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorCfg {
    pub tol_f: f64,
    pub delta_ramp_f: f64,
    pub dt_min_f_per_min: f64,
    pub t_stable_s: f64,
    pub delta_off_f: f64,
    pub t_off_sustain_s: f64,
    pub s_min_f: f64,
    pub t_sp_sustain_s: f64,
    pub max_ramp_s: f64,
    pub max_stage_s: f64,
    pub sampling_period_s: f64,
}

impl Default for DetectorCfg {
    fn default() -> Self {
        Self {
            tol_f: 8.0,
            delta_ramp_f: 20.0,
            dt_min_f_per_min: 10.0,
            t_stable_s: 90.0,
            delta_off_f: 20.0,
            t_off_sustain_s: 45.0,
            s_min_f: 20.0,
            t_sp_sustain_s: 20.0,
            max_ramp_s: 900.0,
            max_stage_s: 7200.0,
            sampling_period_s: 2.0,
        }
    }
}

impl DetectorCfg {
    pub fn t_stable_ms(&self) -> u64 {
        secs_to_ms(self.t_stable_s)
    }
    pub fn t_off_sustain_ms(&self) -> u64 {
        secs_to_ms(self.t_off_sustain_s)
    }
    pub fn t_sp_sustain_ms(&self) -> u64 {
        secs_to_ms(self.t_sp_sustain_s)
    }
    pub fn max_ramp_ms(&self) -> u64 {
        secs_to_ms(self.max_ramp_s)
    }
    pub fn max_stage_ms(&self) -> u64 {
        secs_to_ms(self.max_stage_s)
    }
    pub fn sampling_period_ms(&self) -> u64 {
        secs_to_ms(self.sampling_period_s).max(1)
    }
    pub fn gap_tolerance_ms(&self) -> u64 {
        2 * self.sampling_period_ms()
    }

    /// Collects every out-of-range field as a human-readable message rather
    /// than failing on the first violation, matching this crate's config
    /// validation convention.
    pub fn validate(&self) -> Vec<String> {
        let mut errs = Vec::new();
        let mut check = |ok: bool, msg: &str| {
            if !ok {
                errs.push(msg.to_string());
            }
        };
        check(self.tol_f > 0.0, "Tol_F must be > 0");
        check(self.delta_ramp_f > 0.0, "DeltaRamp_F must be > 0");
        check(self.dt_min_f_per_min >= 0.0, "dT_min_F_per_min must be >= 0");
        check(self.t_stable_s > 0.0, "T_stable_s must be > 0");
        check(self.delta_off_f > 0.0, "DeltaOff_F must be > 0");
        check(self.t_off_sustain_s > 0.0, "T_off_sustain_s must be > 0");
        check(self.s_min_f > 0.0, "S_min_F must be > 0");
        check(self.t_sp_sustain_s >= 0.0, "T_sp_sustain_s must be >= 0");
        check(
            self.max_ramp_s > self.t_sp_sustain_s,
            "Max_ramp_s must exceed T_sp_sustain_s",
        );
        check(
            self.max_stage_s >= self.max_ramp_s,
            "Max_stage_s must be >= Max_ramp_s",
        );
        check(self.sampling_period_s > 0.0, "sampling_period_s must be > 0");
        errs
    }
}

/// Coordinator-level thresholds: quiet-window detection, cycle-entry, and
/// fault-recovery policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorCfg {
    pub quiet_window_s: f64,
    pub dt_quiet_f_per_min: f64,
    pub allow_main_without_preheat: bool,
    pub continue_after_fault_if_next_stage_ramps: bool,
}

impl Default for CoordinatorCfg {
    fn default() -> Self {
        Self {
            quiet_window_s: 720.0,
            dt_quiet_f_per_min: 2.0,
            allow_main_without_preheat: true,
            continue_after_fault_if_next_stage_ramps: true,
        }
    }
}

impl CoordinatorCfg {
    pub fn quiet_window_ms(&self) -> u64 {
        secs_to_ms(self.quiet_window_s)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errs = Vec::new();
        if self.quiet_window_s <= 0.0 {
            errs.push("quiet_window_s must be > 0".to_string());
        }
        if self.dt_quiet_f_per_min < 0.0 {
            errs.push("dT_quiet_F_per_min must be >= 0".to_string());
        }
        errs
    }
}

/// Which zones this line runs. Disabled zones are skipped in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneEnable {
    pub preheat: bool,
    pub main: bool,
    pub rib: bool,
}

impl Default for ZoneEnable {
    fn default() -> Self {
        Self {
            preheat: true,
            main: true,
            rib: true,
        }
    }
}

impl ZoneEnable {
    pub fn is_enabled(&self, zone: monitor_traits::Zone) -> bool {
        match zone {
            monitor_traits::Zone::Preheat => self.preheat,
            monitor_traits::Zone::Main => self.main,
            monitor_traits::Zone::Rib => self.rib,
        }
    }

    pub fn any_enabled(&self) -> bool {
        self.preheat || self.main || self.rib
    }
}

/// Complete, validated runtime configuration for one production line.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub version: u32,
    pub line_id: String,
    pub detector: DetectorCfg,
    pub coordinator: CoordinatorCfg,
    pub zones: ZoneEnable,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            version: 1,
            line_id: "line-1".to_string(),
            detector: DetectorCfg::default(),
            coordinator: CoordinatorCfg::default(),
            zones: ZoneEnable::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errs = self.detector.validate();
        errs.extend(self.coordinator.validate());
        if self.line_id.trim().is_empty() {
            errs.push("line_id must not be empty".to_string());
        }
        if !self.zones.any_enabled() {
            errs.push("at least one zone must be enabled".to_string());
        }
        errs
    }
}
