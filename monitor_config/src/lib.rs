#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! TOML configuration schema for the heating-cycle monitor.
//!
//! `Config` is deserialized from a line's TOML file, validated, then bridged
//! to [`monitor_core::MonitorConfig`] via [`Config::to_monitor_config`].
//! Logging and I/O adapter selection live here too since they're concerns of
//! the deployed binary, not the detection core.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
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
        let d = monitor_core::DetectorCfg::default();
        Self {
            tol_f: d.tol_f,
            delta_ramp_f: d.delta_ramp_f,
            dt_min_f_per_min: d.dt_min_f_per_min,
            t_stable_s: d.t_stable_s,
            delta_off_f: d.delta_off_f,
            t_off_sustain_s: d.t_off_sustain_s,
            s_min_f: d.s_min_f,
            t_sp_sustain_s: d.t_sp_sustain_s,
            max_ramp_s: d.max_ramp_s,
            max_stage_s: d.max_stage_s,
            sampling_period_s: d.sampling_period_s,
        }
    }
}

impl From<DetectorCfg> for monitor_core::DetectorCfg {
    fn from(c: DetectorCfg) -> Self {
        monitor_core::DetectorCfg {
            tol_f: c.tol_f,
            delta_ramp_f: c.delta_ramp_f,
            dt_min_f_per_min: c.dt_min_f_per_min,
            t_stable_s: c.t_stable_s,
            delta_off_f: c.delta_off_f,
            t_off_sustain_s: c.t_off_sustain_s,
            s_min_f: c.s_min_f,
            t_sp_sustain_s: c.t_sp_sustain_s,
            max_ramp_s: c.max_ramp_s,
            max_stage_s: c.max_stage_s,
            sampling_period_s: c.sampling_period_s,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CoordinatorCfg {
    pub quiet_window_s: f64,
    pub dt_quiet_f_per_min: f64,
    pub allow_main_without_preheat: bool,
    pub continue_after_fault_if_next_stage_ramps: bool,
}

impl Default for CoordinatorCfg {
    fn default() -> Self {
        let d = monitor_core::CoordinatorCfg::default();
        Self {
            quiet_window_s: d.quiet_window_s,
            dt_quiet_f_per_min: d.dt_quiet_f_per_min,
            allow_main_without_preheat: d.allow_main_without_preheat,
            continue_after_fault_if_next_stage_ramps: d.continue_after_fault_if_next_stage_ramps,
        }
    }
}

impl From<CoordinatorCfg> for monitor_core::CoordinatorCfg {
    fn from(c: CoordinatorCfg) -> Self {
        monitor_core::CoordinatorCfg {
            quiet_window_s: c.quiet_window_s,
            dt_quiet_f_per_min: c.dt_quiet_f_per_min,
            allow_main_without_preheat: c.allow_main_without_preheat,
            continue_after_fault_if_next_stage_ramps: c.continue_after_fault_if_next_stage_ramps,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct ZoneEnable {
    pub preheat: bool,
    pub main: bool,
    pub rib: bool,
}

impl ZoneEnable {
    fn defaults_on() -> Self {
        Self {
            preheat: true,
            main: true,
            rib: true,
        }
    }
}

impl From<ZoneEnable> for monitor_core::ZoneEnable {
    fn from(z: ZoneEnable) -> Self {
        monitor_core::ZoneEnable {
            preheat: z.preheat,
            main: z.main,
            rib: z.rib,
        }
    }
}

/// "never" | "daily" | "hourly", mirrors `tracing_appender::rolling`'s
/// rotation policies.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Never,
    Daily,
    Hourly,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    /// Directory for the rolling log file; stdout-only when absent.
    pub dir: Option<String>,
    pub level: Option<String>,
    pub rotation: Rotation,
    pub json: bool,
}

/// Which `SampleSource` adapter `monitor_cli run` should construct.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceCfg {
    Simulated {
        /// Target stepped onto every enabled zone shortly after startup so
        /// the synthetic feed drives a cycle; `None` leaves the zones idle.
        #[serde(default)]
        setpoint_f: Option<f64>,
    },
    Modbus {
        addr: String,
        #[serde(default = "default_modbus_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for SourceCfg {
    fn default() -> Self {
        SourceCfg::Simulated { setpoint_f: None }
    }
}

fn default_modbus_timeout_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IoCfg {
    pub source: SourceCfg,
    /// Directory `FileStateSink` persists checkpoints and logs under.
    pub state_dir: String,
}

impl Default for IoCfg {
    fn default() -> Self {
        Self {
            source: SourceCfg::default(),
            state_dir: "./state".to_string(),
        }
    }
}

/// TOML-deserialized configuration for one production line.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub line_id: String,
    #[serde(default)]
    pub detector: DetectorCfg,
    #[serde(default)]
    pub coordinator: CoordinatorCfg,
    #[serde(default = "ZoneEnable::defaults_on")]
    pub zones: ZoneEnable,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub io: IoCfg,
}

fn default_version() -> u32 {
    1
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    /// Validate every section and collect all violations rather than
    /// failing on the first, then defer threshold checks to
    /// [`monitor_core::MonitorConfig::validate`] so the two never drift.
    pub fn validate(&self) -> eyre::Result<()> {
        let mut errs = Vec::new();

        if self.line_id.trim().is_empty() {
            errs.push("line_id must not be empty".to_string());
        }
        if let SourceCfg::Modbus { addr, timeout_ms } = &self.io.source {
            if addr.trim().is_empty() {
                errs.push("io.source.addr must not be empty for modbus source".to_string());
            }
            if *timeout_ms == 0 {
                errs.push("io.source.timeout_ms must be > 0".to_string());
            }
        }
        if self.io.state_dir.trim().is_empty() {
            errs.push("io.state_dir must not be empty".to_string());
        }

        errs.extend(self.to_monitor_config().validate());

        if errs.is_empty() {
            Ok(())
        } else {
            eyre::bail!(errs.join("; "))
        }
    }

    pub fn to_monitor_config(&self) -> monitor_core::MonitorConfig {
        monitor_core::MonitorConfig {
            version: self.version,
            line_id: self.line_id.clone(),
            detector: self.detector.into(),
            coordinator: self.coordinator.into(),
            zones: self.zones.into(),
        }
    }
}
