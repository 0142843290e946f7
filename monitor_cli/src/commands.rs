//! Command implementations: worker assembly for `run`, checkpoint-backed
//! `status`/`abort`, and configuration reporting for `self-check`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use monitor_config::{Config, SourceCfg};
use monitor_core::{MonitorConfig, RunCoordinator, WorkerBuilder};
use monitor_io::{FileStateSink, SimulatedSampleSource};
use monitor_traits::{Event, RunRecord, SampleSource, SinkError, StageRecord, StateSink, Zone};
use serde_json::json;

/// Tees everything the worker persists to stdout: one JSON object per line
/// when `--json`, terse human summaries otherwise.
struct TeeSink {
    inner: FileStateSink,
    json: bool,
}

impl TeeSink {
    fn new(inner: FileStateSink, json: bool) -> Self {
        Self { inner, json }
    }
}

impl StateSink for TeeSink {
    fn save_runtime_state(&self, line_id: &str, blob: &[u8]) -> Result<(), SinkError> {
        self.inner.save_runtime_state(line_id, blob)
    }

    fn load_runtime_state(&self, line_id: &str) -> Result<Option<Vec<u8>>, SinkError> {
        self.inner.load_runtime_state(line_id)
    }

    fn append_event(&self, line_id: &str, event: &Event) -> Result<(), SinkError> {
        if self.json {
            println!("{}", json!({ "kind": "event", "line_id": line_id, "event": event }));
        }
        self.inner.append_event(line_id, event)
    }

    fn on_stage_closed(&self, line_id: &str, record: &StageRecord) {
        if self.json {
            println!("{}", json!({ "kind": "stage_closed", "line_id": line_id, "record": record }));
        } else {
            println!(
                "stage closed: zone {} -> {:?} (n={})",
                record.zone, record.outcome, record.stats.n
            );
        }
        self.inner.on_stage_closed(line_id, record);
    }

    fn on_run_closed(&self, line_id: &str, record: &RunRecord) {
        if self.json {
            println!("{}", json!({ "kind": "run_closed", "line_id": line_id, "record": record }));
        } else {
            println!(
                "run {} closed: {:?} (partial: {})",
                record.run_id, record.termination, record.partial
            );
        }
        self.inner.on_run_closed(line_id, record);
    }
}

fn effective_config(cfg: &Config, line: Option<String>) -> MonitorConfig {
    let mut mon_cfg = cfg.to_monitor_config();
    if let Some(line) = line {
        mon_cfg.line_id = line;
    }
    mon_cfg
}

fn build_source(cfg: &Config, mon_cfg: &MonitorConfig) -> eyre::Result<Box<dyn SampleSource>> {
    match &cfg.io.source {
        SourceCfg::Simulated { setpoint_f } => {
            let period_ms = mon_cfg.detector.sampling_period_ms();
            let sim = SimulatedSampleSource::new(period_ms);
            if let Some(sp) = setpoint_f {
                // a few baseline samples first, so the target reads as an
                // operator setpoint step rather than an initial condition
                for zone in Zone::CANONICAL_ORDER {
                    if mon_cfg.zones.is_enabled(zone) {
                        sim.schedule_setpoint(zone, *sp, 3 * period_ms);
                    }
                }
            }
            Ok(Box::new(sim))
        }
        #[cfg(feature = "modbus")]
        SourceCfg::Modbus { addr, timeout_ms } => {
            use monitor_io::{ModbusSampleSource, ZoneRegisterMap};
            use monitor_traits::clock::MonotonicClock;
            // One holding-register pair per zone, 0.1 F per count.
            let maps: Vec<ZoneRegisterMap> = Zone::CANONICAL_ORDER
                .into_iter()
                .filter(|z| mon_cfg.zones.is_enabled(*z))
                .map(|zone| ZoneRegisterMap {
                    zone,
                    unit_id: 1,
                    temperature_reg: zone.canonical_index() as u16 * 2,
                    setpoint_reg: zone.canonical_index() as u16 * 2 + 1,
                })
                .collect();
            let source = ModbusSampleSource::connect(
                addr,
                Duration::from_millis(*timeout_ms),
                maps,
                0.1,
                Arc::new(MonotonicClock::new()),
            )
            .map_err(|e| eyre::eyre!("connect modbus source {addr}: {e}"))?;
            Ok(Box::new(source))
        }
        #[cfg(not(feature = "modbus"))]
        SourceCfg::Modbus { addr, .. } => {
            eyre::bail!("modbus source {addr} requires building with --features modbus")
        }
    }
}

/// Run the FSM worker until interrupted, or for roughly `ticks` ticks.
pub fn run_line(
    cfg: &Config,
    line: Option<String>,
    ticks: Option<u64>,
    json: bool,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<()> {
    let mon_cfg = effective_config(cfg, line);
    let period_ms = mon_cfg.detector.sampling_period_ms();
    let line_id = mon_cfg.line_id.clone();

    let source = build_source(cfg, &mon_cfg)?;
    let sink = TeeSink::new(FileStateSink::new(&cfg.io.state_dir), json);

    let mut worker = WorkerBuilder::new()
        .with_source(source)
        .with_sink(sink)
        .with_config(mon_cfg)
        .build()
        .map_err(eyre::Report::new)?;

    tracing::info!(line = %line_id, period_ms, "worker started");

    match ticks {
        Some(n) => {
            let deadline = Instant::now()
                + Duration::from_millis(period_ms.saturating_mul(n).saturating_add(period_ms));
            while Instant::now() < deadline && !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(period_ms.min(50).max(1)));
            }
        }
        None => {
            while !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    worker.stop();
    tracing::info!(line = %line_id, "worker stopped");
    Ok(())
}

fn load_coordinator(
    cfg: &Config,
    mon_cfg: &MonitorConfig,
) -> eyre::Result<Option<(FileStateSink, RunCoordinator)>> {
    let sink = FileStateSink::new(&cfg.io.state_dir);
    let Some(blob) = sink.load_runtime_state(&mon_cfg.line_id)? else {
        return Ok(None);
    };
    let coordinator = RunCoordinator::from_checkpoint(mon_cfg, &blob).ok_or_else(|| {
        eyre::eyre!(
            "runtime state for line {} was written under a different configuration version",
            mon_cfg.line_id
        )
    })?;
    Ok(Some((sink, coordinator)))
}

/// Print the persisted run summary and zone stages for a line.
pub fn print_status(cfg: &Config, line: Option<String>, json: bool) -> eyre::Result<()> {
    let mon_cfg = effective_config(cfg, line);
    let Some((_, coordinator)) = load_coordinator(cfg, &mon_cfg)? else {
        if json {
            println!("{}", json!({ "kind": "status", "line_id": mon_cfg.line_id, "state": "none" }));
        } else {
            println!("no runtime state for line {}", mon_cfg.line_id);
        }
        return Ok(());
    };
    let status = coordinator.status();
    if json {
        println!("{}", json!({ "kind": "status", "status": status }));
    } else {
        println!("line {}", status.line_id);
        match &status.run_id {
            Some(id) => {
                let zone = status
                    .current_zone
                    .map_or_else(|| "-".to_string(), |z| z.to_string());
                println!("  run {id} open, current zone: {zone}");
            }
            None => println!("  no run open"),
        }
        for z in &status.zones {
            println!("  {}: {:?} (n={})", z.zone, z.stage, z.samples_n);
        }
    }
    Ok(())
}

/// Close the line's open run as `Aborted` and persist the cleared state.
pub fn abort_line(
    cfg: &Config,
    line: Option<String>,
    reason: Option<String>,
    json: bool,
) -> eyre::Result<()> {
    let mon_cfg = effective_config(cfg, line);
    let Some((sink, mut coordinator)) = load_coordinator(cfg, &mon_cfg)? else {
        if json {
            println!("{}", json!({ "kind": "abort", "line_id": mon_cfg.line_id, "aborted": false }));
        } else {
            println!("no runtime state for line {}", mon_cfg.line_id);
        }
        return Ok(());
    };

    match coordinator.abort_run(coordinator.last_t(), chrono::Utc::now(), reason.as_deref()) {
        Some(record) => {
            sink.on_run_closed(&mon_cfg.line_id, &record);
            sink.save_runtime_state(&mon_cfg.line_id, &coordinator.to_checkpoint())?;
            if json {
                println!("{}", json!({ "kind": "run_closed", "line_id": mon_cfg.line_id, "record": record }));
            } else {
                println!("run {} aborted", record.run_id);
            }
        }
        None => {
            if json {
                println!("{}", json!({ "kind": "abort", "line_id": mon_cfg.line_id, "aborted": false }));
            } else {
                println!("no open run for line {}", mon_cfg.line_id);
            }
        }
    }
    Ok(())
}

/// Report the validated configuration. Validation itself already happened
/// at startup; reaching this point means the config is good.
pub fn self_check(cfg: &Config, json: bool) -> eyre::Result<()> {
    let mon_cfg = cfg.to_monitor_config();
    let zones: Vec<&str> = Zone::CANONICAL_ORDER
        .iter()
        .filter(|z| mon_cfg.zones.is_enabled(**z))
        .map(|z| z.as_str())
        .collect();
    if json {
        println!(
            "{}",
            json!({
                "kind": "self_check",
                "line_id": mon_cfg.line_id,
                "version": mon_cfg.version,
                "zones": zones,
                "sampling_period_s": mon_cfg.detector.sampling_period_s,
                "ok": true,
            })
        );
    } else {
        println!(
            "configuration OK: line {} (v{}), zones: {}",
            mon_cfg.line_id,
            mon_cfg.version,
            zones.join(", ")
        );
    }
    Ok(())
}
