//! Background worker thread that drives one `RunCoordinator` from a live
//! `SampleSource` and pushes its output through a `StateSink`.
//!
//! Safety: spawns exactly one thread, joined on `Drop` so the thread never
//! outlives its owner.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use monitor_traits::clock::Clock;
use monitor_traits::{Event, EventKind, SampleSource, StateSink};

use crate::config::MonitorConfig;
use crate::coordinator::{LineStatus, RunCoordinator};

const DEGRADED_QUEUE_CAP: usize = 1024;
const HEARTBEAT_EVERY_N_TICKS: u64 = 15;

fn is_terminal(kind: EventKind) -> bool {
    matches!(kind, EventKind::StageEnded | EventKind::Fault)
}

/// Owns the sampling thread for one production line. Dropping it joins the
/// thread; `stop()` is the graceful, explicit equivalent.
pub struct FsmWorker {
    shutdown: Arc<AtomicBool>,
    abort_requested: Arc<AtomicBool>,
    status: Arc<Mutex<Option<LineStatus>>>,
    pending_config: Arc<Mutex<Option<MonitorConfig>>>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl std::fmt::Debug for FsmWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsmWorker")
            .field("shutdown", &self.shutdown)
            .field("abort_requested", &self.abort_requested)
            .field("status", &self.status)
            .field("pending_config", &self.pending_config)
            .field("join_handle", &self.join_handle.is_some())
            .finish()
    }
}

impl FsmWorker {
    pub fn spawn(
        source: Box<dyn SampleSource>,
        sink: Box<dyn StateSink>,
        cfg: MonitorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let abort_requested = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(None));
        let pending_config = Arc::new(Mutex::new(None));
        let shutdown_clone = shutdown.clone();
        let abort_clone = abort_requested.clone();
        let status_clone = status.clone();
        let pending_clone = pending_config.clone();
        let join_handle = std::thread::spawn(move || {
            run_loop(
                source,
                sink,
                cfg,
                clock,
                shutdown_clone,
                abort_clone,
                status_clone,
                pending_clone,
            );
        });
        Self {
            shutdown,
            abort_requested,
            status,
            pending_config,
            join_handle: Some(join_handle),
        }
    }

    /// Signal the loop to stop and block until the thread has joined. The
    /// in-flight tick completes and a final checkpoint is persisted, so an
    /// open run resumes on the next startup.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("worker thread joined cleanly"),
                Err(e) => tracing::warn!(?e, "worker thread panicked during shutdown"),
            }
        }
    }

    /// Ask the loop to close whatever run is currently open as `Aborted` at
    /// its next tick. A no-op if no run is open.
    pub fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::Relaxed);
    }

    /// Most recent per-tick status snapshot, `None` before the first tick.
    pub fn status(&self) -> Option<LineStatus> {
        self.status.lock().ok().and_then(|g| g.clone())
    }

    /// Queue a new configuration. It is swapped in at the next tick on
    /// which no run is open; the current run always finishes under the
    /// configuration it started with.
    pub fn queue_config_reload(&self, cfg: MonitorConfig) {
        if let Ok(mut slot) = self.pending_config.lock() {
            *slot = Some(cfg);
        }
    }
}

impl Drop for FsmWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    source: Box<dyn SampleSource>,
    sink: Box<dyn StateSink>,
    mut cfg: MonitorConfig,
    clock: Arc<dyn Clock>,
    shutdown: Arc<AtomicBool>,
    abort_requested: Arc<AtomicBool>,
    status: Arc<Mutex<Option<LineStatus>>>,
    pending_config: Arc<Mutex<Option<MonitorConfig>>>,
) {
    let mut coordinator = load_or_new(&*sink, &cfg);

    let mut period_ms = cfg.detector.sampling_period_ms();
    let mut max_age_ms = 3 * period_ms;
    let epoch = Instant::now();
    let mut next_deadline_ms = clock.ms_since(epoch);
    let mut degraded_events: VecDeque<(String, Event)> = VecDeque::new();
    let mut tick: u64 = 0;
    // Monotonic clocks restart with the process, but a restored checkpoint's
    // time domain must keep advancing or every detector would see time
    // running backward. None until the first post-restore snapshot fixes
    // the rebase offset.
    let mut t_offset: Option<u64> = if coordinator.last_t() > 0 { None } else { Some(0) };

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        if !coordinator.is_run_open() {
            let swapped = pending_config.lock().ok().and_then(|mut slot| slot.take());
            if let Some(new_cfg) = swapped {
                if new_cfg.validate().is_empty() {
                    tracing::info!(version = new_cfg.version, "applying queued configuration");
                    cfg = new_cfg;
                    coordinator = RunCoordinator::new(&cfg);
                    period_ms = cfg.detector.sampling_period_ms();
                    max_age_ms = 3 * period_ms;
                } else {
                    tracing::warn!("queued configuration failed validation, keeping current");
                }
            }
        }

        let mut samples = HashMap::new();
        for zone in coordinator.cycle_order().to_vec() {
            match source.get_latest(zone) {
                Ok(mut sample) => {
                    let now_ms = clock.ms_since(epoch);
                    let age_ms = now_ms.saturating_sub(sample.t_monotonic_ms);
                    if age_ms > max_age_ms {
                        tracing::warn!(?zone, age_ms, "stale sample, treating as invalid");
                        sample.valid = false;
                    }
                    samples.insert(zone, sample);
                }
                Err(e) => {
                    tracing::warn!(?zone, error = %e, "sample source read failed");
                }
            }
        }

        if t_offset.is_none() {
            if let Some(min_t) = samples.values().map(|s| s.t_monotonic_ms).min() {
                let saved = coordinator.last_t();
                let offset = if min_t <= saved {
                    saved.saturating_sub(min_t) + period_ms
                } else {
                    0
                };
                if offset > 0 {
                    tracing::info!(offset_ms = offset, "rebasing sample clock onto checkpoint");
                }
                t_offset = Some(offset);
            }
        }
        if let Some(offset) = t_offset.filter(|&o| o > 0) {
            for sample in samples.values_mut() {
                sample.t_monotonic_ms += offset;
            }
        }

        let outcome = coordinator.observe(&samples);
        let line_id = coordinator.line_id().to_string();

        if abort_requested.swap(false, Ordering::Relaxed)
            && let Some(record) =
                coordinator.abort_run(coordinator.last_t(), chrono::Utc::now(), None)
        {
            tracing::info!(run_id = %record.run_id, "run aborted by operator request");
            sink.on_run_closed(&line_id, &record);
        }

        for ev in outcome.events {
            push_event(&*sink, &line_id, ev, &mut degraded_events);
        }

        tick += 1;
        if tick % HEARTBEAT_EVERY_N_TICKS == 0 {
            let hb = Event {
                t: coordinator.last_t(),
                kind: EventKind::Heartbeat,
                zone: None,
                detail: format!("tick={tick}"),
            };
            tracing::info!(tick, run_open = coordinator.is_run_open(), "heartbeat");
            push_event(&*sink, &line_id, hb, &mut degraded_events);
        }
        drain_degraded(&*sink, &mut degraded_events);

        for record in &outcome.stage_closed {
            tracing::info!(zone = %record.zone, outcome = ?record.outcome, "stage closed");
            sink.on_stage_closed(&line_id, record);
        }
        if let Some(record) = &outcome.run_closed {
            tracing::info!(run_id = %record.run_id, termination = ?record.termination, "run closed");
            sink.on_run_closed(&line_id, record);
        }

        if let Err(e) = sink.save_runtime_state(&line_id, &coordinator.to_checkpoint()) {
            tracing::warn!(error = %e, "runtime checkpoint failed, will retry next tick");
        }

        if let Ok(mut slot) = status.lock() {
            *slot = Some(coordinator.status());
        }

        next_deadline_ms += period_ms;
        let now_ms = clock.ms_since(epoch);
        if next_deadline_ms > now_ms {
            clock.sleep(Duration::from_millis(next_deadline_ms - now_ms));
        } else if now_ms.saturating_sub(next_deadline_ms) > period_ms {
            // Far enough behind that catching up tick-by-tick would just
            // spin; resynchronize instead of accumulating debt forever.
            next_deadline_ms = now_ms;
        }
    }

    // Final checkpoint: an open run survives the shutdown and resumes on
    // the next startup.
    let line_id = coordinator.line_id().to_string();
    if let Err(e) = sink.save_runtime_state(&line_id, &coordinator.to_checkpoint()) {
        tracing::warn!(error = %e, "final runtime checkpoint failed");
    }
    tracing::info!(run_open = coordinator.is_run_open(), "worker loop exited");
}

fn load_or_new(sink: &dyn StateSink, cfg: &MonitorConfig) -> RunCoordinator {
    match sink.load_runtime_state(&cfg.line_id) {
        Ok(Some(blob)) => match RunCoordinator::from_checkpoint(cfg, &blob) {
            Some(coordinator) => {
                tracing::info!(
                    run_open = coordinator.is_run_open(),
                    "resumed from runtime-state checkpoint"
                );
                coordinator
            }
            None => {
                tracing::warn!("checkpoint incompatible with current config, starting fresh");
                RunCoordinator::new(cfg)
            }
        },
        Ok(None) => RunCoordinator::new(cfg),
        Err(e) => {
            tracing::warn!(error = %e, "could not load runtime state, starting fresh");
            RunCoordinator::new(cfg)
        }
    }
}

fn push_event(
    sink: &dyn StateSink,
    line_id: &str,
    ev: Event,
    degraded: &mut VecDeque<(String, Event)>,
) {
    if let Err(e) = sink.append_event(line_id, &ev) {
        tracing::warn!(error = %e, "append_event failed, buffering");
        if degraded.len() >= DEGRADED_QUEUE_CAP {
            if let Some(pos) = degraded.iter().position(|(_, e)| !is_terminal(e.kind)) {
                degraded.remove(pos);
            } else {
                degraded.pop_front();
            }
        }
        degraded.push_back((line_id.to_string(), ev));
    }
}

fn drain_degraded(sink: &dyn StateSink, degraded: &mut VecDeque<(String, Event)>) {
    while let Some((line_id, ev)) = degraded.pop_front() {
        if sink.append_event(&line_id, &ev).is_err() {
            degraded.push_front((line_id, ev));
            break;
        }
    }
}
