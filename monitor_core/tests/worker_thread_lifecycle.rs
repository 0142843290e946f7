//! Worker thread lifecycle: verifies the sampling thread is joined cleanly
//! on drop and that repeated spawn/drop cycles don't leak threads.

use std::sync::Arc;
use std::time::Duration;

use monitor_core::config::{DetectorCfg, MonitorConfig};
use monitor_core::mocks::{FaultingSink, NoopSource, NullSink};
use monitor_core::worker::FsmWorker;
use monitor_traits::clock::test_clock::TestClock;
use monitor_traits::clock::MonotonicClock;

fn fast_cfg() -> MonitorConfig {
    let mut cfg = MonitorConfig::default();
    cfg.detector = DetectorCfg {
        sampling_period_s: 0.01,
        ..DetectorCfg::default()
    };
    cfg
}

#[test]
fn worker_thread_exits_on_drop() {
    let worker = FsmWorker::spawn(
        Box::new(NoopSource),
        Box::new(NullSink::default()),
        fast_cfg(),
        Arc::new(MonotonicClock::new()),
    );
    std::thread::sleep(Duration::from_millis(50));
    drop(worker);
}

#[test]
fn worker_can_be_spawned_dropped_and_respawned() {
    for _ in 0..5 {
        let worker = FsmWorker::spawn(
            Box::new(NoopSource),
            Box::new(NullSink::default()),
            fast_cfg(),
            Arc::new(MonotonicClock::new()),
        );
        std::thread::sleep(Duration::from_millis(20));
        drop(worker);
    }
}

#[test]
fn worker_runs_on_a_simulated_clock() {
    // TestClock's sleep advances simulated time instead of blocking, so the
    // loop free-runs; shutdown must still be honored promptly.
    let mut worker = FsmWorker::spawn(
        Box::new(NoopSource),
        Box::new(NullSink::default()),
        fast_cfg(),
        Arc::new(TestClock::new()),
    );
    std::thread::sleep(Duration::from_millis(30));
    let start = std::time::Instant::now();
    worker.stop();
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[test]
fn worker_shutdown_is_prompt_even_with_a_faulting_sink() {
    let mut worker = FsmWorker::spawn(
        Box::new(NoopSource),
        Box::new(FaultingSink),
        fast_cfg(),
        Arc::new(MonotonicClock::new()),
    );
    std::thread::sleep(Duration::from_millis(50));

    let start = std::time::Instant::now();
    worker.stop();
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_millis(200),
        "shutdown took {elapsed:?}, expected a prompt join"
    );
}
