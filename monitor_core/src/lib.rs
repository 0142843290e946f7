#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Hardware-agnostic heating-cycle monitoring core.
//!
//! This crate implements the Stage-Detection Finite State Machine and the
//! coordination that composes it into full `Preheat -> Main -> Rib` runs,
//! plus the background worker that drives both from a live `SampleSource`.
//!
//! ## Architecture
//!
//! - **Detection**: per-zone stage FSM (`zone_detector` module)
//! - **Statistics**: online mean/variance (`stats` module)
//! - **Configuration**: runtime thresholds (`config` module)
//! - **Coordination**: cycle composition and `RunRecord` emission (`coordinator` module)
//! - **Worker**: background sampling loop (`worker` module)
//! - **Construction**: type-state builder (`builder` module)

pub mod builder;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod mocks;
pub mod stats;
pub mod util;
pub mod worker;
pub mod zone_detector;

pub use builder::{Missing, Set, WorkerBuilder};
pub use config::{CoordinatorCfg, DetectorCfg, MonitorConfig, ZoneEnable};
pub use coordinator::{CoordinatorState, LineStatus, RunCoordinator, TickOutcome, ZoneStatus};
pub use error::BuildError;
pub use stats::RunningStats;
pub use worker::FsmWorker;
pub use zone_detector::{Anomaly, DetectorState, StepOutput, ZoneDetector};
